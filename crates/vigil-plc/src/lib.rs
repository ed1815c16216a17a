//! Protocol-agnostic PLC plumbing: the device trait the vendor
//! transports implement, register address formatting per dialect, and
//! the trigger monitor state machine.

pub mod error;
pub mod monitor;
pub mod protocol;
pub mod traits;

pub use error::PlcError;
pub use monitor::{InspectionRequest, MonitorConfig, TriggerMonitor, TriggerState};
pub use protocol::Protocol;
pub use traits::Plc;
