//! Trigger-driven vision inspection controller: wires the camera
//! handoff, the detection cascade, the PLC monitor, persistence and the
//! operator UI channel into one pipeline.

pub mod config;
pub mod detlog;
pub mod orchestrator;
pub mod persistence;
pub mod sim;
pub mod stats;
pub mod ui;

pub use config::{ConfigError, ConfigStore, InspectorConfig};
pub use detlog::DetectionLog;
pub use orchestrator::{CyclePolicy, ManualTrigger, Orchestrator};
pub use persistence::{PersistenceQueue, PersistenceWorker, SaveRequest};
pub use stats::InspectionStats;
pub use ui::{UiEvent, UiSink};
