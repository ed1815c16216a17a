use serde::{Deserialize, Serialize};
use std::fmt;

/// PLC protocol dialects the controller can be wired to. The dialect
/// only matters for register address formatting here; the transport
/// itself lives behind the [`crate::Plc`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    MitsubishiMcAscii,
    MitsubishiMcBinary,
    ModbusTcp,
    SiemensS7,
    OmronFins,
}

impl Protocol {
    /// Render a data-register number the way the dialect's adapter
    /// expects it, e.g. register 555 becomes `D555` for Mitsubishi MC.
    pub fn register_address(&self, register: u32) -> String {
        match self {
            Protocol::MitsubishiMcAscii | Protocol::MitsubishiMcBinary => format!("D{register}"),
            Protocol::ModbusTcp => format!("{register}"),
            Protocol::SiemensS7 => format!("DB1.{register}"),
            Protocol::OmronFins => format!("D{register}"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::MitsubishiMcAscii => "Mitsubishi MC (ASCII)",
            Protocol::MitsubishiMcBinary => "Mitsubishi MC (binary)",
            Protocol::ModbusTcp => "Modbus-TCP",
            Protocol::SiemensS7 => "Siemens S7",
            Protocol::OmronFins => "Omron FINS",
        };
        write!(f, "{name}")
    }
}
