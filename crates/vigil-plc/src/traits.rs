use crate::PlcError;

/// Protocol-agnostic PLC device handle.
///
/// Implementations wrap a vendor transport (Mitsubishi MC, Modbus-TCP,
/// Siemens S7, Omron FINS); the monitor only ever reads and writes
/// 16-bit registers by pre-formatted address string.
#[allow(async_fn_in_trait)]
pub trait Plc {
    async fn connect(&mut self) -> Result<(), PlcError>;

    async fn disconnect(&mut self);

    async fn read_int16(&mut self, address: &str) -> Result<i16, PlcError>;

    async fn write_int16(&mut self, address: &str, value: i16) -> Result<(), PlcError>;
}
