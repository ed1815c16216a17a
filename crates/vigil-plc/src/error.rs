use std::fmt;

#[derive(Debug)]
pub enum PlcError {
    /// The transport failed (socket error, protocol frame error, ...).
    Transport(String),
    /// A read or write did not complete within the protocol timeout.
    Timeout { operation: &'static str, after_ms: u64 },
    /// The device is not connected.
    NotConnected,
}

impl fmt::Display for PlcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlcError::Transport(msg) => write!(f, "plc transport error: {msg}"),
            PlcError::Timeout { operation, after_ms } => {
                write!(f, "plc {operation} timed out after {after_ms} ms")
            }
            PlcError::NotConnected => write!(f, "plc is not connected"),
        }
    }
}

impl std::error::Error for PlcError {}

impl From<std::io::Error> for PlcError {
    fn from(err: std::io::Error) -> Self {
        PlcError::Transport(err.to_string())
    }
}
