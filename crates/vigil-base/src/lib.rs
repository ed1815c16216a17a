pub mod logging;
pub mod rect;
pub mod tensor;
pub mod vec2;
pub mod wallclock;

pub use logging::{FileLogger, StdoutLogger, init_file_logger, init_stdout_logger};
pub use rect::Rect;
pub use tensor::{Tensor, TensorError};
pub use vec2::Vec2;
pub use wallclock::Timestamp;

// Re-export log so downstream crates share one facade version.
pub use log;
