use std::fmt;

#[derive(Debug)]
pub enum ImageError {
    Decode(String),
    Encode(String),
    /// Width or height of zero.
    EmptyImage,
    /// Channel count other than 1 (mono) or 3 (BGR).
    UnsupportedChannels(usize),
    /// Buffer length does not match width * height * channels.
    LayoutMismatch { expected: usize, got: usize },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Decode(msg) => write!(f, "decode error: {msg}"),
            ImageError::Encode(msg) => write!(f, "encode error: {msg}"),
            ImageError::EmptyImage => write!(f, "image has zero width or height"),
            ImageError::UnsupportedChannels(c) => {
                write!(f, "unsupported channel count {c}, expected 1 or 3")
            }
            ImageError::LayoutMismatch { expected, got } => {
                write!(f, "pixel buffer length mismatch: expected {expected} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for ImageError {}

impl From<crates_image::ImageError> for ImageError {
    fn from(err: crates_image::ImageError) -> Self {
        ImageError::Decode(err.to_string())
    }
}
