use crate::ImageError;
use vigil_base::Tensor;

/// Owned 8-bit pixel buffer in interleaved HWC layout.
///
/// Color images carry 3 channels in BGR order (the order industrial
/// camera SDKs deliver); mono images carry a single channel. An `Image`
/// has exactly one owner; the frame handoff slot is the only place
/// ownership transfers between threads.
#[derive(Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish()
    }
}

impl Image {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage);
        }
        if channels != 1 && channels != 3 {
            return Err(ImageError::UnsupportedChannels(channels as usize));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ImageError::LayoutMismatch { expected, got: data.len() });
        }
        Ok(Self { width, height, channels, data })
    }

    /// Mono image filled with a single gray value.
    pub fn gray(width: u32, height: u32, value: u8) -> Result<Self, ImageError> {
        Self::new(width, height, 1, vec![value; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn is_color(&self) -> bool {
        self.channels == 3
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// One interleaved pixel row.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels as usize;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn into_tensor(self) -> Tensor<u8> {
        // Layout was validated on construction.
        Tensor {
            shape: vec![self.height as usize, self.width as usize, self.channels as usize],
            data: self.data,
        }
    }
}
