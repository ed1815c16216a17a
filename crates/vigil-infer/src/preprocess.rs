use crate::InferError;
use vigil_base::Tensor;
use vigil_image::Image;

/// Letterbox pad fill, mid-gray on every channel.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Mapping between source-image pixels and model-input pixels produced
/// by a letterbox resize.
///
/// `scale = min(model_w / src_w, model_h / src_h)`; `pad_x`/`pad_y` are
/// the left/top padding (an odd padding remainder goes to the
/// right/bottom edge).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub src_w: u32,
    pub src_h: u32,
}

impl LetterboxTransform {
    /// Source x coordinate to model-input x.
    pub fn map_x(&self, x: f32) -> f32 {
        x * self.scale + self.pad_x as f32
    }

    /// Source y coordinate to model-input y.
    pub fn map_y(&self, y: f32) -> f32 {
        y * self.scale + self.pad_y as f32
    }

    /// Model-input x back to source pixels (unclamped).
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.pad_x as f32) / self.scale
    }

    /// Model-input y back to source pixels (unclamped).
    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.pad_y as f32) / self.scale
    }
}

/// Letterbox-resize `src` to the model extent and pack it into a
/// normalized float tensor of shape `(1, 3, model_h, model_w)`.
///
/// The image keeps its aspect ratio; unused space is filled with
/// mid-gray. BGR sources are reordered to RGB planes, mono sources are
/// replicated across all three planes, and every value is scaled to
/// `[0, 1]`. Resampling is bilinear.
pub fn preprocess(
    src: &Image,
    model_w: u32,
    model_h: u32,
) -> Result<(Tensor<f32>, LetterboxTransform), InferError> {
    if src.width() == 0 || src.height() == 0 {
        return Err(InferError::InvalidImage(format!(
            "source extent {}x{}",
            src.width(),
            src.height()
        )));
    }
    if src.channels() != 1 && src.channels() != 3 {
        return Err(InferError::UnsupportedChannels(src.channels() as usize));
    }
    if model_w == 0 || model_h == 0 {
        return Err(InferError::InvalidImage(format!("model extent {model_w}x{model_h}")));
    }

    let src_w = src.width();
    let src_h = src.height();
    let scale = (model_w as f32 / src_w as f32).min(model_h as f32 / src_h as f32);
    let resized_w = ((src_w as f32 * scale).round() as u32).clamp(1, model_w);
    let resized_h = ((src_h as f32 * scale).round() as u32).clamp(1, model_h);
    let pad_x = (model_w - resized_w) / 2;
    let pad_y = (model_h - resized_h) / 2;
    let transform = LetterboxTransform { scale, pad_x, pad_y, src_w, src_h };

    let mut tensor =
        Tensor::filled(vec![1, 3, model_h as usize, model_w as usize], PAD_VALUE)?;

    // Bilinear sample positions are identical for every row (x) and
    // every channel, so compute them once up front.
    let xs: Vec<(usize, usize, f32)> =
        (0..resized_w).map(|dst| sample_1d(dst, scale, src_w)).collect();

    let channels = src.channels() as usize;
    let plane = model_w as usize * model_h as usize;
    let row_stride = src_w as usize * channels;

    for out_c in 0..3usize {
        // Output planes are RGB; a BGR source reads channels in reverse,
        // a mono source replicates its single channel.
        let src_c = if channels == 3 { 2 - out_c } else { 0 };
        let plane_base = out_c * plane;

        for dst_y in 0..resized_h {
            let (y0, y1, fy) = sample_1d(dst_y, scale, src_h);
            let row0 = &src.as_bytes()[y0 * row_stride..(y0 + 1) * row_stride];
            let row1 = &src.as_bytes()[y1 * row_stride..(y1 + 1) * row_stride];
            let out_row_base =
                plane_base + (dst_y + pad_y) as usize * model_w as usize + pad_x as usize;
            let out_row = &mut tensor.data[out_row_base..out_row_base + resized_w as usize];

            for (out, &(x0, x1, fx)) in out_row.iter_mut().zip(&xs) {
                let p00 = row0[x0 * channels + src_c] as f32;
                let p01 = row0[x1 * channels + src_c] as f32;
                let p10 = row1[x0 * channels + src_c] as f32;
                let p11 = row1[x1 * channels + src_c] as f32;
                let top = p00 + (p01 - p00) * fx;
                let bottom = p10 + (p11 - p10) * fx;
                *out = (top + (bottom - top) * fy) / 255.0;
            }
        }
    }

    Ok((tensor, transform))
}

/// Center-aligned bilinear sampling along one axis: returns the two
/// source indices straddling the destination pixel and the blend weight
/// of the second one.
fn sample_1d(dst: u32, scale: f32, src_extent: u32) -> (usize, usize, f32) {
    let pos = (dst as f32 + 0.5) / scale - 0.5;
    let clamped = pos.clamp(0.0, (src_extent - 1) as f32);
    let i0 = clamped.floor() as usize;
    let i1 = (i0 + 1).min(src_extent as usize - 1);
    (i0, i1, clamped - i0 as f32)
}
