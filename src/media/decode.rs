use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat, RgbImage};
use tracing::debug;

use super::error::MediaError;
use crate::constants::{DEFAULT_MAX_DECODED_PIXELS, DEFAULT_MAX_FRAMES};

/// Bounds on how much of an upload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_frames: usize,

    /// Canvas pixels summed over every decoded frame.
    pub max_pixels: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_pixels: DEFAULT_MAX_DECODED_PIXELS,
        }
    }
}

impl DecodeLimits {
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: usize) -> Self {
        self.max_pixels = max_pixels;
        self
    }
}

/// Decodes an upload into RGB frames.
///
/// GIFs yield one fully composited frame per animation step; any other supported
/// still image yields a single frame. Alpha is dropped, not blended.
pub fn decode_frames(bytes: &[u8], max_frames: usize) -> Result<Vec<RgbImage>, MediaError> {
    decode_frames_with_limits(bytes, DecodeLimits::default().with_max_frames(max_frames))
}

/// [`decode_frames`] with an explicit pixel budget.
///
/// Every GIF frame is a full canvas, so the budget is charged `width * height` per
/// frame before the frame is decoded.
pub fn decode_frames_with_limits(
    bytes: &[u8],
    limits: DecodeLimits,
) -> Result<Vec<RgbImage>, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::EmptyUpload);
    }

    let format = image::guess_format(bytes).map_err(|e| MediaError::UnsupportedFormat {
        reason: e.to_string(),
    })?;

    let frames = match format {
        ImageFormat::Gif => decode_gif(bytes, limits)?,
        other => {
            let image = image::load_from_memory_with_format(bytes, other)?;
            vec![image.to_rgb8()]
        }
    };

    if frames.is_empty() {
        return Err(MediaError::NoFrames);
    }

    debug!(
        format = ?format,
        frames = frames.len(),
        width = frames[0].width(),
        height = frames[0].height(),
        "Decoded upload"
    );

    Ok(frames)
}

fn decode_gif(bytes: &[u8], limits: DecodeLimits) -> Result<Vec<RgbImage>, MediaError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions();
    let canvas_pixels = (width as usize).saturating_mul(height as usize);

    let mut frames = Vec::new();
    let mut decoded_pixels: usize = 0;
    for frame in decoder.into_frames() {
        if frames.len() == limits.max_frames {
            return Err(MediaError::TooManyFrames {
                limit: limits.max_frames,
            });
        }
        decoded_pixels = decoded_pixels.saturating_add(canvas_pixels);
        if decoded_pixels > limits.max_pixels {
            return Err(MediaError::TooManyPixels {
                limit: limits.max_pixels,
            });
        }
        let buffer = frame?.into_buffer();
        frames.push(DynamicImage::ImageRgba8(buffer).to_rgb8());
    }

    Ok(frames)
}
