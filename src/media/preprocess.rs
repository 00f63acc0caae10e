use candle_core::{Device, Tensor};
use image::RgbImage;
use image::imageops::{self, FilterType};

use super::error::MediaError;

/// Per-channel normalization used by the ViT image processor.
pub const VIT_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const VIT_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// ImageNet statistics used by the VideoMAE image processor.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Appearance-encoder input: bilinear resize to `size`×`size`, then normalize.
///
/// Returns a `[3, size, size]` tensor.
pub fn vit_pixels(frame: &RgbImage, size: u32, device: &Device) -> Result<Tensor, MediaError> {
    let resized = imageops::resize(frame, size, size, FilterType::Triangle);
    let data = to_chw(&resized, &VIT_MEAN, &VIT_STD);
    let s = size as usize;
    Ok(Tensor::from_vec(data, (3, s, s), device)?)
}

/// Action-encoder input: shortest-edge resize, center crop, ImageNet normalization.
///
/// Returns a `[frames, 3, size, size]` tensor.
pub fn videomae_pixels(
    frames: &[&RgbImage],
    size: u32,
    device: &Device,
) -> Result<Tensor, MediaError> {
    if frames.is_empty() {
        return Err(MediaError::NoFrames);
    }

    let s = size as usize;
    let mut data = Vec::with_capacity(frames.len() * 3 * s * s);
    for frame in frames {
        let resized = resize_shortest_edge(frame, size);
        let cropped = center_crop(&resized, size);
        data.extend(to_chw(&cropped, &IMAGENET_MEAN, &IMAGENET_STD));
    }

    Ok(Tensor::from_vec(data, (frames.len(), 3, s, s), device)?)
}

/// Output size for a shortest-edge resize: the short side becomes `size`,
/// the long side keeps the aspect ratio (truncated).
pub fn shortest_edge_dims(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width <= height {
        let long = (size as u64 * height as u64 / width.max(1) as u64) as u32;
        (size, long.max(size))
    } else {
        let long = (size as u64 * width as u64 / height.max(1) as u64) as u32;
        (long.max(size), size)
    }
}

fn resize_shortest_edge(frame: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = shortest_edge_dims(frame.width(), frame.height(), size);
    imageops::resize(frame, w, h, FilterType::Triangle)
}

fn center_crop(frame: &RgbImage, size: u32) -> RgbImage {
    let left = frame.width().saturating_sub(size) / 2;
    let top = frame.height().saturating_sub(size) / 2;
    imageops::crop_imm(frame, left, top, size, size).to_image()
}

fn to_chw(image: &RgbImage, mean: &[f32; 3], std: &[f32; 3]) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * w + x) as usize;
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            data[c * plane + offset] = (value - mean[c]) / std[c];
        }
    }

    data
}
