//! Appearance + action feature extraction over decoded frames.

use std::path::Path;

use candle_core::{Device, Tensor};
use image::RgbImage;
use tracing::{debug, warn};

use crate::constants::{ACTION_DIM, APPEARANCE_DIM, NUM_SAMPLED_FRAMES, VISUAL_FEATURE_DIM};
use crate::media::{MediaError, sample_frame_indices, videomae_pixels, vit_pixels};
use crate::models::{ModelError, VideoMaeEncoder, VitEncoder};

use super::error::PipelineError;

/// Per-clip encoder outputs, each `[hidden]`.
#[derive(Debug, Clone)]
pub struct VisualFeatures {
    pub appearance: Tensor,
    pub action: Tensor,
}

enum EncoderBackend {
    Model {
        vit: VitEncoder,
        videomae: VideoMaeEncoder,
        device: Device,
    },
    Stub,
}

/// ViT on the first frame plus VideoMAE on evenly sampled frames.
pub struct VisualEncoder {
    backend: EncoderBackend,
}

impl std::fmt::Debug for VisualEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            EncoderBackend::Model { device, .. } => format!("Model({:?})", device),
            EncoderBackend::Stub => "Stub".to_string(),
        };
        f.debug_struct("VisualEncoder")
            .field("backend", &backend)
            .field("visual_dim", &self.visual_dim())
            .finish()
    }
}

impl VisualEncoder {
    pub fn load(vit_dir: &Path, videomae_dir: &Path, device: &Device) -> Result<Self, ModelError> {
        let vit = VitEncoder::load(vit_dir, device)?;
        let videomae = VideoMaeEncoder::load(videomae_dir, device)?;

        if vit.config().hidden_size != videomae.config().hidden_size {
            warn!(
                vit_hidden = vit.config().hidden_size,
                videomae_hidden = videomae.config().hidden_size,
                "Encoder widths differ; the projection must match the fused width"
            );
        }

        Ok(Self::from_models(vit, videomae, device.clone()))
    }

    pub fn from_models(vit: VitEncoder, videomae: VideoMaeEncoder, device: Device) -> Self {
        Self {
            backend: EncoderBackend::Model {
                vit,
                videomae,
                device,
            },
        }
    }

    pub fn stub() -> Self {
        warn!("Visual encoder running in STUB mode (testing only)");
        Self {
            backend: EncoderBackend::Stub,
        }
    }

    /// Width of `[appearance ‖ action ‖ appearance * k]`.
    pub fn visual_dim(&self) -> usize {
        match &self.backend {
            EncoderBackend::Model { vit, videomae, .. } => {
                2 * vit.config().hidden_size + videomae.config().hidden_size
            }
            EncoderBackend::Stub => VISUAL_FEATURE_DIM,
        }
    }

    /// Frames shown to the action encoder.
    pub fn num_frames(&self) -> usize {
        match &self.backend {
            EncoderBackend::Model { videomae, .. } => videomae.config().num_frames,
            EncoderBackend::Stub => NUM_SAMPLED_FRAMES,
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self.backend, EncoderBackend::Stub)
    }

    pub fn encode(&self, frames: &[RgbImage]) -> Result<VisualFeatures, PipelineError> {
        let first = frames.first().ok_or(MediaError::NoFrames)?;
        let indices = sample_frame_indices(frames.len(), self.num_frames());
        let sampled: Vec<&RgbImage> = indices.iter().map(|&i| &frames[i]).collect();

        debug!(
            total_frames = frames.len(),
            sampled_frames = sampled.len(),
            "Encoding clip"
        );

        match &self.backend {
            EncoderBackend::Model {
                vit,
                videomae,
                device,
            } => {
                let vit_size = vit.config().image_size as u32;
                let mae_size = videomae.config().image_size as u32;

                let app_pixels = vit_pixels(first, vit_size, device)?;
                let act_pixels = videomae_pixels(&sampled, mae_size, device)?;

                Ok(VisualFeatures {
                    appearance: vit.appearance(&app_pixels)?,
                    action: videomae.action(&act_pixels)?,
                })
            }
            EncoderBackend::Stub => {
                let appearance = stub_features(&[first], APPEARANCE_DIM);
                let action = stub_features(&sampled, ACTION_DIM);
                Ok(VisualFeatures {
                    appearance: Tensor::from_vec(appearance, APPEARANCE_DIM, &Device::Cpu)?,
                    action: Tensor::from_vec(action, ACTION_DIM, &Device::Cpu)?,
                })
            }
        }
    }
}

/// Deterministic pseudo-features in `[-1, 1)` keyed on pixel content.
fn stub_features(frames: &[&RgbImage], dim: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    for frame in frames {
        hasher.update(&frame.width().to_le_bytes());
        hasher.update(&frame.height().to_le_bytes());
        hasher.update(frame.as_raw());
    }
    let digest = hasher.finalize();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let mut state = u64::from_le_bytes(seed_bytes);

    (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}
