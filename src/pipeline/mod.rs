//! End-to-end captioning: decode → encode → fuse → classify → generate → compose.
//!
//! [`CaptionPipeline`] is synchronous and CPU/GPU bound; call it from a blocking task.

mod config;
mod encoder;
mod error;


pub use config::PipelineConfig;
pub use encoder::{VisualEncoder, VisualFeatures};
pub use error::PipelineError;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use candle_core::Device;
use serde::Serialize;
use tracing::{debug, info};

use crate::captioner::{Captioner, compose_caption};
use crate::fusion::{Emotion, classify_emotion, fuse};
use crate::media::{DecodeLimits, decode_frames_with_limits};
use crate::models::{device_label, select_device};

/// Response payload for a captioned upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionResult {
    pub emotion: Emotion,
    pub caption: String,
}

pub struct CaptionPipeline {
    encoder: VisualEncoder,
    captioner: Captioner,
    device: Device,
    limits: DecodeLimits,
    base_seed: u64,
    requests: AtomicU64,
}

impl std::fmt::Debug for CaptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionPipeline")
            .field("encoder", &self.encoder)
            .field("captioner", &self.captioner)
            .field("device", &device_label(&self.device))
            .field("limits", &self.limits)
            .finish()
    }
}

impl CaptionPipeline {
    /// Loads encoders and captioner, or stubs when no model paths are configured.
    pub fn load(config: PipelineConfig) -> Result<Self, PipelineError> {
        config
            .generation
            .validate()
            .map_err(|reason| PipelineError::InvalidConfig { reason })?;

        if config.max_frames == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "max_frames must be greater than 0".to_string(),
            });
        }

        if config.max_decoded_pixels == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "max_decoded_pixels must be greater than 0".to_string(),
            });
        }

        let started = Instant::now();
        let (encoder, captioner, device) = match (
            &config.vit_path,
            &config.videomae_path,
            &config.gpt2_path,
        ) {
            (Some(vit), Some(videomae), Some(gpt2)) => {
                let device = select_device()?;
                let encoder = VisualEncoder::load(vit, videomae, &device)?;
                let captioner = Captioner::load(
                    gpt2,
                    &config.checkpoint_path,
                    encoder.visual_dim(),
                    &device,
                    config.generation.clone(),
                )?;
                (encoder, captioner, device)
            }
            (None, None, None) => (
                VisualEncoder::stub(),
                Captioner::stub(config.generation.clone()),
                Device::Cpu,
            ),
            _ => {
                return Err(PipelineError::InvalidConfig {
                    reason: "vit, videomae and gpt2 paths must be configured together".to_string(),
                });
            }
        };

        let base_seed = config.generation.seed.unwrap_or_else(clock_seed);

        info!(
            mode = if encoder.is_stub() { "stub" } else { "real" },
            device = device_label(&device),
            visual_dim = encoder.visual_dim(),
            sampled_frames = encoder.num_frames(),
            fixed_seed = config.generation.seed.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Caption pipeline ready"
        );

        Ok(Self {
            encoder,
            captioner,
            device,
            limits: DecodeLimits {
                max_frames: config.max_frames,
                max_pixels: config.max_decoded_pixels,
            },
            base_seed,
            requests: AtomicU64::new(0),
        })
    }

    /// Captions an in-memory upload.
    pub fn caption_bytes(&self, bytes: &[u8]) -> Result<CaptionResult, PipelineError> {
        let started = Instant::now();

        let frames = decode_frames_with_limits(bytes, self.limits)?;
        let features = self.encoder.encode(&frames)?;
        let fused = fuse(&features.appearance, &features.action)?;
        let emotion = classify_emotion(&fused)?;

        let seed = self.next_seed();
        let decoded = self.captioner.generate(&fused, seed)?;
        let caption = compose_caption(emotion, &decoded);

        debug!(
            frames = frames.len(),
            emotion = emotion.label(),
            seed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Caption generated"
        );

        Ok(CaptionResult { emotion, caption })
    }

    /// Captions a file on disk (e.g. a spooled upload).
    pub fn caption_file(&self, path: &Path) -> Result<CaptionResult, PipelineError> {
        let bytes = std::fs::read(path)?;
        self.caption_bytes(&bytes)
    }

    fn next_seed(&self) -> u64 {
        self.base_seed
            .wrapping_add(self.requests.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_stub(&self) -> bool {
        self.encoder.is_stub() && self.captioner.is_stub()
    }

    pub fn device_label(&self) -> &'static str {
        device_label(&self.device)
    }

    pub fn max_frames(&self) -> usize {
        self.limits.max_frames
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        self.limits
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
