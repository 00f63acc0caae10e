use std::path::PathBuf;

use crate::captioner::GenerationConfig;
use crate::config::Config;
use crate::constants::{
    DEFAULT_CHECKPOINT_FILENAME, DEFAULT_MAX_DECODED_PIXELS, DEFAULT_MAX_FRAMES,
};

/// Everything [`super::CaptionPipeline::load`] needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vit_path: Option<PathBuf>,

    pub videomae_path: Option<PathBuf>,

    pub gpt2_path: Option<PathBuf>,

    pub checkpoint_path: PathBuf,

    pub max_frames: usize,

    /// Canvas pixels decoded per upload, summed over frames.
    pub max_decoded_pixels: usize,

    pub generation: GenerationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vit_path: None,
            videomae_path: None,
            gpt2_path: None,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_FILENAME),
            max_frames: DEFAULT_MAX_FRAMES,
            max_decoded_pixels: DEFAULT_MAX_DECODED_PIXELS,
            generation: GenerationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config, generation: GenerationConfig) -> Self {
        Self {
            vit_path: config.vit_path.clone(),
            videomae_path: config.videomae_path.clone(),
            gpt2_path: config.gpt2_path.clone(),
            checkpoint_path: config.checkpoint_path.clone(),
            max_frames: config.max_frames,
            max_decoded_pixels: config.max_decoded_pixels,
            generation,
        }
    }

    /// No model paths: stub encoders and captioner.
    pub fn stub() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.generation.seed = Some(seed);
        self
    }

    pub fn uses_stub_models(&self) -> bool {
        self.vit_path.is_none() && self.videomae_path.is_none() && self.gpt2_path.is_none()
    }
}
