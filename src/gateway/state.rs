use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::CaptionPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CaptionPipeline>,

    /// Directory receiving spooled uploads.
    pub upload_dir: PathBuf,

    pub max_upload_bytes: usize,

    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(pipeline: Arc<CaptionPipeline>, upload_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            pipeline,
            upload_dir,
            max_upload_bytes,
            cors_origins: Vec::new(),
        }
    }

    pub fn from_config(pipeline: Arc<CaptionPipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
            cors_origins: config.cors_origins.clone(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}
