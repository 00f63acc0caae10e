use thiserror::Error;

use crate::media::MediaError;
use crate::models::ModelError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pipeline configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl From<candle_core::Error> for PipelineError {
    fn from(err: candle_core::Error) -> Self {
        PipelineError::Model(ModelError::from(err))
    }
}
