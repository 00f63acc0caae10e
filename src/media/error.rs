use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("upload is empty")]
    EmptyUpload,

    #[error("unsupported media format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("failed to decode media: {reason}")]
    DecodeFailed { reason: String },

    #[error("media contains no frames")]
    NoFrames,

    #[error("animation has more than {limit} frames")]
    TooManyFrames { limit: usize },

    #[error("animation decodes to more than {limit} pixels")]
    TooManyPixels { limit: usize },

    #[error("failed to build pixel tensor: {reason}")]
    TensorFailed { reason: String },
}

impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => MediaError::UnsupportedFormat {
                reason: e.to_string(),
            },
            other => MediaError::DecodeFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<candle_core::Error> for MediaError {
    fn from(err: candle_core::Error) -> Self {
        MediaError::TensorFailed {
            reason: err.to_string(),
        }
    }
}
