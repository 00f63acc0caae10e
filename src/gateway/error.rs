use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::constants::SENTIVUE_STATUS_HEADER;
use crate::media::MediaError;
use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("unprocessable media: {0}")]
    UnprocessableMedia(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl From<PipelineError> for GatewayError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Media(MediaError::EmptyUpload) => {
                GatewayError::InvalidRequest(MediaError::EmptyUpload.to_string())
            }
            PipelineError::Media(e @ MediaError::TensorFailed { .. }) => {
                GatewayError::InferenceFailed(e.to_string())
            }
            PipelineError::Media(e) => GatewayError::UnprocessableMedia(e.to_string()),
            PipelineError::Model(e) => GatewayError::InferenceFailed(e.to_string()),
            PipelineError::Io(e) => GatewayError::InternalError(e.to_string()),
            e @ PipelineError::InvalidConfig { .. } => GatewayError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, sentivue_status) = match &self {
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            GatewayError::UnprocessableMedia(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_media")
            }
            GatewayError::InferenceFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "inference_error")
            }
            GatewayError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            SENTIVUE_STATUS_HEADER,
            HeaderValue::from_str(sentivue_status).unwrap_or(HeaderValue::from_static("error")),
        );

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, headers, body).into_response()
    }
}
