use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{SENTIVUE_STATUS_CAPTIONED, SENTIVUE_STATUS_HEADER};
use crate::gateway::error::GatewayError;
use crate::gateway::state::AppState;

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "file";

const UPLOAD_PREFIX: &str = "sentivue-upload-";

/// An upload written to disk; the file is removed when this is dropped.
pub(crate) struct SpooledUpload {
    pub(crate) file: NamedTempFile,
    pub(crate) filename: Option<String>,
    pub(crate) size: usize,
}

#[instrument(skip(state, multipart), fields(request_id = %Uuid::new_v4()))]
pub async fn generate_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let upload = spool_upload(&mut multipart, &state.upload_dir, state.max_upload_bytes).await?;

    info!(
        bytes = upload.size,
        filename = upload.filename.as_deref().unwrap_or(""),
        "Upload received"
    );

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || {
        let result = pipeline.caption_file(upload.file.path());
        drop(upload);
        result
    })
    .await
    .map_err(|e| GatewayError::InternalError(format!("captioning task failed: {}", e)))?
    .map_err(|e| {
        warn!(error = %e, "Captioning failed");
        GatewayError::from(e)
    })?;

    info!(
        emotion = result.emotion.label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Caption generated"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        SENTIVUE_STATUS_HEADER,
        HeaderValue::from_static(SENTIVUE_STATUS_CAPTIONED),
    );

    Ok((StatusCode::OK, headers, Json(result)).into_response())
}

/// Picks the `file` field (or the first field with a filename) and spools it to disk.
pub(crate) async fn spool_upload(
    multipart: &mut Multipart,
    upload_dir: &Path,
    limit: usize,
) -> Result<SpooledUpload, GatewayError> {
    let mut chosen: Option<SpooledUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let is_upload_field = field.name() == Some(UPLOAD_FIELD);
        if !is_upload_field && (chosen.is_some() || field.file_name().is_none()) {
            debug!(field = field.name().unwrap_or(""), "Skipping multipart field");
            continue;
        }

        chosen = Some(spool_field(field, upload_dir, limit).await?);
        if is_upload_field {
            break;
        }
    }

    chosen.ok_or_else(|| {
        GatewayError::InvalidRequest(format!("missing multipart field `{}`", UPLOAD_FIELD))
    })
}

async fn spool_field(
    mut field: Field<'_>,
    upload_dir: &Path,
    limit: usize,
) -> Result<SpooledUpload, GatewayError> {
    let filename = field.file_name().map(str::to_string);

    let temp = tempfile::Builder::new()
        .prefix(UPLOAD_PREFIX)
        .tempfile_in(upload_dir)
        .map_err(|e| GatewayError::InternalError(format!("failed to create temp file: {}", e)))?;
    let handle = temp
        .as_file()
        .try_clone()
        .map_err(|e| GatewayError::InternalError(format!("failed to open temp file: {}", e)))?;
    let mut writer = tokio::fs::File::from_std(handle);

    let mut size = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        size += chunk.len();
        if size > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| GatewayError::InternalError(format!("failed to write upload: {}", e)))?;
    }
    writer
        .flush()
        .await
        .map_err(|e| GatewayError::InternalError(format!("failed to write upload: {}", e)))?;

    Ok(SpooledUpload {
        file: temp,
        filename,
        size,
    })
}

fn multipart_error(err: MultipartError, limit: usize) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge { limit }
    } else {
        GatewayError::InvalidRequest(format!("invalid multipart body: {}", err.body_text()))
    }
}
