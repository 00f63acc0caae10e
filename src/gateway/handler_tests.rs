//! Router-level tests for the captioning gateway.

use axum::{Router, body::Body, http::Request, http::StatusCode, response::IntoResponse};
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::constants::SENTIVUE_STATUS_HEADER;
use crate::gateway::error::GatewayError;
use crate::gateway::state::AppState;
use crate::gateway::{cors_layer, create_router};
use crate::media::MediaError;
use crate::models::ModelError;
use crate::pipeline::{CaptionPipeline, PipelineConfig, PipelineError};
use crate::testing::gif_bytes;

const BOUNDARY: &str = "sentivue-test-boundary";

struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    data: &'a [u8],
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.name, filename
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if part.filename.is_some() {
            body.extend_from_slice(b"Content-Type: image/gif\r\n");
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn generate_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn setup_test_state(max_upload_bytes: usize) -> (AppState, TempDir) {
    let upload_dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(CaptionPipeline::load(PipelineConfig::stub().with_seed(1)).unwrap());
    let state = AppState::new(pipeline, upload_dir.path().to_path_buf(), max_upload_bytes);
    (state, upload_dir)
}

fn create_test_router() -> (Router, TempDir) {
    let (state, dir) = setup_test_state(1024 * 1024);
    (create_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn spooled_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

fn status_header(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(SENTIVUE_STATUS_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

mod probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz() {
        let (router, _dir) = create_test_router();
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(status_header(&response), "healthy");
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_reports_stub_models() {
        let (router, _dir) = create_test_router();
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["components"]["models"], "stub");
        assert!(json["components"].get("model_mode").is_none());
        assert_eq!(json["components"]["device"], "cpu");
        assert_eq!(json["components"]["upload_dir"], "ready");
    }

    #[tokio::test]
    async fn test_ready_unavailable_without_upload_dir() {
        let (mut state, dir) = setup_test_state(1024);
        state.upload_dir = dir.path().join("does-not-exist");
        let response = create_router(state)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_header(&response), "pending");
        assert_eq!(body_json(response).await["components"]["upload_dir"], "missing");
    }
}

mod generate_tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_captions_gif() {
        let (router, dir) = create_test_router();
        let gif = gif_bytes(6, 24, 16);
        let response = router
            .oneshot(generate_request(&[Part {
                name: "file",
                filename: Some("clip.gif"),
                data: &gif,
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(status_header(&response), "captioned");
        let json = body_json(response).await;
        assert_eq!(json["emotion"], "energetic and happy");
        let caption = json["caption"].as_str().unwrap();
        assert!(caption.starts_with("A video of a energetic and happy "), "{caption}");
        assert_eq!(spooled_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_first_named_file() {
        let (router, _dir) = create_test_router();
        let gif = gif_bytes(3, 8, 8);
        let response = router
            .oneshot(generate_request(&[
                Part {
                    name: "note",
                    filename: None,
                    data: b"hello",
                },
                Part {
                    name: "upload",
                    filename: Some("clip.gif"),
                    data: &gif,
                },
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_generate_prefers_file_field() {
        let (router, _dir) = create_test_router();
        let gif = gif_bytes(3, 8, 8);
        let response = router
            .oneshot(generate_request(&[
                Part {
                    name: "other",
                    filename: Some("notes.txt"),
                    data: b"not an image",
                },
                Part {
                    name: "file",
                    filename: Some("clip.gif"),
                    data: &gif,
                },
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_generate_missing_file_is_bad_request() {
        let (router, _dir) = create_test_router();
        let response = router
            .oneshot(generate_request(&[Part {
                name: "note",
                filename: None,
                data: b"no upload here",
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(status_header(&response), "invalid_request");
        let json = body_json(response).await;
        assert_eq!(json["code"], 400);
        assert!(json["error"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_generate_empty_upload_is_bad_request() {
        let (router, dir) = create_test_router();
        let response = router
            .oneshot(generate_request(&[Part {
                name: "file",
                filename: Some("empty.gif"),
                data: b"",
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(spooled_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_generate_undecodable_media_is_unprocessable() {
        let (router, dir) = create_test_router();
        let response = router
            .oneshot(generate_request(&[Part {
                name: "file",
                filename: Some("clip.gif"),
                data: b"this is not a gif at all",
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_header(&response), "unprocessable_media");
        assert_eq!(body_json(response).await["code"], 422);
        assert_eq!(spooled_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_generate_oversized_upload_is_rejected() {
        let (state, dir) = setup_test_state(100);
        let gif = gif_bytes(4, 32, 32);
        assert!(gif.len() > 100);

        let response = create_router(state)
            .oneshot(generate_request(&[Part {
                name: "file",
                filename: Some("clip.gif"),
                data: &gif,
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_header(&response), "payload_too_large");
        assert_eq!(spooled_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_generate_rejects_non_multipart() {
        let (router, _dir) = create_test_router();
        let response = router
            .oneshot(
                Request::post("/generate")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}

mod cors_tests {
    use super::*;

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/generate")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let (router, _dir) = create_test_router();
        let response = router.oneshot(preflight("http://localhost:3000")).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_restricted_origins() {
        let (state, _dir) = setup_test_state(1024);
        let router =
            create_router(state.with_cors_origins(vec!["http://app.example".to_string()]));

        let allowed = router
            .clone()
            .oneshot(preflight("http://app.example"))
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "http://app.example"
        );

        let denied = router.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_entry() {
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&["http://a.example".to_string(), "bad\norigin".to_string()]);
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (GatewayError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                GatewayError::PayloadTooLarge { limit: 10 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                GatewayError::UnprocessableMedia("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                GatewayError::InferenceFailed("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::InternalError("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let media: GatewayError = PipelineError::Media(MediaError::NoFrames).into();
        assert!(matches!(media, GatewayError::UnprocessableMedia(_)));

        let pixels: GatewayError =
            PipelineError::Media(MediaError::TooManyPixels { limit: 1024 }).into();
        assert!(matches!(pixels, GatewayError::UnprocessableMedia(_)));

        let empty: GatewayError = PipelineError::Media(MediaError::EmptyUpload).into();
        assert!(matches!(empty, GatewayError::InvalidRequest(_)));

        let tensor: GatewayError = PipelineError::Media(MediaError::TensorFailed {
            reason: "shape".into(),
        })
        .into();
        assert!(matches!(tensor, GatewayError::InferenceFailed(_)));

        let model: GatewayError = PipelineError::Model(ModelError::InferenceFailed {
            reason: "boom".into(),
        })
        .into();
        assert!(matches!(model, GatewayError::InferenceFailed(_)));

        let io: GatewayError =
            PipelineError::Io(std::io::Error::other("disk")).into();
        assert!(matches!(io, GatewayError::InternalError(_)));
    }
}
