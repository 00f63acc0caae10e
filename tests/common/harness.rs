//! Test server harness.

use sentivue::gateway::{AppState, create_router};
use sentivue::pipeline::{CaptionPipeline, PipelineConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const STARTUP_WAIT_TIMEOUT_SECS: u64 = 5;
const STARTUP_POLL_INTERVAL_MS: u64 = 50;
const TEST_MAX_UPLOAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub max_upload_bytes: usize,
    pub seed: u64,
    pub cors_origins: Vec<String>,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
            seed: 42,
            cors_origins: Vec::new(),
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    upload_dir: TempDir,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Files currently spooled in the server's upload directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn wait_for_server_ready(
    addr: SocketAddr,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ServerStartupError> {
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(ServerStartupError::Timeout);
        }

        match tokio::net::TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(_) => {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerStartupError {
    #[error("Server failed to start within timeout")]
    Timeout,
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Server startup failed: {0}")]
    StartupFailed(String),
}

/// Spawns a server backed by the stub pipeline on an ephemeral port.
///
/// No model files are needed: encoders and captioner run in stub mode, so
/// captions are deterministic per upload.
pub async fn spawn_test_server(config: TestServerConfig) -> Result<TestServer, ServerStartupError> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let local_addr = listener.local_addr()?;

    let upload_dir =
        TempDir::new().map_err(|e| ServerStartupError::StartupFailed(e.to_string()))?;

    let pipeline = CaptionPipeline::load(PipelineConfig::stub().with_seed(config.seed))
        .map_err(|e| ServerStartupError::StartupFailed(e.to_string()))?;

    let state = AppState::new(
        Arc::new(pipeline),
        upload_dir.path().to_path_buf(),
        config.max_upload_bytes,
    )
    .with_cors_origins(config.cors_origins);

    let app = create_router(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    wait_for_server_ready(
        local_addr,
        Duration::from_secs(STARTUP_WAIT_TIMEOUT_SECS),
        Duration::from_millis(STARTUP_POLL_INTERVAL_MS),
    )
    .await?;

    Ok(TestServer {
        addr: local_addr,
        _server_handle: server_handle,
        shutdown_tx: Some(shutdown_tx),
        upload_dir,
    })
}

/// Animated GIF whose frames fade between two colours.
pub fn gif_bytes(frame_count: usize, width: u32, height: u32) -> Vec<u8> {
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        let frames = (0..frame_count).map(|i| {
            let shade = (i * 255 / frame_count.max(1)) as u8;
            Frame::new(RgbaImage::from_pixel(
                width,
                height,
                Rgba([shade, 255 - shade, 64, 255]),
            ))
        });
        encoder.encode_frames(frames).expect("encode gif");
    }
    bytes
}
