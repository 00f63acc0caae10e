//! Sentivue HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use sentivue::captioner::GenerationConfig;
use sentivue::config::Config;
use sentivue::gateway::{AppState, create_router};
use sentivue::pipeline::{CaptionPipeline, PipelineConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
 ___  ___ _ __ | |_(_)_   ___   _  ___
/ __|/ _ \ '_ \| __| \ \ / / | | |/ _ \
\__ \  __/ | | | |_| |\ V /| |_| |  __/
|___/\___|_| |_|\__|_| \_/  \__,_|\___|

        SEE. FEEL. SAY.
"#
    );

    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        upload_dir = %config.upload_dir.display(),
        "Sentivue starting"
    );

    if config.uses_stub_models() {
        tracing::warn!("No model paths configured, running captioner in stub mode");
    }

    let generation = GenerationConfig::from_env();
    let pipeline_config = PipelineConfig::from_config(&config, generation);

    // Model loading is blocking file and tensor work.
    let pipeline = tokio::task::spawn_blocking(move || CaptionPipeline::load(pipeline_config))
        .await??;

    let state = AppState::from_config(Arc::new(pipeline), &config);
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Sentivue shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("SENTIVUE_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(sentivue::constants::DEFAULT_PORT);

    let url = format!("http://127.0.0.1:{}/healthz", port);

    let Ok(rt) = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    else {
        return 1;
    };

    rt.block_on(async {
        let Ok(client) = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
        else {
            return 1;
        };

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
