mod api;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediamill_core::{
    load_config, validate_config, BundledEngine, Config, EngineDispatcher, InProcessEngine,
    JobQueue,
};

use api::create_router;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration. An explicitly named file must exist; the implicit
    // default path may be absent, in which case built-in defaults apply.
    let config = match std::env::var("MEDIAMILL_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
        Err(_) => {
            let path = PathBuf::from("config.toml");
            if path.exists() {
                info!("Loading configuration from {:?}", path);
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))?
            } else {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    };

    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    // Probe the external transcoder once; the snapshot holds for the session.
    let in_process: Arc<dyn InProcessEngine> =
        Arc::new(BundledEngine::from_config(&config.engine));
    let dispatcher = Arc::new(EngineDispatcher::probe(&config.engine, in_process).await);
    let capability = dispatcher.capability();
    info!(
        external_available = capability.external_available,
        external_supports_hap = capability.external_supports_hap,
        "engine capability probed"
    );

    let queue = Arc::new(JobQueue::new(Arc::clone(&dispatcher)));

    let state = Arc::new(AppState::new(config.clone(), capability, queue));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
