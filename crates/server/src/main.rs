use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use multiapi_common::config::{SystemConfig, TransportKind};
use multiapi_common::{MultiApiError, Result};
use multiapi_server::cache::spawn_sweep_task;
use multiapi_server::config::load_config;
use multiapi_server::transport::{http, stdio};
use multiapi_server::App;

#[tokio::main]
async fn main() {
    // Logs always go to stderr: in stdio mode stdout carries the protocol.
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Multi-API tool server starting");

    let config_path: PathBuf = std::env::var("MULTIAPI_CONFIG")
        .unwrap_or_else(|_| "config/system.toml".into())
        .into();

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

async fn run(config: SystemConfig) -> Result<()> {
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            MultiApiError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

    let app = App::from_config(&config)?;

    let sweep = spawn_sweep_task(
        Arc::clone(&app.cache),
        Duration::from_secs(config.cache.sweep_interval_seconds),
    );

    let result = match config.server.transport {
        TransportKind::Http => {
            let listener =
                tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port)).await?;
            let state = Arc::new(http::HttpState::new(app, Some(metrics_handle)));
            http::serve(listener, state).await
        }
        TransportKind::Stdio => {
            stdio::serve(app.dispatcher.clone(), tokio::io::stdin(), tokio::io::stdout()).await
        }
    };

    sweep.abort();
    tracing::info!("Multi-API tool server stopped");
    result
}
