use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CANVAS_CONFIG").ok();
    let config = skynet_core::config::CanvasConfig::load(config_path.as_deref())?;

    // RUST_LOG overrides when set; otherwise fall back to LOG_LEVEL via config.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_filter_directive().into()),
        )
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "startup configuration is invalid");
        std::process::exit(1);
    }

    let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let state = Arc::new(app::AppState::new(config)?);
    let router = app::build_router(state);

    info!("skynet-gateway listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
