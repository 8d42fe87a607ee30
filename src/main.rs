use std::sync::Arc;

use limelight_proxy::config::Config;
use limelight_proxy::server::{listener, Router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    tracing::info!(
        upstream = %cfg.upstream.host,
        stream_port = cfg.ports.stream,
        dashboard_port = cfg.ports.dashboard,
        api_port = cfg.ports.api,
        "Limelight proxy configured"
    );

    let router = Arc::new(Router::from_config(&cfg));

    tokio::select! {
        res = listener::run(&cfg.listen_addr, router) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
