use std::sync::Arc;

use anyhow::Context;

use woodhop_api::app::{build_app, services::build_services};
use woodhop_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    woodhop_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr;

    let services = Arc::new(build_services(config).await.context("failed to start services")?);
    let app = build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    services.shutdown();
    tracing::info!("shut down");
    Ok(())
}
