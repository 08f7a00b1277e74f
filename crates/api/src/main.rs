use anyhow::Context;

use shipcheck_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shipcheck_observability::init();

    let config = AppConfig::from_env()?;
    if config.using_dev_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }
    tracing::debug!(?config, "loaded configuration");

    let app = shipcheck_api::app::build_app(&config)
        .await
        .context("failed to initialise services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
