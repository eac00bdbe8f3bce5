use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duel_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let (app, _state) = duel_server::build_app(&config).await?;

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, database = %config.database_url, "duel server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
