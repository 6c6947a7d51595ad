use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let boot = keyspin_core::bootstrap::bootstrap_from_env().await?;
    let bind = {
        let global = boot.state.global.load();
        format!("{}:{}", global.host, global.port)
    };

    let app = axum::Router::new()
        .merge(keyspin_router::proxy_router(boot.state.clone()))
        .nest("/admin", keyspin_router::admin_router(boot.state.clone()));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(event = "listening", bind = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
