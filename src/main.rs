use anyhow::Result;
use tracing_subscriber::{self, EnvFilter};

use xaubot::config::Config;
use xaubot::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let port = config.port;
    let state = AppState::from_config(config)?;

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Starting xaubot trading engine on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
