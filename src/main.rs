use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use twitch_login::{AppConfig, AuthError, Authenticator, MemoryKv, TwitchProvider, router};

#[derive(Debug, Parser)]
#[command(
    name = "twitch-login",
    about = "Serve the Twitch OAuth login endpoints under /api/auth."
)]
struct Cli {
    /// Address to listen on; overrides BIND_ADDR.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), AuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let bind_addr = cli.bind.unwrap_or(config.bind_addr);

    let auth = Authenticator::new(
        TwitchProvider::new(),
        Arc::new(config.provider),
        config.settings,
        Arc::new(MemoryKv::new()),
    )?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, router(auth)).await?;
    Ok(())
}
