use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use valet_config::AppConfig;
use valet_server::{bootstrap, build_router};

#[derive(Debug, Parser)]
#[command(name = "valet-server", version, about = "Personal Android-assistant service")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "valet.toml")]
    config: String,
    /// Override the listen address from the config file.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    let listen = config.server.listen.clone();
    let state = bootstrap(config);
    let router = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(%listen, "valet service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop + flush the background tracker before the process exits
    info!("shutting down, stopping observation tracker");
    state.tracker.stop().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
