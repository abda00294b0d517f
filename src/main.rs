use anyhow::Context;
use clap::Parser;
use relay_server::{
    cli::{Cli, Commands},
    config::ServerConfig,
    create_router,
    state::ServerState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = ServerConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    match cli.command {
        Some(Commands::Pipeline(args)) => {
            std::process::exit(args.execute(&config.pipeline_settings()));
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    info!("🚀 Starting Relay Server v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Mute strategy: {}", config.mute_strategy);
    info!("   Log capacity: {} lines", config.log_capacity);
    info!("   Exit detection: {}", config.detect_exit);
    info!("   Shell: {}", config.shell);
    info!("   streamlink: {}", config.streamlink_binary);
    info!("   ffmpeg: {}", config.ffmpeg_binary);
    info!("   CORS origins: {:?}", config.cors_origins);
    if config.is_lan_mode() {
        warn!("Control panel is reachable from the network and has no authentication");
    }

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let state = Arc::new(ServerState::new(config));
    let app = create_router(state.clone());

    info!("🎧 Control panel on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Leave no relay running behind the panel
    state.controller.stop();
    info!("Relay Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
