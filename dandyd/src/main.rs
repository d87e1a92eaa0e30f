use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dandy_relay::{
    interaction_channel, load_file_config, resolve_config, spawn_interaction_loop,
    ActionDispatcher, ActionRegistry, ConfigOverrides, NotificationManager, NotifyHandler,
    RelayServer, Router, TokenStore,
};

mod desktop;

use desktop::{CommandPresenter, DesktopOpener, DesktopSpawner};

#[derive(Parser, Debug)]
#[command(name = "dandyd", version, about = "Loopback notification relay")]
struct Cli {
    /// Loopback address to bind (or DANDY_HOST)
    #[arg(long)]
    host: Option<String>,

    /// TCP port (or DANDY_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Bearer token file (or DANDY_TOKEN_PATH)
    #[arg(long)]
    token_path: Option<PathBuf>,

    /// TOML config with a [server] table (or DANDY_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    info!(
        "{}",
        dandy_build_info::formatted_banner(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    );

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("DANDY_CONFIG").ok().map(PathBuf::from));
    let file_config = load_file_config(config_path.as_deref())?;

    let cli_overrides = ConfigOverrides {
        host: cli.host.clone(),
        port: cli.port,
        token_path: cli.token_path.clone(),
    };
    let config = resolve_config(&cli_overrides, &ConfigOverrides::from_env(), file_config.as_ref())?;

    let store = TokenStore::at(&config.token_path);
    let token = store
        .load_or_create()
        .with_context(|| format!("Failed to prepare auth token at {}", store.path().display()))?;
    info!("Auth token file: {}", store.path().display());

    let registry = ActionRegistry::new();
    let (interactions_tx, interactions_rx) = interaction_channel();

    let presenter = Arc::new(CommandPresenter::detect(interactions_tx));
    let manager = NotificationManager::new(presenter, registry.clone());
    let dispatcher = ActionDispatcher::new(
        registry,
        Arc::new(DesktopOpener::detect()),
        Arc::new(DesktopSpawner),
    );
    let interaction_loop = spawn_interaction_loop(dispatcher, interactions_rx);

    let router = Router::new(NotifyHandler::new(token, manager));
    let server = RelayServer::bind(config.socket_addr(), router, config.limits)
        .await
        .with_context(|| format!("Failed to bind relay on {}", config.socket_addr()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handlers(shutdown_tx);

    server.serve(shutdown_rx).await;

    // notify-send waiters still hold interaction senders.
    interaction_loop.abort();
    info!("dandyd stopped");
    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn spawn_signal_handlers(shutdown: watch::Sender<bool>) {
    let shutdown = Arc::new(shutdown);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C; shutting down relay");
            let _ = ctrl_c.send(true);
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM; shutting down relay");
                let _ = shutdown.send(true);
            }
        });
    }
}
