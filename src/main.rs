// src/main.rs - live emulation server
use clap::Parser;
use pinwire::config::{self, Config};
use pinwire::gateway::HttpBuildGateway;
use pinwire::web::api::{create_router, AppStateInner};
use pinwire::{spawn_session_manager, StateBroadcaster};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pinwire-server", version, about = "Runs Arduino sketches on an emulated ATmega328P and streams pin states")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::info!("Starting pinwire live emulation server");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path.display(), e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    tracing::info!("Build service: {}", config.gateway.url);
    tracing::info!(
        "Burst: {} instructions @ {} Hz, observing pins {:?}",
        config.simulation.burst_instructions,
        config.simulation.clock_hz,
        config.simulation.observed_pins
    );

    let sketch = config.simulation.placeholder_sketch()?;
    let gateway = Arc::new(HttpBuildGateway::new(&config.gateway)?);
    let broadcaster = StateBroadcaster::new(config.broadcast.capacity, config.simulation.dedupe_bursts);
    let (session, manager_task) =
        spawn_session_manager(config.simulation.clone(), gateway, broadcaster.clone(), sketch);

    let app = create_router(Arc::new(AppStateInner { session, broadcaster }));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Observer channel listening on ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    // Observer tasks may still hold session handles; do not wait for them.
    manager_task.abort();
    tracing::info!("Server stopped");
    Ok(())
}
