// Persona server: real-time digital human sessions over WebSocket

use anyhow::Context;
use clap::Parser;
use persona_me::SessionResources;
use persona_server::{
    create_router, AppState, LoopbackNegotiator, Metrics, PersonaConfig, SessionRegistry,
};
use persona_spk::EngineAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "persona-server", version, about = "Real-time digital human session server")]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long, env = "PERSONA_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Log filter, e.g. "info" or "persona_me=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.server.log_level, config.server.log_json);

    info!("🚀 Starting persona-server {}", env!("CARGO_PKG_VERSION"));

    let adapter = Arc::new(
        EngineAdapter::from_config(&config.speech).context("Failed to initialize speech engines")?,
    );
    if !adapter.has_recognition() {
        warn!("No recognition engines configured; voice input will be rejected");
    }

    let shutdown = CancellationToken::new();
    let probe = adapter.clone().spawn_health_probe(shutdown.clone());

    let negotiator = Arc::new(LoopbackNegotiator::new(config.speech.format, config.avatar.frame_rate));
    let resources = SessionResources::new(adapter.clone(), config.speech.clone(), config.avatar.clone());
    let registry = Arc::new(SessionRegistry::new(
        resources,
        negotiator,
        config.server.clone(),
        Arc::new(Metrics::new()),
    ));
    let reaper = registry.clone().spawn_reaper(shutdown.clone());

    let app = create_router(AppState::new(
        registry.clone(),
        adapter.clone(),
        config.server.outbound_queue_depth,
    ));

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("✅ Listening on http://{} (sessions at ws://{}/ws)", address, address);

    // Sessions close first so their sockets finish and the server can drain
    let stopper = {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("🛑 Shutting down");
            registry.shutdown_all().await;
            shutdown.cancel();
        })
    };

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("Server error")?;

    stopper.abort();
    shutdown.cancel();
    let _ = tokio::join!(probe, reaper);
    info!("👋 Stopped");
    Ok(())
}

/// File (if any), then environment, then command line
fn load_config(args: &Args) -> anyhow::Result<PersonaConfig> {
    let mut config = match &args.config {
        Some(path) => PersonaConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PersonaConfig::default(),
    };
    config.apply_env();

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.server.max_sessions = max_sessions;
    }
    if let Some(level) = &args.log_level {
        config.server.log_level = level.clone();
    }
    if args.log_json {
        config.server.log_json = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
