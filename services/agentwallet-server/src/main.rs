//! AgentWallet Server
//!
//! Governance gateway between autonomous agents and money movement:
//! every spend is admitted through the dead-man switch, kill switches and
//! the rules engine before any funds move, with a hash-chained audit trail.
//!
//! ```bash
//! # Against Postgres
//! agentwallet-server --database-url postgres://...
//!
//! # In-memory playground (no database)
//! agentwallet-server --playground
//! ```

mod config;

use std::sync::Arc;

use agentwallet_api::{create_router, AppState};
use agentwallet_engine::{Engine, TracingNotifier};
use agentwallet_store::{MemStore, PgStore, Store};
use agentwallet_types::{Agent, Owner, OwnerId, Wallet};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;

/// AgentWallet governance gateway
#[derive(Parser, Debug)]
#[command(name = "agentwallet-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a configuration file
    #[arg(short, long, env = "AGENTWALLET_CONFIG")]
    config: Option<String>,

    /// Host to bind
    #[arg(long, env = "AGENTWALLET_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "AGENTWALLET_PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run with the in-memory store and a seeded demo owner
    #[arg(long, env = "AGENTWALLET_PLAYGROUND")]
    playground: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AGENTWALLET_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.database_url {
        config.store.postgres_url = url;
    }
    if args.playground {
        config.server.playground = true;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config);

    let store: Arc<dyn Store> = if config.server.playground {
        info!("playground mode: in-memory store, state is not persisted");
        let store = Arc::new(MemStore::new());
        seed_playground(store.as_ref()).await?;
        store
    } else {
        Arc::new(PgStore::connect(&config.store).await?)
    };

    let engine = Engine::new(store, Arc::new(TracingNotifier));

    // Background dead-man sweep with a shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(engine.deadman.clone().run_sweeper(shutdown_rx));

    let state = Arc::new(AppState::new(engine));
    let router = create_router(state);

    let addr = config.server.socket_addr()?;
    info!("AgentWallet server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Seed a demo owner, agent and wallet so the playground is usable
/// immediately; credentials are printed once
async fn seed_playground(store: &dyn Store) -> anyhow::Result<()> {
    let owner = Owner {
        id: OwnerId::new(),
        api_key: "awo_playground-owner".to_string(),
        name: "playground-owner".to_string(),
        contact: None,
        created_at: chrono::Utc::now(),
    };
    let agent = Agent::new(owner.id, "playground-agent", "awa_playground-agent".to_string());
    let wallet = Wallet::new(agent.id, "USD");

    store.create_owner(&owner).await?;
    store.create_agent(&agent).await?;
    store.create_wallet(&wallet).await?;

    info!("seeded owner key: {}", owner.api_key);
    info!("seeded agent key: {} (agent {})", agent.api_key, agent.id);
    info!("seeded wallet: {}", wallet.id);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("ctrl-c handler installs");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("sigterm handler installs")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
