//! Fieldlink Central Server
//!
//! Authoritative registry that edge nodes pull their configuration from and
//! report relay status and motion events to.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use fieldlink_central::auth::{generate_token, hash_token};
use fieldlink_central::server::{AppState, build_router};
use fieldlink_central::storage::RegistryDatabase;
use fieldlink_core::config::load_config;
use fieldlink_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "fieldlink-central")]
#[command(version, about = "Fieldlink central server - device registry and telemetry ingest")]
struct Args {
    /// Settings file layered over the global settings.
    #[arg(long, env = "FIELDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "FIELDLINK_CENTRAL_ADDR")]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long, env = "FIELDLINK_CENTRAL_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FIELDLINK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Register a device and print its token once.
    RegisterDevice {
        #[arg(long)]
        name: String,
        #[arg(long)]
        ip_address: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?.central;

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    init_tracing(&default_filter("fieldlink_central", level), args.log_json);

    let db_path = match args.db_path.or(config.database_path) {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening registry database");
    let db = RegistryDatabase::open(&db_path).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr = match args.addr {
                Some(addr) => addr,
                None => config.listen_addr.parse()?,
            };
            serve(db, addr).await
        }
        Command::RegisterDevice {
            name,
            ip_address,
            description,
        } => register_device(&db, &name, ip_address.as_deref(), description.as_deref()).await,
    }
}

async fn serve(db: RegistryDatabase, addr: SocketAddr) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting fieldlink-central"
    );

    let router = build_router(AppState::new(db));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Central server ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Central server stopped");
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn register_device(
    db: &RegistryDatabase,
    name: &str,
    ip_address: Option<&str>,
    description: Option<&str>,
) -> anyhow::Result<()> {
    let token = generate_token();
    let id = uuid::Uuid::new_v4().to_string();
    let device = db
        .create_device(&id, name, ip_address, description, &hash_token(&token))
        .await?;

    info!(device_id = %device.id, "Device registered");
    println!("device_id: {}", device.id);
    println!("token:     {token}");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}

/// Default database path: ~/.fieldlink/central.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".fieldlink").join("central.db"))
}
