//! Fieldlink Edge Daemon
//!
//! Runs on each field node: config sync, GPIO actuation, motion dispatch and
//! the local control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use fieldlink_core::config::load_config;
use fieldlink_core::tracing_init::{default_filter, init_tracing};
use fieldlink_daemon::binder::ActuatorBinder;
use fieldlink_daemon::control::{ControlState, build_router};
use fieldlink_daemon::gpio::backend_from_name;
use fieldlink_daemon::motion::MotionMonitor;
use fieldlink_daemon::storage::EventDatabase;
use fieldlink_daemon::store::ConfigStore;
use fieldlink_daemon::sync::{SyncClient, SyncConfig};

#[derive(Parser, Debug)]
#[command(name = "fieldlink-daemon")]
#[command(version, about = "Fieldlink edge daemon - config sync, GPIO and motion escalation")]
struct Args {
    /// Settings file layered over the global settings.
    #[arg(long, env = "FIELDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the local control surface.
    #[arg(long, env = "FIELDLINK_EDGE_ADDR")]
    addr: Option<SocketAddr>,

    /// Central server base URL.
    #[arg(long)]
    central_url: Option<String>,

    /// Device id issued by central.
    #[arg(long)]
    device_id: Option<String>,

    /// GPIO backend: sysfs, simulated or none.
    #[arg(long)]
    gpio_backend: Option<String>,

    /// Path to the local motion event database.
    #[arg(long, env = "FIELDLINK_EDGE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to the config snapshot file.
    #[arg(long, env = "FIELDLINK_SNAPSHOT_PATH")]
    snapshot_path: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FIELDLINK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut node = load_config(args.config.as_deref())?.node;
    if args.central_url.is_some() {
        node.central_url = args.central_url;
    }
    if args.device_id.is_some() {
        node.device_id = args.device_id;
    }
    if let Some(backend) = args.gpio_backend {
        node.gpio_backend = backend;
    }

    let level = args.log_level.as_deref().unwrap_or(&node.log_level);
    init_tracing(&default_filter("fieldlink_daemon", level), args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gpio_backend = %node.gpio_backend,
        "Starting fieldlink-daemon"
    );

    let db_path = match args.db_path.or_else(|| node.database_path.clone()) {
        Some(path) => path,
        None => state_dir()?.join("events.db"),
    };
    let snapshot_path = match args.snapshot_path.or_else(|| node.snapshot_path.clone()) {
        Some(path) => path,
        None => state_dir()?.join("snapshot.json"),
    };
    let events = EventDatabase::open(&db_path).await?;

    let backend = backend_from_name(&node.gpio_backend)?;
    if !backend.is_available() {
        warn!(backend = backend.name(), "No actuator subsystem, relays stay unbound");
    }
    let (binder, pins) = ActuatorBinder::new(backend);
    let binder = Arc::new(binder);
    let store = Arc::new(ConfigStore::open(snapshot_path));

    let sync = Arc::new(SyncClient::from_config(
        &SyncConfig::from_node(&node),
        Arc::clone(&store),
        Arc::clone(&binder),
    )?);
    sync.restore().await;

    let monitor = Arc::new(MotionMonitor::new(
        Arc::clone(&store),
        Arc::clone(&binder),
        events,
        sync.api(),
        node.device_id.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sync_handle = tokio::spawn({
        let sync = Arc::clone(&sync);
        let rx = shutdown_rx.clone();
        async move { sync.run(rx).await }
    });
    let monitor_handle = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.run(pins, shutdown_rx).await }
    });

    let addr = match args.addr {
        Some(addr) => addr,
        None => node.listen_addr.parse()?,
    };
    let router = build_router(ControlState {
        binder,
        store,
        sync,
        monitor,
    });
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // `true` unsets $NOTIFY_SOCKET for any children.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %addr, "Control surface ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;
    let _ = monitor_handle.await;

    info!("Edge daemon stopped");
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

/// Default state directory: ~/.fieldlink/edge
fn state_dir() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".fieldlink").join("edge"))
}
