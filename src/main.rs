use clap::Parser;
use sensor_bridge::config::ConfigLoader;
use sensor_bridge::events::{BroadcastNotifier, Event};
use sensor_bridge::{
    ConnectionSupervisor, SerialChannelFactory, SqliteGateway, SystemPortDiscovery,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Resilient serial connection manager that streams sensor telemetry into a local store.",
    long_about = "Discovers a sensor device on a serial port, supervises the link with bounded \
reconnection and optional hot port switching, parses telemetry lines, and persists validated \
records to a local SQLite database."
)]
struct Args {
    /// Path to the configuration file. Defaults to the standard resolution order.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port path, overriding the config file (e.g. /dev/ttyUSB0).
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overriding the config file.
    #[arg(short, long)]
    baud: Option<u32>,

    /// SQLite database path, overriding the config file.
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// List detected serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    if let Some(port) = args.port {
        config.connection.port_path = Some(port);
    }
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
    }
    if let Some(database) = args.database {
        config.storage.database_path = database;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let discovery = Arc::new(SystemPortDiscovery::new());

    if args.list_ports {
        use sensor_bridge::PortDiscovery;
        for candidate in discovery.list().await? {
            let marker = if candidate.is_likely_match { "*" } else { " " };
            println!(
                "{} {}  {}",
                marker,
                candidate.path,
                candidate.manufacturer.as_deref().unwrap_or("-"),
            );
        }
        return Ok(());
    }

    let gateway = Arc::new(SqliteGateway::connect(&config.storage.database_path).await?);
    let notifier = Arc::new(BroadcastNotifier::new());

    // Mirror the outbound event stream into the log.
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let supervisor = ConnectionSupervisor::spawn(
        config.connection,
        discovery,
        Arc::new(SerialChannelFactory::new()),
        gateway,
        notifier,
    );

    info!("sensor-bridge starting");
    supervisor.connect().await?;

    shutdown_signal().await;
    info!("shutting down");
    supervisor.close().await?;

    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::StatusChanged { state, message, .. } => info!("[{state}] {message}"),
        Event::Error { message } => error!("{message}"),
        Event::ConnectionLost {
            port,
            reconnect_attempts,
        } => warn!("connection lost on {port} ({reconnect_attempts} reconnect attempts so far)"),
        Event::DataReceived { raw, port, .. } => info!("{port} rx: {raw}"),
        Event::DataSent { data, port, .. } => info!("{port} tx: {data}"),
        Event::ReconnectStatus {
            status,
            attempts,
            max_attempts,
        } => info!("reconnect {status:?}: attempt {attempts}/{max_attempts}"),
        Event::PortSwitched { old_port, new_port } => {
            info!("switched ports: {old_port} -> {new_port}")
        }
        Event::PersistenceSuccess { table, insert_id } => {
            info!("persisted record {insert_id} into {table}")
        }
        Event::StaleData {
            port,
            silent_for_ms,
        } => warn!("no data from {port} for {silent_for_ms}ms"),
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
