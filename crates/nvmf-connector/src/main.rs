//! nvmfctl - NVMf attach/detach tool
//!
//! Entry point for connecting and disconnecting NVMe-over-Fabrics namespaces
//! on this host.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use nvmf_common::{NvmfConfig, DEFAULT_CONFIG_PATH};
use nvmf_connector::{
    connector_file_path, load_connector, persist_connector, read_host_nqn,
    remove_connector_file, Connector, ConnectorMgr, NvmfDiskInfo,
};

/// NVMe-over-Fabrics connector
#[derive(Parser, Debug)]
#[command(name = "nvmfctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach a remote namespace and print its device path
    Connect(ConnectArgs),
    /// Release this host's session to a subsystem
    Disconnect(DisconnectArgs),
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Target subsystem NQN
    #[arg(long)]
    nqn: String,

    /// Target address
    #[arg(long)]
    addr: String,

    /// Target service id
    #[arg(long, default_value = "4420")]
    port: String,

    /// Fabric transport (tcp or rdma)
    #[arg(long, default_value = "tcp")]
    transport: String,

    /// Namespace UUID
    #[arg(long)]
    device_uuid: String,

    /// Volume identifier used in logs
    #[arg(long, default_value = "")]
    volume_id: String,

    /// Host NQN; read from the configured hostnqn file when omitted
    #[arg(long)]
    host_nqn: Option<String>,

    /// Seconds to wait for the device (0 = default)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    retry_count: i32,

    /// Seconds between device probes (0 = default)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    check_interval: i32,

    /// Staging path; the connector record is written to `<PATH>.json`
    #[arg(long)]
    target_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DisconnectArgs {
    /// Staging path whose `<PATH>.json` record describes the session
    #[arg(long, conflicts_with_all = ["nqn", "host_nqn"])]
    target_path: Option<PathBuf>,

    /// Target subsystem NQN
    #[arg(long, required_unless_present = "target_path")]
    nqn: Option<String>,

    /// Host NQN; read from the configured hostnqn file when omitted
    #[arg(long)]
    host_nqn: Option<String>,
}

/// Initializes tracing/logging subsystem
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match NvmfConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nvmfctl: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    if let Err(e) = init_logging(&level) {
        eprintln!("nvmfctl: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "nvmfctl failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: NvmfConfig) -> Result<()> {
    let mgr = Arc::new(ConnectorMgr::new(&config.paths));
    setup_signal_handlers(mgr.cancel_handle());

    // Connector operations block on file I/O and the device poll.
    let host_nqn_file = config.paths.host_nqn_file;
    tokio::task::spawn_blocking(move || match command {
        Command::Connect(args) => connect(&mgr, args, &host_nqn_file),
        Command::Disconnect(args) => disconnect(&mgr, args, &host_nqn_file),
    })
    .await
    .context("connector worker panicked")?
}

/// Cancels a pending device wait on SIGINT
fn setup_signal_handlers(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received SIGINT, cancelling device wait");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

fn resolve_host_nqn(explicit: Option<String>, host_nqn_file: &Path) -> Result<String> {
    match explicit {
        Some(host_nqn) => Ok(host_nqn),
        None => read_host_nqn(host_nqn_file)
            .with_context(|| format!("cannot read host NQN from {}", host_nqn_file.display())),
    }
}

fn connect(mgr: &ConnectorMgr, args: ConnectArgs, host_nqn_file: &Path) -> Result<()> {
    let host_nqn = resolve_host_nqn(args.host_nqn, host_nqn_file)?;
    let info = NvmfDiskInfo {
        vol_name: args.volume_id,
        nqn: args.nqn,
        addr: args.addr,
        port: args.port,
        device_uuid: args.device_uuid,
        transport: args.transport,
    };
    let mut connector = Connector::from_disk_info(&info, host_nqn);
    connector.retry_count = args.retry_count;
    connector.check_interval = args.check_interval;

    let device = mgr.connect(&mut connector).context("connect failed")?;

    if let Some(target_path) = args.target_path {
        let record = connector_file_path(&target_path);
        if let Err(e) = persist_connector(&connector, &record) {
            error!(error = %e, "Cannot persist connector, disconnecting");
            if let Err(e) = mgr.disconnect(&connector) {
                error!(error = %e, "Disconnect after persist failure failed");
            }
            return Err(e).context("persist failed");
        }
        info!(record = %record.display(), "Connector persisted");
    }

    println!("{}", device.display());
    Ok(())
}

fn disconnect(mgr: &ConnectorMgr, args: DisconnectArgs, host_nqn_file: &Path) -> Result<()> {
    let connector = match &args.target_path {
        Some(target_path) => match load_connector(connector_file_path(target_path)) {
            Ok(connector) => connector,
            Err(e) if e.is_not_found() => {
                warn!(target = %target_path.display(), "No connector record, nothing to disconnect");
                remove_connector_file(target_path);
                return Ok(());
            }
            Err(e) => return Err(e).context("cannot load connector record"),
        },
        None => Connector {
            target_nqn: args.nqn.clone().unwrap_or_default(),
            host_nqn: resolve_host_nqn(args.host_nqn.clone(), host_nqn_file)?,
            ..Default::default()
        },
    };

    mgr.disconnect(&connector).context("disconnect failed")?;

    if let Some(target_path) = &args.target_path {
        remove_connector_file(target_path);
    }
    info!(nqn = %connector.target_nqn, "Disconnected");
    Ok(())
}
