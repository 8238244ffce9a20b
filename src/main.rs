use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kdb_snapshot::{
    read_snapshot, LoadOutcome, RecoveryPolicy, ShutdownOutcome, SnapshotConfig, SnapshotService,
    Store, WriteDurability,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kdb-snapshot")]
#[command(about = "Load, serve and inspect KDB snapshot files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load (or create) a snapshot and flush it periodically until interrupted.
    Run {
        path: PathBuf,
        #[arg(long, default_value_t = 60_000)]
        save_period_ms: u64,
        #[arg(long, default_value = "kdb")]
        store_id: String,
        #[arg(long, default_value = "primary")]
        role: String,
        #[arg(long, value_enum, default_value_t = Durability::Atomic)]
        durability: Durability,
        /// Move a corrupt snapshot aside and start empty instead of failing.
        #[arg(long)]
        start_empty_on_corrupt: bool,
        /// Give up on the final flush after this many milliseconds.
        #[arg(long)]
        shutdown_timeout_ms: Option<u64>,
    },
    /// Print the info section and section sizes of a snapshot.
    Inspect { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Durability {
    Atomic,
    InPlace,
}

impl From<Durability> for WriteDurability {
    fn from(d: Durability) -> Self {
        match d {
            Durability::Atomic => WriteDurability::Atomic,
            Durability::InPlace => WriteDurability::InPlace,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            path,
            save_period_ms,
            store_id,
            role,
            durability,
            start_empty_on_corrupt,
            shutdown_timeout_ms,
        } => {
            let recovery = if start_empty_on_corrupt {
                RecoveryPolicy::StartEmpty
            } else {
                RecoveryPolicy::FailFast
            };
            let config = SnapshotConfig::new(path)
                .with_save_period_ms(save_period_ms)
                .with_identity(store_id, role)
                .with_durability(durability.into())
                .with_recovery(recovery);
            run(config, shutdown_timeout_ms.map(Duration::from_millis))
        }
        Command::Inspect { path } => inspect(path),
    }
}

fn run(config: SnapshotConfig, shutdown_timeout: Option<Duration>) -> Result<()> {
    let path = config.path.clone();
    let (service, outcome) = SnapshotService::open(config, Store::shared())
        .with_context(|| format!("failed to open snapshot '{}'", path.display()))?;

    match &outcome {
        LoadOutcome::Loaded { points, collections, .. } => {
            info!(points, collections, "store restored")
        }
        LoadOutcome::Bootstrapped(info) => info!(id = %info.id, "fresh snapshot created"),
        LoadOutcome::Skipped(phase) => info!(?phase, "load skipped"),
    }

    service.start();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime.block_on(shutdown_signal());

    info!("shutdown requested, flushing snapshot");
    let outcome = match shutdown_timeout {
        Some(timeout) => service.shutdown_timeout(timeout),
        None => service.shutdown(),
    };
    match outcome {
        ShutdownOutcome::Flushed(info) => info!(id = %info.id, "snapshot flushed, exiting"),
        ShutdownOutcome::SkippedLoadInProgress => info!("load in progress, exiting without flush"),
        ShutdownOutcome::TimedOut => error!("final flush timed out, exiting"),
        ShutdownOutcome::Failed(e) => error!(error = %e, "final flush failed, exiting"),
    }

    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let file = read_snapshot(&path)
        .with_context(|| format!("failed to read snapshot '{}'", path.display()))?;

    println!("{}", serde_json::to_string_pretty(&file.info)?);
    let records = file.commands.iter().filter(|c| !c.is_empty()).count();
    println!("command records: {}", records);
    println!("collections: {}", file.collections.len());
    for collection in &file.collections {
        println!("  - {}", collection.id);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kdb_snapshot=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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
