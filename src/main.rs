//! oxidesftp command line
//!
//! Composition root: builds the one `SftpManager` of the process and hands it
//! to whatever the chosen command needs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use oxidesftp::session::HealthMonitor;
use oxidesftp::{init_logging, RusshTransport, Settings, SftpManager};

#[derive(Debug, Parser)]
#[command(name = "oxidesftp")]
#[command(author = "OxideTerm Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SFTP session manager with automatic reconnection")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// JSON settings file; SFTP_* environment variables override it
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a remote directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create a remote directory
    Mkdir { path: String },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
    /// Download a remote file
    Get { remote: String, local: PathBuf },
    /// Delete a remote file or directory tree
    Rm { path: String },
    /// Move a file or directory tree (copy, then delete the source)
    Mv { source: String, target: String },
    /// Copy a file or directory tree
    Cp { source: String, target: String },
    /// Rename with a single protocol call
    Rename { from: String, to: String },
    /// Exit 0 if the path exists, 1 otherwise
    Exists { path: String },
    /// Connect and print the session status as JSON
    Status,
    /// Keep the session alive: health monitor plus a periodic probe, until Ctrl-C
    Watch {
        /// Probe interval in seconds
        #[arg(long, default_value = "60")]
        probe_interval: u64,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let settings = Settings::load(cli.config.as_deref()).await?;
    info!("Using {:?}", settings.sftp);

    let manager = Arc::new(SftpManager::new(
        Arc::new(RusshTransport::new()),
        settings.reconnect.clone(),
    ));

    if let Command::Watch { probe_interval } = cli.command {
        watch(manager, settings, Duration::from_secs(probe_interval)).await;
        return Ok(0);
    }

    manager.connect(settings.sftp.clone()).await?;
    let code = execute(&manager, cli.command).await;
    manager.disconnect().await;
    code
}

async fn execute(manager: &SftpManager, command: Command) -> Result<i32, Box<dyn std::error::Error>> {
    match command {
        Command::Ls { path, json } => {
            let entries = manager.list_files(&path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let modified = entry
                        .modified_at()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    let suffix = if entry.is_dir() { "/" } else { "" };
                    println!(
                        "{:>4} {:>12} {:>16}  {}{}",
                        entry.permissions_octal(),
                        entry.size,
                        modified,
                        entry.name,
                        suffix
                    );
                }
            }
        }
        Command::Mkdir { path } => manager.create_directory(&path).await?,
        Command::Put { local, remote } => {
            let bytes = manager.upload_file(&local, &remote).await?;
            println!("{} bytes uploaded to {}", bytes, remote);
        }
        Command::Get { remote, local } => {
            let bytes = manager.download_file(&remote, &local).await?;
            println!("{} bytes downloaded to {}", bytes, local.display());
        }
        Command::Rm { path } => manager.delete_file(&path).await?,
        Command::Mv { source, target } => manager.move_path(&source, &target).await?,
        Command::Cp { source, target } => manager.copy(&source, &target).await?,
        Command::Rename { from, to } => manager.rename_file(&from, &to).await?,
        Command::Exists { path } => {
            let exists = manager.exists(&path).await?;
            println!("{}", exists);
            return Ok(if exists { 0 } else { 1 });
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&manager.status_info())?);
        }
        Command::Watch { .. } => return Err("watch is not a one-shot command".into()),
    }
    Ok(0)
}

/// Long-running mode: health monitor plus an active probe job
async fn watch(manager: Arc<SftpManager>, settings: Settings, probe_interval: Duration) {
    manager.on_connection_change(|connected, err| match err {
        Some(e) => warn!("Connection changed: connected={} ({})", connected, e),
        None => info!("Connection changed: connected={}", connected),
    });

    if let Err(e) = manager.connect(settings.sftp.clone()).await {
        warn!("Initial connect failed: {}", e);
    }

    let monitor = HealthMonitor::new(settings.health.clone());
    monitor.start(manager.clone());

    let probe = tokio::spawn(probe_loop(manager.clone(), settings, probe_interval));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");

    probe.abort();
    monitor.stop();
    manager.disconnect().await;
}

/// List `/` periodically; on failure force a fresh connect cycle
async fn probe_loop(manager: Arc<SftpManager>, settings: Settings, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        interval.tick().await;
        match manager.list_files("/").await {
            Ok(entries) => info!("Probe OK ({} entries in /)", entries.len()),
            Err(e) => {
                warn!("Probe failed: {}, forcing reconnect", e);
                manager.reset_reconnect_attempts();
                manager.set_auto_reconnect(true);
                let config = manager.last_config().unwrap_or_else(|| settings.sftp.clone());
                match manager.connect(config).await {
                    Ok(()) => info!("Probe reconnect succeeded"),
                    Err(e) => warn!("Probe reconnect failed: {}", e),
                }
            }
        }
    }
}
