//! ---
//! umpire_section: "05-daemon"
//! umpire_subsection: "binary"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Binary entrypoint for the Umpire daemon."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use umpire_common::{init_tracing, DaemonSettings};
use umpire_config::{validate_resources, ServiceCatalog, UmpireConfig};
use umpire_core::{UmpireDaemon, UmpireEnv};
use umpire_service::{ServiceRegistry, SupervisorTiming};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Umpire factory deployment daemon",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "FILE",
        env = "UMPIRE_SETTINGS",
        help = "Path to the daemon settings file"
    )]
    settings: Option<PathBuf>,

    #[arg(long, value_name = "DIR", env = "UMPIRE_BASE_DIR", help = "Override the base directory")]
    base_dir: Option<PathBuf>,

    #[arg(long, value_name = "PORT", env = "UMPIRE_BASE_PORT", help = "Override the base port")]
    base_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Deploy the active config and serve until stopped")]
    Run,
    #[command(about = "Validate a config file and the resources it references")]
    Validate { file: PathBuf },
    #[command(about = "Show ruleset changes between two config files")]
    Diff { old: PathBuf, new: PathBuf },
    #[command(about = "Print the canonical form of a config file")]
    Dump { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = DaemonSettings::load(cli.settings.as_deref())?;
    if let Some(base_dir) = cli.base_dir {
        if settings.logging.directory.starts_with(&settings.base_dir) {
            settings.logging.directory = base_dir.join("log");
        }
        settings.base_dir = base_dir;
    }
    if let Some(base_port) = cli.base_port {
        settings.base_port = base_port;
    }

    let command = cli.command.unwrap_or(Commands::Run);
    if !matches!(command, Commands::Run) {
        settings.logging.file = false;
    }
    init_tracing("umpired", &settings.logging)?;

    let timing = SupervisorTiming {
        start_window: settings.service_start_window,
        stop_timeout: settings.service_stop_timeout,
    };
    let registry = Arc::new(ServiceRegistry::builtin(timing));
    let env = Arc::new(UmpireEnv::from_settings(&settings, registry));

    match command {
        Commands::Run => run_daemon(&settings, env).await?,
        Commands::Validate { file } => {
            let catalog: &dyn ServiceCatalog = &**env.registry();
            let config = UmpireConfig::from_path(&file, Some(catalog))
                .with_context(|| format!("invalid config {}", file.display()))?;
            validate_resources(&config, &*env)
                .with_context(|| format!("missing resources for {}", file.display()))?;
            println!("{}: OK", file.display());
        }
        Commands::Diff { old, new } => {
            let old = read_unvalidated(&old)?;
            let new = read_unvalidated(&new)?;
            for line in umpire_config::show_diff(&old, &new)? {
                println!("{}", line);
            }
        }
        Commands::Dump { file } => {
            println!("{}", read_unvalidated(&file)?.dump()?);
        }
    }

    Ok(())
}

fn read_unvalidated(path: &Path) -> Result<UmpireConfig> {
    UmpireConfig::from_path(path, None).with_context(|| format!("unable to read config {}", path.display()))
}

async fn run_daemon(settings: &DaemonSettings, env: Arc<UmpireEnv>) -> Result<()> {
    env.ensure_layout()
        .with_context(|| format!("unable to prepare {}", env.base_dir().display()))?;
    let daemon = Arc::new(UmpireDaemon::new(env.clone()).with_shutdown_grace(settings.shutdown_grace));
    info!(
        base_dir = %env.base_dir().display(),
        base_port = settings.base_port,
        services = ?env.registry().list_all_service_names(),
        "umpire daemon starting"
    );

    if env.active_config_file().exists() {
        env.load_config(None, true).context("unable to load active config")?;
        if let Err(err) = daemon.deploy(false).await {
            error!(error = %err, "initial deployment failed; stopping");
            daemon.stop().await;
            return Err(err).context("initial deployment failed");
        }
        info!(ports = ?env.ports(), "active config deployed");
    } else {
        warn!(
            config = %env.active_config_file().display(),
            "no active config; waiting for a deployment"
        );
    }

    let mut signals = ShutdownSignals::new()?;
    loop {
        tokio::select! {
            reason = daemon.halted() => {
                info!(reason = ?reason, "umpire daemon halted");
                break;
            }
            received = signals.recv() => {
                let name = received?;
                info!(signal = name, "shutdown signal received");
                let daemon = daemon.clone();
                tokio::spawn(async move { daemon.stop().await });
            }
        }
    }
    Ok(())
}

struct ShutdownSignals {
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal::unix::signal(signal::unix::SignalKind::terminate())
                .context("unable to install SIGTERM handler")?,
        })
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Result<&'static str> {
        tokio::select! {
            interrupted = signal::ctrl_c() => {
                interrupted?;
                Ok("SIGINT")
            }
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Result<&'static str> {
        signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
