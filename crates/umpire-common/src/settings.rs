//! ---
//! umpire_section: "01-core-functionality"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Shared primitives and utilities for the daemon runtime."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Base port used when neither the settings nor the deployed document override it.
pub const DEFAULT_BASE_PORT: u16 = 8080;

const WEBAPP_PORT_OFFSET: u16 = 1;
const CLI_PORT_OFFSET: u16 = 2;
const RPC_PORT_OFFSET: u16 = 3;
const RSYNC_PORT_OFFSET: u16 = 4;
const HTTP_POST_PORT_OFFSET: u16 = 5;
const INSTALOG_PULL_SOCKET_OFFSET: u16 = 6;
const INSTALOG_HTTP_PORT_OFFSET: u16 = 7;

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/db/factory/umpire")
}

fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(3)
}

fn default_service_start_window() -> Duration {
    Duration::from_millis(1200)
}

fn default_service_stop_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_logging_directory() -> PathBuf {
    default_base_dir().join("log")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_file_logging() -> bool {
    true
}

/// Settings of the daemon process itself, as opposed to the deployable
/// configuration document it serves.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Delay before a forced halt once a second stop signal arrives.
    #[serde(default = "default_shutdown_grace")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_grace: Duration,
    /// A spawned service process must stay alive this long to count as started.
    #[serde(default = "default_service_start_window")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub service_start_window: Duration,
    #[serde(default = "default_service_stop_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub service_stop_timeout: Duration,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl DaemonSettings {
    pub const ENV_SETTINGS_PATH: &'static str = "UMPIRE_SETTINGS";

    /// Load settings from `explicit`, falling back to `UMPIRE_SETTINGS` and
    /// finally to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(env_path) = std::env::var(Self::ENV_SETTINGS_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(Path::new(&env_path));
            }
        }
        debug!("no settings file given; using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(settings_path = %path.display(), "loading daemon settings");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read settings file {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }

    pub fn ports(&self) -> PortLayout {
        PortLayout::from_base(self.base_port)
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            base_port: default_base_port(),
            shutdown_grace: default_shutdown_grace(),
            service_start_window: default_service_start_window(),
            service_stop_timeout: default_service_stop_timeout(),
            logging: LoggingSettings::default(),
        }
    }
}

impl std::str::FromStr for DaemonSettings {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).with_context(|| "failed to parse daemon settings")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_file_logging")]
    pub file: bool,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file: default_file_logging(),
            file_prefix: None,
        }
    }
}

/// Listening ports of the daemon and its services, all derived from one base port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayout {
    pub base: u16,
    pub webapp: u16,
    /// Loopback-restricted administrative RPC.
    pub cli: u16,
    /// Device-facing RPC.
    pub rpc: u16,
    pub rsync: u16,
    pub http_post: u16,
    pub instalog_pull_socket: u16,
    pub instalog_http: u16,
}

impl PortLayout {
    pub fn from_base(base: u16) -> Self {
        Self {
            base,
            webapp: base.saturating_add(WEBAPP_PORT_OFFSET),
            cli: base.saturating_add(CLI_PORT_OFFSET),
            rpc: base.saturating_add(RPC_PORT_OFFSET),
            rsync: base.saturating_add(RSYNC_PORT_OFFSET),
            http_post: base.saturating_add(HTTP_POST_PORT_OFFSET),
            instalog_pull_socket: base.saturating_add(INSTALOG_PULL_SOCKET_OFFSET),
            instalog_http: base.saturating_add(INSTALOG_HTTP_PORT_OFFSET),
        }
    }
}

impl Default for PortLayout {
    fn default() -> Self {
        Self::from_base(DEFAULT_BASE_PORT)
    }
}
