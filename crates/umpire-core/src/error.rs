//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;
use umpire_config::ConfigError;
use umpire_service::ServiceError;

pub type Result<T> = std::result::Result<T, UmpireError>;

#[derive(Debug, Error)]
pub enum UmpireError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("another deployment in progress")]
    DeploymentInProgress,
    #[error("umpire daemon is stopping")]
    Stopping,
    #[error("umpire config not loaded yet")]
    ConfigNotLoaded,
    #[error("another config is already staged")]
    AlreadyStaged,
    #[error("unable to activate missing config: {}", .0.display())]
    MissingConfig(PathBuf),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("hash collision: file {} != resource file {}", .source_path.display(), .resource.display())]
    HashCollision { source_path: PathBuf, resource: PathBuf },
    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("deploy failed: {cause}. Successfully rolled back to config {}", .config.display())]
    RolledBack { cause: String, config: PathBuf },
    #[error("deploy failed: {cause}. Rollback to config {} failed: {rollback}", .config.display())]
    RollbackFailed {
        cause: String,
        config: PathBuf,
        rollback: String,
    },
}

impl UmpireError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UmpireError::Io {
            path: path.into(),
            source,
        }
    }
}
