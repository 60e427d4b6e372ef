//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {message}")]
    Parse { message: String },
    #[error("unable to load service module for service '{name}'")]
    UnknownService { name: String },
    #[error("schema violation at '{path}': {message}")]
    Schema { path: String, message: String },
    #[error("missing default bundle")]
    MissingDefaultBundle,
    #[error("resources of active bundles are missing:\n{}", .missing.join("\n"))]
    MissingResources { missing: Vec<String> },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}
