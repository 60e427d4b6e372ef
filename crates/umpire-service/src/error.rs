//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service '{name}'")]
    UnknownService { name: String },
    #[error("invalid process spec for {process}: {reason}")]
    InvalidSpec { process: String, reason: String },
    #[error("executable does not exist: {}", .path.display())]
    MissingExecutable { path: PathBuf },
    #[error("failed to spawn {process}")]
    Spawn {
        process: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{process} ended unexpectedly ({status}). messages:\n{}", .messages.join("\n"))]
    ExitedEarly {
        process: String,
        status: String,
        messages: Vec<String>,
    },
    #[error("{process} respawned too fast")]
    RespawnTooFast { process: String },
    #[error("{process} did not stop within {timeout_secs}s")]
    StopTimeout { process: String, timeout_secs: u64 },
    #[error("service {service} failed: {reason}")]
    Failed { service: String, reason: String },
    #[error("{}", summarize(.failures))]
    Aggregate { failures: Vec<ServiceError> },
}

fn summarize(failures: &[ServiceError]) -> String {
    match failures.first() {
        Some(first) => format!("{} operations failed; first: {}", failures.len(), first),
        None => "operation failed".to_owned(),
    }
}

impl ServiceError {
    /// First underlying failure of an aggregate, or `self`.
    pub fn first(&self) -> &ServiceError {
        match self {
            ServiceError::Aggregate { failures } => failures.first().map_or(self, |f| f.first()),
            other => other,
        }
    }
}
