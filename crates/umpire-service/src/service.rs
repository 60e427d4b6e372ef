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

use async_trait::async_trait;
use umpire_common::PortLayout;
use umpire_config::{ServiceSchema, UmpireConfig};

use crate::error::Result;
use crate::process::ProcessSpec;

/// Filesystem and network facts a service needs to build its processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub base_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
    pub run_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub data_dir: PathBuf,
    pub ports: PortLayout,
}

impl ServiceContext {
    /// Standard layout below `base_dir`.
    pub fn from_base_dir(base_dir: impl Into<PathBuf>, ports: PortLayout) -> Self {
        let base_dir = base_dir.into();
        Self {
            resources_dir: base_dir.join("resources"),
            config_dir: base_dir.join("conf"),
            log_dir: base_dir.join("log"),
            run_dir: base_dir.join("run"),
            temp_dir: base_dir.join("temp"),
            data_dir: base_dir.join("umpire_data"),
            base_dir,
            ports,
        }
    }
}

/// Contract between the deployment orchestrator and one auxiliary service.
///
/// `start` must be safe to call again with an unchanged process list: the
/// orchestrator restarts every desired service on each deployment.
#[async_trait]
pub trait UmpireService: Send + Sync {
    fn name(&self) -> &str;

    /// Properties accepted in this service's configuration section.
    fn schema(&self) -> ServiceSchema;

    /// Derive the processes this service should run. `config` must not be
    /// modified.
    fn create_processes(
        &self,
        config: &UmpireConfig,
        context: &ServiceContext,
    ) -> Result<Vec<ProcessSpec>>;

    /// Converge the running processes on `processes`.
    async fn start(&self, processes: Vec<ProcessSpec>) -> Result<()>;

    /// Stop every process of this service.
    async fn stop(&self) -> Result<()>;
}
