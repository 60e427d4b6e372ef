//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Administrative command surface, independent of any transport.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use umpire_config::{validate_resources, ConfigSource, ServiceCatalog, UmpireConfig};

use crate::daemon::UmpireDaemon;
use crate::deployer::ConfigDeployer;
use crate::env::{UmpireEnv, UMPIRE_CONFIG_TYPE};
use crate::error::{Result, UmpireError};

#[derive(Debug, Clone)]
pub struct CliCommands {
    daemon: Arc<UmpireDaemon>,
    deployer: ConfigDeployer,
}

impl CliCommands {
    pub fn new(daemon: Arc<UmpireDaemon>) -> Self {
        let deployer = ConfigDeployer::new(daemon.clone());
        Self { daemon, deployer }
    }

    fn env(&self) -> &UmpireEnv {
        self.daemon.env()
    }

    pub async fn deploy(&self, config_res: &str) -> Result<String> {
        self.deployer.deploy(config_res).await
    }

    /// Redeploy the live config; `restart_all` also restarts unchanged services.
    pub async fn redeploy(&self, restart_all: bool) -> Result<()> {
        self.daemon.deploy(restart_all).await
    }

    pub fn get_staging_config(&self) -> Result<Option<String>> {
        self.env().get_staging_config()
    }

    /// Stage a resource name or a file path; `None` stages the active config.
    pub fn stage_config_file(&self, config: Option<&str>, force: bool) -> Result<()> {
        let path = config.map(|config| {
            self.env()
                .get_resource_path(config)
                .unwrap_or_else(|_| PathBuf::from(config))
        });
        self.env().stage_config_file(path.as_deref(), force)
    }

    pub fn unstage_config_file(&self) -> Result<()> {
        self.env().unstage_config_file()
    }

    /// Validate a config document, including the resources it references.
    pub fn validate_config(&self, text: &str) -> Result<()> {
        let env = self.env();
        let catalog: &dyn ServiceCatalog = &**env.registry();
        let config = UmpireConfig::load(ConfigSource::Text(text), Some(catalog))?;
        validate_resources(&config, env)?;
        Ok(())
    }

    pub fn show_diff(&self, old_text: &str, new_text: &str) -> Result<Vec<String>> {
        let original: UmpireConfig = old_text.parse()?;
        let new: UmpireConfig = new_text.parse()?;
        Ok(umpire_config::show_diff(&original, &new)?)
    }

    pub fn is_deploying(&self) -> bool {
        self.daemon.is_deploying()
    }

    pub fn get_active_config(&self) -> Result<String> {
        let path = self.env().active_config_file();
        fs::read_to_string(&path).map_err(|source| UmpireError::io(path, source))
    }

    /// Store an uploaded config as a resource and return its name.
    pub fn add_config_from_blob(&self, blob: &[u8]) -> Result<String> {
        self.env().add_config_from_blob(blob, UMPIRE_CONFIG_TYPE)
    }

    pub async fn start_services(&self, names: &[String]) -> Result<()> {
        self.daemon.start_services(names).await
    }

    pub async fn stop_services(&self, names: &[String]) -> Result<()> {
        self.daemon.stop_services(names).await
    }

    pub async fn stop_umpired(&self) {
        info!("stop requested");
        self.daemon.stop().await;
    }
}
