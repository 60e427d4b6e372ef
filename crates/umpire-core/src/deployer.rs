//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Deploys a config resource: validate, load, deploy, then either activate
//! it or restore the config that was running before.

use std::sync::Arc;

use tracing::{error, info, warn};
use umpire_config::validate_resources;

use crate::daemon::UmpireDaemon;
use crate::error::{Result, UmpireError};

pub const DEPLOY_SUCCESS: &str = "Deploy success";

#[derive(Debug, Clone)]
pub struct ConfigDeployer {
    daemon: Arc<UmpireDaemon>,
}

impl ConfigDeployer {
    pub fn new(daemon: Arc<UmpireDaemon>) -> Self {
        Self { daemon }
    }

    /// Deploy the config resource named `config_res`.
    ///
    /// On any failure the previously live config is put back, so a failed
    /// call leaves the environment as it found it.
    pub async fn deploy(&self, config_res: &str) -> Result<String> {
        if self.daemon.is_stopping() {
            return Err(UmpireError::Stopping);
        }
        if self.daemon.is_deploying() {
            return Err(UmpireError::DeploymentInProgress);
        }
        let env = self.daemon.env();
        let config_path = env.get_resource_path(config_res)?;
        let candidate = env.read_config(Some(&config_path))?;
        validate_resources(&candidate, &**env)?;

        let original = env.loaded_config();
        env.load_config(Some(&config_path), false)?;
        info!(config = %config_path.display(), "deploying config resource");

        let cause = match self.daemon.deploy(false).await {
            Ok(()) => {
                env.activate_config_file(&config_path)?;
                env.unstage_config_file()?;
                info!(config = %config_path.display(), "config deployed and activated");
                return Ok(DEPLOY_SUCCESS.to_owned());
            }
            Err(err @ (UmpireError::DeploymentInProgress | UmpireError::Stopping)) => {
                warn!(error = %err, "deploy not attempted; keeping previous config");
                env.restore_loaded_config(original);
                return Err(err);
            }
            Err(err) => err,
        };

        env.restore_loaded_config(original.clone());
        let Some(original) = original else {
            error!(error = %cause, "deploy failed with no previous config to restore");
            return Err(cause);
        };
        warn!(
            error = %cause,
            config = %original.path.display(),
            "deploy failed; restoring previous config"
        );
        match self.daemon.deploy(false).await {
            Ok(()) => Err(UmpireError::RolledBack {
                cause: cause.to_string(),
                config: original.path,
            }),
            Err(UmpireError::Stopping) => {
                warn!("daemon stopping; previous config not redeployed");
                Err(cause)
            }
            Err(rollback) => {
                error!(error = %rollback, "failed to restore previous config; stopping");
                self.daemon.stop().await;
                Err(UmpireError::RollbackFailed {
                    cause: cause.to_string(),
                    config: original.path,
                    rollback: rollback.to_string(),
                })
            }
        }
    }
}
