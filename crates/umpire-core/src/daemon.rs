//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Deployment orchestrator.
//!
//! A deployment stops the services that are no longer wanted, then starts
//! every desired service. Only one deployment runs at a time; a failed one
//! restores the previous service topology and keeps the deployed snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};
use umpire_config::UmpireConfig;
use umpire_service::{concentrate, ServiceRegistry};

use crate::env::UmpireEnv;
use crate::error::{Result, UmpireError};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Services to stop and then start for one deployment, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPlan {
    pub stopping: Vec<String>,
    pub starting: Vec<String>,
}

impl DeployPlan {
    /// Every desired service is (re)started; each service's `start` decides
    /// whether anything actually changes. With `restart_all` every currently
    /// active service is stopped first.
    pub fn compute(current: Option<&UmpireConfig>, desired: &UmpireConfig, restart_all: bool) -> Self {
        let current_active: Vec<&str> = current
            .map(|config| config.services().active_names().collect())
            .unwrap_or_default();
        let desired_active: Vec<&str> = desired.services().active_names().collect();

        let stopping = current_active
            .iter()
            .filter(|name| restart_all || !desired_active.contains(name))
            .map(|name| (*name).to_owned())
            .collect();
        let starting = desired_active.iter().map(|name| (*name).to_owned()).collect();
        Self { stopping, starting }
    }
}

/// The configuration currently believed to be running.
#[derive(Debug, Clone)]
pub struct DeployedSnapshot {
    pub config: Arc<UmpireConfig>,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Every service was stopped.
    Graceful,
    /// A second stop request arrived and the grace period ran out.
    Forced,
}

/// Clears the deploying flag on every exit path.
struct DeployGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DeployGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { flag })
            .map_err(|_| UmpireError::DeploymentInProgress)
    }
}

impl Drop for DeployGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct UmpireDaemon {
    env: Arc<UmpireEnv>,
    deploying: AtomicBool,
    stopping: AtomicBool,
    deployed: RwLock<Option<DeployedSnapshot>>,
    halt: Arc<watch::Sender<Option<HaltReason>>>,
    shutdown_grace: Duration,
}

impl UmpireDaemon {
    pub fn new(env: Arc<UmpireEnv>) -> Self {
        let (halt, _) = watch::channel(None);
        Self {
            env,
            deploying: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            deployed: RwLock::new(None),
            halt: Arc::new(halt),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn env(&self) -> &Arc<UmpireEnv> {
        &self.env
    }

    fn registry(&self) -> &ServiceRegistry {
        self.env.registry()
    }

    pub fn is_deploying(&self) -> bool {
        self.deploying.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn deployed_snapshot(&self) -> Option<DeployedSnapshot> {
        self.deployed.read().clone()
    }

    pub fn deployed_config(&self) -> Option<Arc<UmpireConfig>> {
        self.deployed.read().as_ref().map(|snapshot| snapshot.config.clone())
    }

    /// Deploy the environment's live config.
    pub async fn deploy(&self, restart_all: bool) -> Result<()> {
        let _guard = DeployGuard::acquire(&self.deploying)?;
        if self.is_stopping() {
            return Err(UmpireError::Stopping);
        }
        let desired = self.env.config().ok_or(UmpireError::ConfigNotLoaded)?;
        let previous = self.deployed_snapshot();
        let plan = DeployPlan::compute(
            previous.as_ref().map(|snapshot| snapshot.config.as_ref()),
            &desired,
            restart_all,
        );
        info!(
            stopping = ?plan.stopping,
            starting = ?plan.starting,
            restart_all,
            "deploying config"
        );

        let outcome = match self.stop_services(&plan.stopping).await {
            // No service starts once a shutdown has begun.
            Ok(()) if self.is_stopping() => Err(UmpireError::Stopping),
            Ok(()) => self.start_services_with(&plan.starting, &desired).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                let snapshot = DeployedSnapshot {
                    config: desired,
                    deployed_at: Utc::now(),
                };
                info!(deployed_at = %snapshot.deployed_at, "config deployed");
                *self.deployed.write() = Some(snapshot);
                Ok(())
            }
            Err(UmpireError::Stopping) => {
                warn!("daemon stopping; deployment abandoned before start");
                Err(UmpireError::Stopping)
            }
            Err(err) => {
                error!(error = %err, "deploy failed; rolling back");
                self.rollback(&plan, previous.as_ref()).await;
                Err(err)
            }
        }
    }

    /// Undo a failed deployment. Failures are logged, never returned.
    async fn rollback(&self, plan: &DeployPlan, previous: Option<&DeployedSnapshot>) {
        if let Err(err) = self.stop_services(&plan.starting).await {
            error!(error = %err, services = ?plan.starting, "rollback: failed to stop services");
        }
        if plan.stopping.is_empty() {
            return;
        }
        let Some(previous) = previous else {
            warn!(services = ?plan.stopping, "rollback: no previous deployment to restart from");
            return;
        };
        match self.start_services_with(&plan.stopping, &previous.config).await {
            Ok(()) => info!(services = ?plan.stopping, "rollback: services restored"),
            Err(err) => {
                error!(error = %err, services = ?plan.stopping, "rollback: failed to restart services")
            }
        }
    }

    /// Start `names` with the live config.
    pub async fn start_services(&self, names: &[String]) -> Result<()> {
        let config = self.env.config().ok_or(UmpireError::ConfigNotLoaded)?;
        self.start_services_with(names, &config).await
    }

    async fn start_services_with(&self, names: &[String], config: &UmpireConfig) -> Result<()> {
        let context = self.env.service_context();
        let context = &context;
        let operations = names.iter().map(|name| async move {
            let service = self.registry().get_service_instance(name)?;
            let processes = service.create_processes(config, context)?;
            service.start(processes).await.map_err(|err| {
                error!(service = %name, error = %err, "service failed to start");
                err
            })?;
            info!(service = %name, "service started");
            Ok(())
        });
        concentrate(operations).await?;
        Ok(())
    }

    pub async fn stop_services(&self, names: &[String]) -> Result<()> {
        let operations = names.iter().map(|name| async move {
            let service = self.registry().get_service_instance(name)?;
            service.stop().await.map_err(|err| {
                error!(service = %name, error = %err, "service failed to stop");
                err
            })?;
            info!(service = %name, "service stopped");
            Ok(())
        });
        concentrate(operations).await?;
        Ok(())
    }

    /// Stop every registered service, then signal a halt.
    ///
    /// A repeated call does not stop anything again; it schedules a forced
    /// halt after the shutdown grace period.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            warn!(grace = ?self.shutdown_grace, "stop already in progress; forcing halt after grace period");
            let halt = self.halt.clone();
            let grace = self.shutdown_grace;
            tokio::spawn(async move {
                sleep(grace).await;
                halt.send_replace(Some(HaltReason::Forced));
            });
            return;
        }

        info!("stopping umpire daemon");
        let names = self.registry().list_all_service_names();
        if let Err(err) = self.stop_services(&names).await {
            error!(error = %err, "failed to stop services");
        }
        self.halt.send_replace(Some(HaltReason::Graceful));
    }

    /// Resolves once [`UmpireDaemon::stop`] has finished or a forced halt fired.
    pub async fn halted(&self) -> HaltReason {
        let mut receiver = self.halt.subscribe();
        loop {
            if let Some(reason) = *receiver.borrow_and_update() {
                return reason;
            }
            if receiver.changed().await.is_err() {
                return HaltReason::Forced;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(services: &str) -> UmpireConfig {
        format!(
            r#"{{"rulesets": [{{"bundle_id": "b", "note": "", "active": true}}],
                "services": {services},
                "bundles": [{{"id": "b", "note": "", "payloads": "p"}}]}}"#
        )
        .parse()
        .expect("config")
    }

    #[test]
    fn first_deploy_starts_everything_desired() {
        let desired = config(r#"{"rsync": {}, "dkps": {"active": false}, "umpire_http": {}}"#);
        let plan = DeployPlan::compute(None, &desired, false);
        assert!(plan.stopping.is_empty());
        assert_eq!(plan.starting, vec!["umpire_http", "rsync"]);
    }

    #[test]
    fn deactivated_service_is_stopped() {
        let current = config(r#"{"rsync": {}, "instalog": {}}"#);
        let desired = config(r#"{"rsync": {}, "instalog": {"active": false}}"#);
        let plan = DeployPlan::compute(Some(&current), &desired, false);
        assert_eq!(plan.stopping, vec!["instalog"]);
        assert_eq!(plan.starting, vec!["rsync"]);
    }

    #[test]
    fn guard_is_single_flight_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = DeployGuard::acquire(&flag).expect("first acquire");
        assert!(matches!(
            DeployGuard::acquire(&flag),
            Err(UmpireError::DeploymentInProgress)
        ));
        drop(guard);
        assert!(DeployGuard::acquire(&flag).is_ok());
    }
}
