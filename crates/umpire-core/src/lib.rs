//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Runtime core of the Umpire daemon.
//!
//! [`UmpireEnv`] owns the on-disk layout and the live configuration,
//! [`UmpireDaemon`] turns configuration changes into service stop/start plans,
//! [`ConfigDeployer`] wraps a deployment with validation and config file
//! bookkeeping, and [`CliCommands`] is the administrative surface handed to
//! whatever transport fronts the daemon.

pub mod commands;
pub mod daemon;
pub mod deployer;
pub mod env;
pub mod error;

pub use commands::CliCommands;
pub use daemon::{DeployPlan, DeployedSnapshot, HaltReason, UmpireDaemon};
pub use deployer::{ConfigDeployer, DEPLOY_SUCCESS};
pub use env::{LoadedConfig, UmpireEnv};
pub use error::{Result, UmpireError};
