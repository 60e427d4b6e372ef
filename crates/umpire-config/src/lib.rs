//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Configuration model for the Umpire deployment server.
//!
//! A configuration document routes devices to bundles through an ordered list
//! of rulesets and declares which auxiliary services run. [`UmpireConfig`] owns
//! one parsed document; every constructor yields an independent value, so a
//! staged document can never alias the deployed one.

pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod resources;
pub mod schema;

pub use config::{ConfigSource, UmpireConfig};
pub use diff::show_diff;
pub use document::{
    Bundle, ConfigDocument, EnableUpdate, HandlerConfig, RuleMatcher, Ruleset, ServiceConfig,
    ServiceSection, ShopFloorSettings, StageRange, KNOWN_SERVICES,
};
pub use error::{ConfigError, Result};
pub use resources::{validate_resources, PayloadManifest, ResourceLocator};
pub use schema::{PropertySchema, ServiceCatalog, ServiceSchema, ValueKind};
