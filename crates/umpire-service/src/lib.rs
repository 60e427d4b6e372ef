//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Auxiliary services managed by the Umpire daemon.
//!
//! Every service implements [`UmpireService`]: it turns the deployed
//! configuration into a list of [`ProcessSpec`]s and starts or stops them. The
//! [`ServiceRegistry`] owns one instance per service name and doubles as the
//! [`umpire_config::ServiceCatalog`] used during configuration validation.

pub mod command;
pub mod error;
pub mod fanin;
pub mod process;
pub mod registry;
pub mod service;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::CommandService;
pub use error::{Result, ServiceError};
pub use fanin::concentrate;
pub use process::{ProcessSpec, ProcessState};
pub use registry::ServiceRegistry;
pub use service::{ServiceContext, UmpireService};
pub use supervisor::{ProcessStatus, ProcessSupervisor, SupervisorTiming};
