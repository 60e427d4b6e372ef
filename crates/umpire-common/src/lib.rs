//! ---
//! umpire_section: "01-core-functionality"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Shared primitives and utilities for the daemon runtime."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Shared primitives for the Umpire workspace.
//! This crate exposes daemon settings, the port layout derived from the base
//! port, and the tracing bootstrap consumed by the daemon binary.

pub mod logging;
pub mod settings;

pub use logging::{init_tracing, LogFormat};
pub use settings::{DaemonSettings, LoggingSettings, PortLayout, DEFAULT_BASE_PORT};
