//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::config::UmpireConfig;
use crate::error::{ConfigError, Result};

/// Payload manifest of a bundle: payload type, then part name, then value.
/// Parts named `file` or `part<N>` hold resource names.
pub type PayloadManifest = BTreeMap<String, BTreeMap<String, Value>>;

/// Resolves resource names inside the resources directory.
pub trait ResourceLocator {
    /// Path of an existing resource. Fails with `NotFound` when absent.
    fn resource_path(&self, name: &str) -> io::Result<PathBuf>;

    fn payloads(&self, name: &str) -> Result<PayloadManifest> {
        let path = self
            .resource_path(name)
            .map_err(|source| ConfigError::Io {
                path: PathBuf::from(name),
                source,
            })?;
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|err| ConfigError::Parse {
            message: format!("payload manifest {}: {}", name, err),
        })
    }
}

fn is_resource_part(part: &str) -> bool {
    part == "file"
        || part
            .strip_prefix("part")
            .map(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
}

/// Check that every resource referenced by an active bundle exists.
///
/// Checks all bundles before failing and reports every missing resource.
pub fn validate_resources(config: &UmpireConfig, locator: &dyn ResourceLocator) -> Result<()> {
    let mut missing = Vec::new();
    let mut seen = HashSet::new();

    for bundle in config.active_bundles() {
        if !seen.insert(bundle.id.as_str()) {
            continue;
        }
        let manifest = match locator.payloads(&bundle.payloads) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(bundle = %bundle.id, error = %err, "unable to read payload manifest");
                missing.push(format!(
                    "[NOT FOUND] payloads {:?} for bundle {:?}",
                    bundle.payloads, bundle.id
                ));
                continue;
            }
        };
        for (type_name, parts) in &manifest {
            for (part, value) in parts {
                let Some(resource) = value.as_str().filter(|_| is_resource_part(part)) else {
                    continue;
                };
                if locator.resource_path(resource).is_err() {
                    missing.push(format!(
                        "[NOT FOUND] resource {}:{}:{:?} for bundle {:?}",
                        type_name, part, resource, bundle.id
                    ));
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingResources { missing })
    }
}
