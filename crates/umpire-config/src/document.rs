//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Serde model of the configuration document.
//!
//! Field declaration order is the canonical dump order. Service parameters and
//! free-form values are held in sorted maps so a dump never depends on input
//! key order.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Services the daemon knows how to run, in canonical dump order.
pub const KNOWN_SERVICES: &[&str] = &[
    "umpire_http",
    "rsync",
    "shop_floor",
    "instalog",
    "dkps",
    "multicast",
    "umpire_sync",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopfloor_service_url: Option<String>,
    pub rulesets: Vec<Ruleset>,
    pub services: ServiceSection,
    pub bundles: Vec<Bundle>,
}

/// Routes matching devices to a bundle. Earlier rulesets take precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ruleset {
    pub bundle_id: String,
    pub note: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_update: Option<EnableUpdate>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<RuleMatcher>,
}

/// `[from_stage, to_stage]`; `None` leaves that end open.
pub type StageRange = [Option<String>; 2];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnableUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_factory_toolkit: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_bios: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_ec: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_pd: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs_release: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs_test: Option<StageRange>,
}

/// Device predicates of a ruleset. Serial number ranges use `"-"` for an open end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlb_sn: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sn_range: Option<[String; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlb_sn_range: Option<[String; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bundle {
    pub id: String,
    pub note: String,
    /// Resource name of the payload manifest.
    pub payloads: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_floor: Option<ShopFloorSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShopFloorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_config: Option<HandlerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point_smt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point_fatp: Option<String>,
}

/// Per-service settings. `active` defaults to true; everything else is
/// service specific and checked against the service's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl ServiceConfig {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// The `services` section, keyed by service name.
///
/// Serializes known services in [`KNOWN_SERVICES`] order followed by any other
/// names in lexical order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSection {
    entries: BTreeMap<String, ServiceConfig>,
}

impl ServiceSection {
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, config: ServiceConfig) -> Option<ServiceConfig> {
        self.entries.insert(name.into(), config)
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceConfig> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceConfig)> {
        let mut ordered: Vec<(&str, &ServiceConfig)> = self
            .entries
            .iter()
            .map(|(name, config)| (name.as_str(), config))
            .collect();
        ordered.sort_by(|left, right| canonical_rank(left.0).cmp(&canonical_rank(right.0)));
        ordered.into_iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(name, _)| name)
    }

    /// Names of services whose `active` flag is not false.
    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, config)| config.is_active())
            .map(|(name, _)| name)
    }
}

fn canonical_rank(name: &str) -> (usize, &str) {
    let rank = KNOWN_SERVICES
        .iter()
        .position(|known| *known == name)
        .unwrap_or(KNOWN_SERVICES.len());
    (rank, name)
}

impl FromIterator<(String, ServiceConfig)> for ServiceSection {
    fn from_iter<I: IntoIterator<Item = (String, ServiceConfig)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for ServiceSection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, config) in self.iter() {
            map.serialize_entry(name, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ServiceSection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, ServiceConfig>::deserialize(deserializer)?;
        Ok(Self { entries })
    }
}
