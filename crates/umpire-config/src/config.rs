//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::document::{Bundle, ConfigDocument, Ruleset, ServiceSection};
use crate::error::{ConfigError, Result};
use crate::schema::ServiceCatalog;

/// Where a configuration document comes from.
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource<'a> {
    Path(&'a Path),
    /// JSON or YAML text.
    Text(&'a str),
    /// An already parsed tree. It is copied, never borrowed.
    Value(&'a Value),
}

/// A parsed configuration document plus its bundle index.
///
/// Cloning yields a fully independent copy.
#[derive(Debug, Clone, PartialEq)]
pub struct UmpireConfig {
    document: ConfigDocument,
    bundle_map: HashMap<String, usize>,
}

impl UmpireConfig {
    /// Parse a document and, when a catalog is given, validate it.
    ///
    /// Validation resolves every service name against the catalog before the
    /// structural checks run, then requires the default bundle to exist.
    pub fn load(source: ConfigSource<'_>, catalog: Option<&dyn ServiceCatalog>) -> Result<Self> {
        let raw = match source {
            ConfigSource::Path(path) => {
                debug!(config_path = %path.display(), "loading umpire config");
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                parse_text(&text)?
            }
            ConfigSource::Text(text) => parse_text(text)?,
            ConfigSource::Value(value) => value.clone(),
        };

        if let Some(catalog) = catalog {
            resolve_services(&raw, catalog)?;
        }

        let document: ConfigDocument = serde_path_to_error::deserialize(raw).map_err(|err| {
            let path = err.path().to_string();
            ConfigError::schema(path, err.into_inner().to_string())
        })?;
        let config = Self::from_document(document);

        if let Some(catalog) = catalog {
            config.validate(catalog)?;
        }
        Ok(config)
    }

    pub fn from_path(path: &Path, catalog: Option<&dyn ServiceCatalog>) -> Result<Self> {
        Self::load(ConfigSource::Path(path), catalog)
    }

    pub fn from_value(value: &Value, catalog: Option<&dyn ServiceCatalog>) -> Result<Self> {
        Self::load(ConfigSource::Value(value), catalog)
    }

    pub fn from_document(document: ConfigDocument) -> Self {
        let mut config = Self {
            document,
            bundle_map: HashMap::new(),
        };
        config.build_bundle_map();
        config
    }

    /// Re-index bundles by id. A later bundle wins over an earlier duplicate.
    pub fn build_bundle_map(&mut self) {
        self.bundle_map = self
            .document
            .bundles
            .iter()
            .enumerate()
            .map(|(index, bundle)| (bundle.id.clone(), index))
            .collect();
    }

    fn validate(&self, catalog: &dyn ServiceCatalog) -> Result<()> {
        for (name, service) in self.document.services.iter() {
            let schema = catalog
                .service_schema(name)
                .ok_or_else(|| ConfigError::UnknownService {
                    name: name.to_owned(),
                })?;
            schema.check(name, service)?;
        }
        if let Some(raw_url) = &self.document.shopfloor_service_url {
            Url::parse(raw_url).map_err(|err| {
                ConfigError::schema("shopfloor_service_url", format!("invalid url: {}", err))
            })?;
        }
        if self.default_bundle().is_none() {
            return Err(ConfigError::MissingDefaultBundle);
        }
        info!(
            rulesets = self.document.rulesets.len(),
            bundles = self.document.bundles.len(),
            services = self.document.services.len(),
            "umpire config validated"
        );
        Ok(())
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn into_document(self) -> ConfigDocument {
        self.document
    }

    pub fn rulesets(&self) -> &[Ruleset] {
        &self.document.rulesets
    }

    pub fn rulesets_mut(&mut self) -> &mut Vec<Ruleset> {
        &mut self.document.rulesets
    }

    pub fn services(&self) -> &ServiceSection {
        &self.document.services
    }

    pub fn services_mut(&mut self) -> &mut ServiceSection {
        &mut self.document.services
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.document.bundles
    }

    /// Mutable access to the bundle list; the index is rebuilt when the
    /// returned guard is dropped.
    pub fn bundles_mut(&mut self) -> BundlesMut<'_> {
        BundlesMut { config: self }
    }

    pub fn ip(&self) -> Option<&str> {
        self.document.ip.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.document.port
    }

    pub fn shopfloor_service_url(&self) -> Option<&str> {
        self.document.shopfloor_service_url.as_deref()
    }

    pub fn bundle(&self, bundle_id: &str) -> Option<&Bundle> {
        self.bundle_map
            .get(bundle_id)
            .and_then(|index| self.document.bundles.get(*index))
    }

    /// Bundle of the first active ruleset.
    ///
    /// Only the first active ruleset is consulted: if its bundle is missing
    /// the result is `None` even when a later active ruleset would resolve.
    pub fn default_bundle(&self) -> Option<&Bundle> {
        self.document
            .rulesets
            .iter()
            .find(|ruleset| ruleset.active)
            .and_then(|ruleset| self.bundle(&ruleset.bundle_id))
    }

    /// Bundles referenced by active rulesets, in ruleset order. Rulesets
    /// naming an unknown bundle are skipped.
    pub fn active_bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.document
            .rulesets
            .iter()
            .filter(|ruleset| ruleset.active)
            .filter_map(|ruleset| self.bundle(&ruleset.bundle_id))
    }

    /// Canonical pretty JSON. Dumping a re-parsed dump yields the same text.
    pub fn dump(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.document)?)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut text = self.dump()?;
        text.push('\n');
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parses without validation.
impl FromStr for UmpireConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self> {
        Self::load(ConfigSource::Text(text), None)
    }
}

/// Write access to the bundle list of an [`UmpireConfig`].
pub struct BundlesMut<'a> {
    config: &'a mut UmpireConfig,
}

impl std::ops::Deref for BundlesMut<'_> {
    type Target = Vec<Bundle>;

    fn deref(&self) -> &Self::Target {
        &self.config.document.bundles
    }
}

impl std::ops::DerefMut for BundlesMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.config.document.bundles
    }
}

impl Drop for BundlesMut<'_> {
    fn drop(&mut self) {
        self.config.build_bundle_map();
    }
}

fn parse_text(text: &str) -> Result<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
    } else {
        serde_yaml::from_str(text).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
    }
}

fn resolve_services(raw: &Value, catalog: &dyn ServiceCatalog) -> Result<()> {
    let services = raw
        .get("services")
        .ok_or_else(|| ConfigError::schema("services", "missing field `services`"))?
        .as_object()
        .ok_or_else(|| ConfigError::schema("services", "expected an object"))?;
    for name in services.keys() {
        if catalog.service_schema(name).is_none() {
            return Err(ConfigError::UnknownService { name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ServiceSchema, ValueKind};

    struct Catalog;

    impl ServiceCatalog for Catalog {
        fn service_schema(&self, name: &str) -> Option<ServiceSchema> {
            match name {
                "rsync" | "umpire_http" => Some(
                    ServiceSchema::new(name).optional("port", ValueKind::Integer, "port"),
                ),
                _ => None,
            }
        }
    }

    const MINIMAL: &str = r#"{
        "rulesets": [{"bundle_id": "b1", "note": "default", "active": true}],
        "services": {"rsync": {"port": 873}},
        "bundles": [{"id": "b1", "note": "first", "payloads": "payload.abc.json"}]
    }"#;

    #[test]
    fn validated_load_accepts_minimal_document() {
        let config = UmpireConfig::load(ConfigSource::Text(MINIMAL), Some(&Catalog)).expect("valid");
        assert_eq!(config.default_bundle().map(|b| b.id.as_str()), Some("b1"));
    }

    #[test]
    fn unknown_service_fails_before_structural_checks() {
        // The ruleset is malformed too; the service error must win.
        let text = r#"{
            "rulesets": [{"bundle_id": 7}],
            "services": {"teleport": {}},
            "bundles": []
        }"#;
        let err = UmpireConfig::load(ConfigSource::Text(text), Some(&Catalog)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService { name } if name == "teleport"));
    }

    #[test]
    fn structural_errors_carry_a_path() {
        let text = r#"{
            "rulesets": [{"bundle_id": "b1", "note": "n", "active": "yes"}],
            "services": {},
            "bundles": []
        }"#;
        let err = UmpireConfig::load(ConfigSource::Text(text), Some(&Catalog)).unwrap_err();
        match err {
            ConfigError::Schema { path, .. } => assert_eq!(path, "rulesets[0].active"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validated_load_requires_default_bundle() {
        let text = MINIMAL.replace("\"bundle_id\": \"b1\"", "\"bundle_id\": \"missing\"");
        let err = UmpireConfig::load(ConfigSource::Text(&text), Some(&Catalog)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefaultBundle));
        // The same document loads fine without validation.
        let config: UmpireConfig = text.parse().expect("unvalidated");
        assert!(config.default_bundle().is_none());
    }

    #[test]
    fn yaml_documents_are_accepted() {
        let yaml = "rulesets:\n  - bundle_id: b1\n    note: default\n    active: true\nservices: {}\nbundles:\n  - id: b1\n    note: first\n    payloads: p.json\n";
        let config = UmpireConfig::load(ConfigSource::Text(yaml), Some(&Catalog)).expect("yaml");
        assert_eq!(config.bundles().len(), 1);
    }

    #[test]
    fn invalid_shopfloor_url_is_rejected() {
        let text = MINIMAL.replacen('{', r#"{"shopfloor_service_url": "not a url","#, 1);
        let err = UmpireConfig::load(ConfigSource::Text(&text), Some(&Catalog)).unwrap_err();
        assert!(matches!(err, ConfigError::Schema { path, .. } if path == "shopfloor_service_url"));
    }

    #[test]
    fn bundles_mut_rebuilds_index() {
        let mut config: UmpireConfig = MINIMAL.parse().expect("parse");
        config.bundles_mut().push(Bundle {
            id: "b2".into(),
            note: "second".into(),
            payloads: "p2.json".into(),
            shop_floor: None,
        });
        assert!(config.bundle("b2").is_some());
    }
}
