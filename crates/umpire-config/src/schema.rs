//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Configuration document model and validation."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Per-service property schemas.
//!
//! The document structure itself is enforced by the serde model; service
//! sections are open maps, so each service contributes a [`ServiceSchema`]
//! through a [`ServiceCatalog`] at validation time.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::document::ServiceConfig;
use crate::error::{ConfigError, Result};

/// Resolves service names to their schemas.
///
/// Returning `None` means no service module provides the name, which fails
/// validation before any structural check runs.
pub trait ServiceCatalog: Send + Sync {
    fn service_schema(&self, name: &str) -> Option<ServiceSchema>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Integer,
    String,
    StringList,
    Object,
    Any,
}

impl ValueKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::String => value.is_string(),
            ValueKind::StringList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            ValueKind::Object => value.is_object(),
            ValueKind::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ValueKind::Boolean => "a boolean",
            ValueKind::Integer => "an integer",
            ValueKind::String => "a string",
            ValueKind::StringList => "a list of strings",
            ValueKind::Object => "an object",
            ValueKind::Any => "any value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    pub kind: ValueKind,
    pub required: bool,
    pub description: String,
}

/// Schema of one service section. `active` is accepted by every service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSchema {
    pub description: String,
    pub properties: IndexMap<String, PropertySchema>,
}

impl ServiceSchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn optional(mut self, name: &str, kind: ValueKind, description: &str) -> Self {
        self.properties.insert(
            name.to_owned(),
            PropertySchema {
                kind,
                required: false,
                description: description.to_owned(),
            },
        );
        self
    }

    pub fn required(mut self, name: &str, kind: ValueKind, description: &str) -> Self {
        self.properties.insert(
            name.to_owned(),
            PropertySchema {
                kind,
                required: true,
                description: description.to_owned(),
            },
        );
        self
    }

    /// Check `config` of service `service` against this schema.
    pub fn check(&self, service: &str, config: &ServiceConfig) -> Result<()> {
        for (key, value) in &config.params {
            let path = format!("services.{}.{}", service, key);
            let property = self
                .properties
                .get(key)
                .ok_or_else(|| ConfigError::schema(&path, "additional properties are not allowed"))?;
            if !property.kind.accepts(value) {
                return Err(ConfigError::schema(
                    path,
                    format!("expected {}", property.kind.describe()),
                ));
            }
        }
        for (key, property) in &self.properties {
            if property.required && !config.params.contains_key(key) {
                return Err(ConfigError::schema(
                    format!("services.{}", service),
                    format!("missing required property '{}'", key),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsync_schema() -> ServiceSchema {
        ServiceSchema::new("rsync daemon")
            .optional("port", ValueKind::Integer, "listening port")
            .optional("modules", ValueKind::StringList, "exported modules")
    }

    fn service(json: &str) -> ServiceConfig {
        serde_json::from_str(json).expect("service config")
    }

    #[test]
    fn accepts_declared_properties_and_active() {
        let config = service(r#"{"active": false, "port": 873, "modules": ["res"]}"#);
        rsync_schema().check("rsync", &config).expect("valid");
    }

    #[test]
    fn rejects_unknown_property_with_path() {
        let config = service(r#"{"colour": "blue"}"#);
        let err = rsync_schema().check("rsync", &config).unwrap_err();
        match err {
            ConfigError::Schema { path, .. } => assert_eq!(path, "services.rsync.colour"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_wrong_kind() {
        let config = service(r#"{"port": "873"}"#);
        let err = rsync_schema().check("rsync", &config).unwrap_err();
        assert!(err.to_string().contains("expected an integer"));
    }

    #[test]
    fn reports_missing_required_property() {
        let schema = ServiceSchema::new("needs url").required("url", ValueKind::String, "endpoint");
        let err = schema.check("sync", &ServiceConfig::default()).unwrap_err();
        assert!(err.to_string().contains("missing required property 'url'"));
    }
}
