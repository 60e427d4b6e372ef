//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;
use umpire_config::{ServiceCatalog, ServiceSchema, ValueKind, KNOWN_SERVICES};

use crate::command::CommandService;
use crate::error::{Result, ServiceError};
use crate::service::UmpireService;
use crate::supervisor::SupervisorTiming;

/// One shared instance per service name, in registration order.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: IndexMap<String, Arc<dyn UmpireService>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn describe(name: &str) -> &'static str {
    match name {
        "umpire_http" => "HTTP front end serving resources and proxying RPC",
        "rsync" => "rsync daemon exporting the resources directory",
        "shop_floor" => "Shop floor service proxy",
        "instalog" => "Log collection pipeline",
        "dkps" => "Device key provisioning server",
        "multicast" => "Multicast resource distribution",
        "umpire_sync" => "Synchronisation with a primary Umpire instance",
        _ => "Command service",
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known service as a [`CommandService`].
    pub fn builtin(timing: SupervisorTiming) -> Self {
        let mut registry = Self::new();
        for name in KNOWN_SERVICES {
            let mut service = CommandService::new(name, describe(name), timing);
            service = match *name {
                "shop_floor" => service.with_property(
                    "service_url",
                    ValueKind::String,
                    "Upstream shop floor service URL",
                ),
                "umpire_sync" => service
                    .with_property("primary_information", ValueKind::Object, "Primary Umpire")
                    .with_property("secondary_information", ValueKind::Any, "Secondary Umpires"),
                "multicast" => service.with_property("mgroup", ValueKind::String, "Multicast group"),
                _ => service,
            };
            registry.register(Arc::new(service));
        }
        registry
    }

    /// Register `service` under its name, replacing any previous instance.
    pub fn register(&mut self, service: Arc<dyn UmpireService>) -> Option<Arc<dyn UmpireService>> {
        let name = service.name().to_owned();
        debug!(service = %name, "service registered");
        self.services.insert(name, service)
    }

    pub fn list_all_service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn get_service_instance(&self, name: &str) -> Result<Arc<dyn UmpireService>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownService {
                name: name.to_owned(),
            })
    }

    pub fn service_schemata(&self) -> IndexMap<String, ServiceSchema> {
        self.services
            .iter()
            .map(|(name, service)| (name.clone(), service.schema()))
            .collect()
    }
}

impl ServiceCatalog for ServiceRegistry {
    fn service_schema(&self, name: &str) -> Option<ServiceSchema> {
        self.services.get(name).map(|service| service.schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_known_services_in_order() {
        let registry = ServiceRegistry::builtin(SupervisorTiming::default());
        assert_eq!(registry.list_all_service_names(), KNOWN_SERVICES);
        assert!(registry.get_service_instance("rsync").is_ok());
        assert!(matches!(
            registry.get_service_instance("telnet"),
            Err(ServiceError::UnknownService { .. })
        ));
    }

    #[test]
    fn catalog_exposes_service_specific_properties() {
        let registry = ServiceRegistry::builtin(SupervisorTiming::default());
        let schema = registry.service_schema("shop_floor").expect("schema");
        assert!(schema.properties.contains_key("service_url"));
        assert!(registry.service_schema("telnet").is_none());
        assert_eq!(registry.service_schemata().len(), KNOWN_SERVICES.len());
    }
}
