//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Generic service running one configured command.
//!
//! The service section may carry `executable`, `args`, `env` and `restart`.
//! Arguments may reference `{base_dir}`, `{resources_dir}`, `{config_dir}`,
//! `{log_dir}`, `{run_dir}`, `{temp_dir}`, `{data_dir}` and the `{<role>_port}`
//! values of the port layout. A section without `executable` runs nothing.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use umpire_config::{ServiceSchema, UmpireConfig, ValueKind};

use crate::error::{Result, ServiceError};
use crate::process::ProcessSpec;
use crate::service::{ServiceContext, UmpireService};
use crate::supervisor::{ProcessStatus, ProcessSupervisor, SupervisorTiming};

#[derive(Debug)]
pub struct CommandService {
    name: String,
    schema: ServiceSchema,
    supervisor: ProcessSupervisor,
}

impl CommandService {
    pub fn new(name: &str, description: &str, timing: SupervisorTiming) -> Self {
        let schema = ServiceSchema::new(description)
            .optional("executable", ValueKind::String, "Program to run")
            .optional("args", ValueKind::StringList, "Command line arguments")
            .optional("env", ValueKind::Object, "Extra environment variables")
            .optional("restart", ValueKind::Boolean, "Respawn the process when it exits");
        Self {
            name: name.to_owned(),
            schema,
            supervisor: ProcessSupervisor::new(name, timing),
        }
    }

    /// Accept an additional service specific property.
    pub fn with_property(mut self, name: &str, kind: ValueKind, description: &str) -> Self {
        self.schema = self.schema.optional(name, kind, description);
        self
    }

    pub async fn status(&self) -> Vec<ProcessStatus> {
        self.supervisor.status().await
    }

    fn invalid(&self, reason: impl Into<String>) -> ServiceError {
        ServiceError::InvalidSpec {
            process: self.name.clone(),
            reason: reason.into(),
        }
    }
}

fn expand(template: &str, context: &ServiceContext) -> String {
    let ports = &context.ports;
    let substitutions: [(&str, String); 15] = [
        ("{base_dir}", context.base_dir.display().to_string()),
        ("{resources_dir}", context.resources_dir.display().to_string()),
        ("{config_dir}", context.config_dir.display().to_string()),
        ("{log_dir}", context.log_dir.display().to_string()),
        ("{run_dir}", context.run_dir.display().to_string()),
        ("{temp_dir}", context.temp_dir.display().to_string()),
        ("{data_dir}", context.data_dir.display().to_string()),
        ("{base_port}", ports.base.to_string()),
        ("{webapp_port}", ports.webapp.to_string()),
        ("{cli_port}", ports.cli.to_string()),
        ("{rpc_port}", ports.rpc.to_string()),
        ("{rsync_port}", ports.rsync.to_string()),
        ("{http_post_port}", ports.http_post.to_string()),
        ("{instalog_pull_socket_port}", ports.instalog_pull_socket.to_string()),
        ("{instalog_http_port}", ports.instalog_http.to_string()),
    ];
    substitutions
        .iter()
        .fold(template.to_owned(), |text, (key, value)| text.replace(key, value))
}

#[async_trait]
impl UmpireService for CommandService {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ServiceSchema {
        self.schema.clone()
    }

    fn create_processes(
        &self,
        config: &UmpireConfig,
        context: &ServiceContext,
    ) -> Result<Vec<ProcessSpec>> {
        let Some(section) = config.services().get(&self.name) else {
            return Ok(Vec::new());
        };
        let Some(executable) = section.param("executable") else {
            debug!(service = %self.name, "no executable configured");
            return Ok(Vec::new());
        };
        let executable = executable
            .as_str()
            .ok_or_else(|| self.invalid("executable must be a string"))?;

        let mut spec = ProcessSpec::new(
            self.name.clone(),
            expand(executable, context),
            &context.base_dir,
        );
        if let Some(args) = section.param("args") {
            let args = args
                .as_array()
                .ok_or_else(|| self.invalid("args must be a list"))?;
            for arg in args {
                let arg = arg
                    .as_str()
                    .ok_or_else(|| self.invalid("args must be strings"))?;
                spec.args.push(expand(arg, context));
            }
        }
        if let Some(env) = section.param("env") {
            let env = env
                .as_object()
                .ok_or_else(|| self.invalid("env must be an object"))?;
            for (key, value) in env {
                let value = match value {
                    Value::String(text) => expand(text, context),
                    other => other.to_string(),
                };
                spec.env.insert(key.clone(), value);
            }
        }
        spec.restart = section
            .param("restart")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(vec![spec])
    }

    async fn start(&self, processes: Vec<ProcessSpec>) -> Result<()> {
        self.supervisor.start(processes).await
    }

    async fn stop(&self) -> Result<()> {
        self.supervisor.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umpire_common::PortLayout;

    fn context() -> ServiceContext {
        ServiceContext::from_base_dir("/srv/umpire", PortLayout::from_base(8080))
    }

    fn config(services: &str) -> UmpireConfig {
        format!(
            r#"{{"rulesets": [], "services": {services},
                "bundles": []}}"#
        )
        .parse()
        .expect("config")
    }

    #[test]
    fn builds_process_from_section() {
        let service = CommandService::new("rsync", "rsync daemon", SupervisorTiming::default());
        let config = config(
            r#"{"rsync": {"executable": "/usr/bin/rsync",
                          "args": ["--daemon", "--port={rsync_port}", "--config={config_dir}/rsyncd.conf"],
                          "env": {"HOME": "{data_dir}"},
                          "restart": true}}"#,
        );
        let specs = service.create_processes(&config, &context()).expect("specs");
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.name, "rsync");
        assert_eq!(
            spec.args,
            vec!["--daemon", "--port=8084", "--config=/srv/umpire/conf/rsyncd.conf"]
        );
        assert_eq!(spec.env.get("HOME").map(String::as_str), Some("/srv/umpire/umpire_data"));
        assert!(spec.restart);
    }

    #[test]
    fn section_without_executable_runs_nothing() {
        let service = CommandService::new("dkps", "key server", SupervisorTiming::default());
        let config = config(r#"{"dkps": {"active": true}}"#);
        assert!(service
            .create_processes(&config, &context())
            .expect("specs")
            .is_empty());
    }

    #[test]
    fn schema_accepts_extra_properties() {
        let service = CommandService::new("shop_floor", "proxy", SupervisorTiming::default())
            .with_property("service_url", ValueKind::String, "upstream");
        assert!(service.schema().properties.contains_key("service_url"));
        assert!(service.schema().properties.contains_key("executable"));
    }
}
