//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "testing"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Scripted service doubles for orchestrator tests."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Scripted services for exercising the orchestrator without real processes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use umpire_config::{ServiceSchema, UmpireConfig, ValueKind};

use crate::error::{Result, ServiceError};
use crate::process::ProcessSpec;
use crate::service::{ServiceContext, UmpireService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Start(String),
    Stop(String),
}

/// Ordered record of calls shared by several mock services.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: ServiceCall) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Names passed to `start`, sorted.
    pub fn started(&self) -> Vec<String> {
        self.filter(|call| match call {
            ServiceCall::Start(name) => Some(name.clone()),
            ServiceCall::Stop(_) => None,
        })
    }

    /// Names passed to `stop`, sorted.
    pub fn stopped(&self) -> Vec<String> {
        self.filter(|call| match call {
            ServiceCall::Stop(name) => Some(name.clone()),
            ServiceCall::Start(_) => None,
        })
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn filter(&self, pick: impl Fn(&ServiceCall) -> Option<String>) -> Vec<String> {
        let mut names: Vec<String> = self.calls.lock().iter().filter_map(pick).collect();
        names.sort();
        names
    }
}

/// Service double that records calls and fails on request.
#[derive(Debug)]
pub struct MockService {
    name: String,
    journal: CallJournal,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    start_gate: Mutex<Option<Arc<Notify>>>,
    stop_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockService {
    pub fn new(name: &str, journal: CallJournal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            journal,
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_gate: Mutex::new(None),
            stop_gate: Mutex::new(None),
        })
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make the next `start` wait until the returned handle is notified.
    pub fn hold_start(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.start_gate.lock() = Some(gate.clone());
        gate
    }

    /// Make the next `stop` wait until the returned handle is notified.
    pub fn hold_stop(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.stop_gate.lock() = Some(gate.clone());
        gate
    }

    fn failure(&self, operation: &str) -> ServiceError {
        ServiceError::Failed {
            service: self.name.clone(),
            reason: format!("scripted {} failure", operation),
        }
    }
}

#[async_trait]
impl UmpireService for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ServiceSchema {
        ServiceSchema::new("mock service").optional("port", ValueKind::Integer, "port")
    }

    fn create_processes(
        &self,
        _config: &UmpireConfig,
        context: &ServiceContext,
    ) -> Result<Vec<ProcessSpec>> {
        Ok(vec![ProcessSpec::new(
            self.name.clone(),
            PathBuf::from("/bin/true"),
            &context.base_dir,
        )])
    }

    async fn start(&self, _processes: Vec<ProcessSpec>) -> Result<()> {
        let gate = self.start_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.journal.record(ServiceCall::Start(self.name.clone()));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(self.failure("start"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let gate = self.stop_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.journal.record(ServiceCall::Stop(self.name.clone()));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(self.failure("stop"));
        }
        Ok(())
    }
}
