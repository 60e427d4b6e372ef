//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! Supervision of the external processes behind a service.
//!
//! Each process runs under its own monitor task. A process counts as started
//! once it survives the start window; processes flagged `restart` are
//! respawned when they exit, unless they keep dying inside the start window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};
use crate::fanin::{concentrate, merge_failures};
use crate::process::{ProcessSpec, ProcessState};

const MAX_RESTART_COUNT: u32 = 3;
const MESSAGE_LINES: usize = 10;
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    /// A process must stay alive this long to count as started.
    pub start_window: Duration,
    /// Wait this long for a killed process to exit.
    pub stop_timeout: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            start_window: Duration::from_millis(1200),
            stop_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
}

#[derive(Debug)]
struct ProcessShared {
    label: String,
    spec: ProcessSpec,
    state: Mutex<ProcessState>,
    pid: Mutex<Option<u32>>,
    messages: Mutex<VecDeque<String>>,
}

impl ProcessShared {
    fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProcessState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(process = %self.label, from = %*current, to = %state, "process state change");
            *current = state;
        }
    }

    fn record_line(&self, line: String) {
        let mut messages = self.messages.lock();
        messages.push_back(line);
        while messages.len() > MESSAGE_LINES {
            messages.pop_front();
        }
    }

    fn recent_output(&self) -> Vec<String> {
        self.messages.lock().iter().cloned().collect()
    }

    fn spawn(self: &Arc<Self>) -> Result<(Child, Vec<JoinHandle<()>>)> {
        info!(
            process = %self.label,
            executable = %self.spec.executable.display(),
            args = ?self.spec.argv().collect::<Vec<_>>(),
            "process starting"
        );
        let mut child = Command::new(&self.spec.executable)
            .args(self.spec.argv())
            .envs(&self.spec.env)
            .current_dir(&self.spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServiceError::Spawn {
                process: self.label.clone(),
                source,
            })?;
        *self.pid.lock() = child.id();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_output_reader(self.clone(), stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_output_reader(self.clone(), stderr));
        }
        Ok((child, readers))
    }

    async fn terminate(&self, child: &mut Child, stop_timeout: Duration) -> Result<()> {
        self.set_state(ProcessState::Stopping);
        info!(process = %self.label, pid = ?child.id(), "process stopping");
        if let Err(err) = child.start_kill() {
            debug!(process = %self.label, error = %err, "kill on exited process");
        }
        match timeout(stop_timeout, child.wait()).await {
            Ok(_) => {
                *self.pid.lock() = None;
                self.set_state(ProcessState::Stopped);
                info!(process = %self.label, "process stopped");
                Ok(())
            }
            Err(_) => {
                self.set_state(ProcessState::Error);
                Err(ServiceError::StopTimeout {
                    process: self.label.clone(),
                    timeout_secs: stop_timeout.as_secs(),
                })
            }
        }
    }
}

fn spawn_output_reader<R>(shared: Arc<ProcessShared>, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(process = %shared.label, output = %line);
            shared.record_line(line);
        }
    })
}

fn report(started: &mut Option<oneshot::Sender<Result<()>>>, outcome: Result<()>) {
    if let Some(sender) = started.take() {
        let _ = sender.send(outcome);
    }
}

async fn supervise(
    shared: Arc<ProcessShared>,
    timing: SupervisorTiming,
    mut started: Option<oneshot::Sender<Result<()>>>,
    mut kill_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut restart_count: u32 = 0;
    loop {
        let (mut child, readers) = match shared.spawn() {
            Ok(spawned) => spawned,
            Err(err) => {
                shared.set_state(ProcessState::Error);
                error!(process = %shared.label, error = %err, "process spawn failed");
                report(&mut started, Err(err));
                return Ok(());
            }
        };
        shared.set_state(ProcessState::Starting);

        let window = sleep(timing.start_window);
        tokio::pin!(window);
        let mut starting = true;
        let status = loop {
            tokio::select! {
                _ = &mut window, if starting => {
                    starting = false;
                    shared.set_state(ProcessState::Started);
                    info!(process = %shared.label, pid = ?child.id(), "process started");
                    report(&mut started, Ok(()));
                }
                status = child.wait() => break status,
                changed = kill_rx.changed() => {
                    if changed.is_err() || *kill_rx.borrow() {
                        return shared.terminate(&mut child, timing.stop_timeout).await;
                    }
                }
            }
        };

        for reader in readers {
            let _ = timeout(OUTPUT_DRAIN, reader).await;
        }
        *shared.pid.lock() = None;
        let status = match status {
            Ok(status) => status.to_string(),
            Err(err) => err.to_string(),
        };

        if shared.spec.restart {
            if starting {
                restart_count += 1;
            } else {
                restart_count = 0;
            }
            if restart_count >= MAX_RESTART_COUNT {
                shared.set_state(ProcessState::Error);
                let err = ServiceError::RespawnTooFast {
                    process: shared.label.clone(),
                };
                error!(process = %shared.label, %status, "{}", err);
                report(&mut started, Err(err));
                return Ok(());
            }
            warn!(process = %shared.label, %status, restart_count, "process ended; restarting");
            continue;
        }

        shared.set_state(ProcessState::Error);
        let err = ServiceError::ExitedEarly {
            process: shared.label.clone(),
            status,
            messages: shared.recent_output(),
        };
        error!(process = %shared.label, error = %err, "process ended unexpectedly");
        report(&mut started, Err(err));
        return Ok(());
    }
}

#[derive(Debug)]
struct ProcessRuntime {
    shared: Arc<ProcessShared>,
    kill_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ProcessRuntime {
    fn launch(
        service: &str,
        spec: ProcessSpec,
        timing: SupervisorTiming,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        let shared = Arc::new(ProcessShared {
            label: format!("{}:{}", service, spec.name),
            spec,
            state: Mutex::new(ProcessState::Init),
            pid: Mutex::new(None),
            messages: Mutex::new(VecDeque::new()),
        });
        let (started_tx, started_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(shared.clone(), timing, Some(started_tx), kill_rx));
        (
            Self {
                shared,
                kill_tx,
                task,
            },
            started_rx,
        )
    }

    fn status(&self) -> ProcessStatus {
        ProcessStatus {
            name: self.shared.spec.name.clone(),
            state: self.shared.state(),
            pid: *self.shared.pid.lock(),
        }
    }

    async fn stop(self) -> Result<()> {
        if !self.shared.state().is_running() {
            info!(process = %self.shared.label, state = %self.shared.state(), "ignored stop of idle process");
        }
        let _ = self.kill_tx.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(ServiceError::Failed {
                service: self.shared.label.clone(),
                reason: format!("monitor task failed: {}", err),
            }),
        }
    }
}

/// The running processes of one service.
#[derive(Debug)]
pub struct ProcessSupervisor {
    service: String,
    timing: SupervisorTiming,
    running: tokio::sync::Mutex<HashMap<ProcessSpec, ProcessRuntime>>,
}

impl ProcessSupervisor {
    pub fn new(service: impl Into<String>, timing: SupervisorTiming) -> Self {
        Self {
            service: service.into(),
            timing,
            running: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Converge on exactly `specs`.
    ///
    /// Processes not in `specs` are stopped first. Running processes whose spec
    /// is unchanged are left alone, the rest are spawned. Fails if any new
    /// process fails to start; the others are still awaited.
    pub async fn start(&self, specs: Vec<ProcessSpec>) -> Result<()> {
        let desired: HashSet<ProcessSpec> = specs.into_iter().collect();
        let mut running = self.running.lock().await;
        running.retain(|_, runtime| runtime.shared.state().is_running());

        let stale: Vec<ProcessSpec> = running
            .keys()
            .filter(|spec| !desired.contains(*spec))
            .cloned()
            .collect();
        if !stale.is_empty() {
            debug!(service = %self.service, stale = stale.len(), "stopping processes no longer configured");
        }
        let stopping: Vec<ProcessRuntime> = stale
            .iter()
            .filter_map(|spec| running.remove(spec))
            .collect();
        concentrate(stopping.into_iter().map(ProcessRuntime::stop)).await?;

        let mut failures = Vec::new();
        let mut pending = Vec::new();
        for spec in desired {
            if running.contains_key(&spec) {
                debug!(service = %self.service, process = %spec.name, "process unchanged; keeping");
                continue;
            }
            if let Err(err) = spec.validate() {
                error!(service = %self.service, process = %spec.name, error = %err, "invalid process");
                failures.push(err);
                continue;
            }
            let (runtime, started) = ProcessRuntime::launch(&self.service, spec.clone(), self.timing);
            running.insert(spec.clone(), runtime);
            pending.push(async move { (spec, started.await) });
        }

        for (spec, outcome) in join_all(pending).await {
            let result = outcome.unwrap_or_else(|_| {
                Err(ServiceError::Failed {
                    service: self.service.clone(),
                    reason: format!("process {} stopped before it started", spec.name),
                })
            });
            if let Err(err) = result {
                running.remove(&spec);
                failures.push(err);
            }
        }
        merge_failures(failures)
    }

    /// Stop every process of this service.
    pub async fn stop(&self) -> Result<()> {
        let drained: Vec<ProcessRuntime> = {
            let mut running = self.running.lock().await;
            running.drain().map(|(_, runtime)| runtime).collect()
        };
        concentrate(drained.into_iter().map(ProcessRuntime::stop))
            .await
            .map(|_| ())
    }

    pub async fn status(&self) -> Vec<ProcessStatus> {
        let running = self.running.lock().await;
        let mut statuses: Vec<ProcessStatus> = running.values().map(ProcessRuntime::status).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    fn fast() -> SupervisorTiming {
        SupervisorTiming {
            start_window: Duration::from_millis(150),
            stop_timeout: Duration::from_secs(5),
        }
    }

    fn sh(name: &str, script: &str) -> ProcessSpec {
        ProcessSpec::new(name, "/bin/sh", Path::new("/")).args(["-c", script])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn long_running_process_starts_and_stops() {
        let supervisor = ProcessSupervisor::new("demo", fast());
        supervisor.start(vec![sh("sleeper", "exec sleep 30")]).await.expect("start");

        let statuses = supervisor.status().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, ProcessState::Started);
        assert!(statuses[0].pid.is_some());

        supervisor.stop().await.expect("stop");
        assert!(supervisor.status().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn early_exit_fails_start_with_output() {
        let supervisor = ProcessSupervisor::new("demo", fast());
        let err = supervisor
            .start(vec![sh("crasher", "echo bad port; exit 3")])
            .await
            .unwrap_err();
        match err {
            ServiceError::ExitedEarly { messages, .. } => {
                assert_eq!(messages, vec!["bad port".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(supervisor.status().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn restarting_process_that_keeps_dying_is_reported() {
        let supervisor = ProcessSupervisor::new("demo", fast());
        let err = supervisor
            .start(vec![sh("flapper", "exit 1").restart(true)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RespawnTooFast { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unchanged_processes_are_kept_and_stale_ones_stopped() {
        let supervisor = ProcessSupervisor::new("demo", fast());
        let keep = sh("keep", "exec sleep 30");
        let stale = sh("stale", "exec sleep 30");
        supervisor
            .start(vec![keep.clone(), stale])
            .await
            .expect("first start");
        let pid_before = supervisor
            .status()
            .await
            .into_iter()
            .find(|s| s.name == "keep")
            .and_then(|s| s.pid);

        supervisor.start(vec![keep]).await.expect("second start");
        let statuses = supervisor.status().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "keep");
        assert_eq!(statuses[0].pid, pid_before);

        supervisor.stop().await.expect("stop");
    }
}
