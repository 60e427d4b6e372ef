//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Result, ServiceError};

/// Lifecycle of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Init,
    Starting,
    Started,
    Stopping,
    Stopped,
    Error,
}

impl ProcessState {
    pub fn is_running(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Started)
    }
}

/// How to launch one external process. Two specs are the same process when
/// every field is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub ext_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    #[serde(default)]
    pub restart: bool,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>, cwd: &Path) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            ext_args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.to_path_buf(),
            restart: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Full argument vector after the executable.
    pub fn argv(&self) -> impl Iterator<Item = &String> {
        self.args.iter().chain(self.ext_args.iter())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::InvalidSpec {
                process: format!("{:?}", self.executable),
                reason: "process name is empty".to_owned(),
            });
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ServiceError::InvalidSpec {
                process: self.name.clone(),
                reason: "executable is empty".to_owned(),
            });
        }
        if !self.executable.is_file() {
            return Err(ServiceError::MissingExecutable {
                path: self.executable.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn specs_compare_by_value() {
        let cwd = Path::new("/tmp");
        let a = ProcessSpec::new("rsync", "/usr/bin/rsync", cwd).args(["--daemon"]);
        let b = ProcessSpec::new("rsync", "/usr/bin/rsync", cwd).args(["--daemon"]);
        let c = b.clone().restart(true);
        let set: HashSet<ProcessSpec> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn missing_executable_is_rejected() {
        let spec = ProcessSpec::new("ghost", "/nonexistent/ghost", Path::new("/"));
        assert!(matches!(
            spec.validate(),
            Err(ServiceError::MissingExecutable { .. })
        ));
    }

    #[test]
    fn state_names_are_upper_case() {
        assert_eq!(ProcessState::Started.to_string(), "STARTED");
        assert_eq!("STOPPING".parse::<ProcessState>().ok(), Some(ProcessState::Stopping));
    }
}
