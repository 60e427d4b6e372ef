//! ---
//! umpire_section: "04-configuration-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Environment, deployment orchestrator, and administrative commands."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
//! On-disk layout and live configuration of one Umpire instance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use umpire_common::{DaemonSettings, PortLayout};
use umpire_config::{validate_resources, ResourceLocator, ServiceCatalog, UmpireConfig};
use umpire_service::{ServiceContext, ServiceRegistry};
use uuid::Uuid;

use crate::error::{Result, UmpireError};

const RESOURCES_DIR: &str = "resources";
const CONFIG_DIR: &str = "conf";
const LOG_DIR: &str = "log";
const RUN_DIR: &str = "run";
const TEMP_DIR: &str = "temp";
const DATA_DIR: &str = "umpire_data";
const ACTIVE_CONFIG: &str = "active_umpire.json";
const STAGING_CONFIG: &str = "staging_umpire.json";
/// Resource type of configuration documents.
pub const UMPIRE_CONFIG_TYPE: &str = "umpire";
const DEFAULT_SHOPFLOOR_SERVICE_URL: &str = "http://localhost:8090";
const RESOURCE_HASH_LEN: usize = 32;

/// A live configuration and the file it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Arc<UmpireConfig>,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct UmpireEnv {
    base_dir: PathBuf,
    base_port: u16,
    registry: Arc<ServiceRegistry>,
    loaded: RwLock<Option<LoadedConfig>>,
}

impl UmpireEnv {
    pub fn new(base_dir: impl Into<PathBuf>, base_port: u16, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_port,
            registry,
            loaded: RwLock::new(None),
        }
    }

    pub fn from_settings(settings: &DaemonSettings, registry: Arc<ServiceRegistry>) -> Self {
        Self::new(settings.base_dir.clone(), settings.base_port, registry)
    }

    /// Create the directory layout below the base directory.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.resources_dir(),
            self.config_dir(),
            self.log_dir(),
            self.run_dir(),
            self.temp_dir(),
            self.data_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| UmpireError::io(&dir, source))?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.base_dir.join(RESOURCES_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join(CONFIG_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join(LOG_DIR)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.base_dir.join(RUN_DIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join(TEMP_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join(DATA_DIR)
    }

    pub fn active_config_file(&self) -> PathBuf {
        self.base_dir.join(ACTIVE_CONFIG)
    }

    pub fn staging_config_file(&self) -> PathBuf {
        self.base_dir.join(STAGING_CONFIG)
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Ports derived from the loaded config's `port`, or the configured base port.
    pub fn ports(&self) -> PortLayout {
        let base = self
            .config()
            .and_then(|config| config.port())
            .unwrap_or(self.base_port);
        PortLayout::from_base(base)
    }

    pub fn service_context(&self) -> ServiceContext {
        ServiceContext::from_base_dir(&self.base_dir, self.ports())
    }

    /// The live configuration, if one has been loaded.
    pub fn config(&self) -> Option<Arc<UmpireConfig>> {
        self.loaded.read().as_ref().map(|loaded| loaded.config.clone())
    }

    /// Path the live configuration was loaded from.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.loaded.read().as_ref().map(|loaded| loaded.path.clone())
    }

    pub fn shopfloor_service_url(&self) -> Result<String> {
        let config = self.config().ok_or(UmpireError::ConfigNotLoaded)?;
        let url = config
            .shopfloor_service_url()
            .or_else(|| {
                config
                    .services()
                    .get("shop_floor")
                    .and_then(|service| service.param("service_url"))
                    .and_then(|value| value.as_str())
            })
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_SHOPFLOOR_SERVICE_URL);
        Ok(url.trim_end_matches('/').to_owned())
    }

    /// Parse and validate a config without loading it. Defaults to the active config.
    pub fn read_config(&self, custom_path: Option<&Path>) -> Result<UmpireConfig> {
        let path = custom_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_config_file());
        let catalog: &dyn ServiceCatalog = &*self.registry;
        Ok(UmpireConfig::from_path(&path, Some(catalog))?)
    }

    /// Make a config the live one. The live config is unchanged on failure.
    pub fn load_config(&self, custom_path: Option<&Path>, check_resources: bool) -> Result<()> {
        let path = custom_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_config_file());
        debug!(
            config_path = %path.display(),
            active = custom_path.is_none(),
            "loading config"
        );
        let config = self.read_config(Some(&path))?;
        if check_resources {
            validate_resources(&config, self)?;
        }
        *self.loaded.write() = Some(LoadedConfig {
            config: Arc::new(config),
            path,
        });
        Ok(())
    }

    /// The live configuration together with its source path.
    pub fn loaded_config(&self) -> Option<LoadedConfig> {
        self.loaded.read().clone()
    }

    /// Put back a record taken with [`UmpireEnv::loaded_config`]. `None`
    /// leaves no config loaded.
    pub fn restore_loaded_config(&self, loaded: Option<LoadedConfig>) {
        match &loaded {
            Some(loaded) => debug!(config_path = %loaded.path.display(), "restoring live config"),
            None => debug!("clearing live config"),
        }
        *self.loaded.write() = loaded;
    }

    /// Point the active config link at `config_path`.
    pub fn activate_config_file(&self, config_path: &Path) -> Result<()> {
        if !config_path.is_file() {
            return Err(UmpireError::MissingConfig(config_path.to_path_buf()));
        }
        let target = fs::canonicalize(config_path).map_err(|source| UmpireError::io(config_path, source))?;
        let link = self.active_config_file();
        if let Ok(previous) = fs::canonicalize(&link) {
            info!(config = %previous.display(), "deactivate config");
        }
        replace_link(&target, &link)?;
        info!(config = %target.display(), "activate config");
        Ok(())
    }

    pub fn get_resource_path(&self, name: &str) -> Result<PathBuf> {
        self.resource_path(name)
            .map_err(|_| UmpireError::ResourceNotFound(name.to_owned()))
    }

    pub fn get_payloads_dict(&self, name: &str) -> Result<umpire_config::PayloadManifest> {
        Ok(self.payloads(name)?)
    }

    /// Copy a config file into the resources directory under a content
    /// addressed name and return that name.
    pub fn add_config(&self, file_path: &Path, type_name: &str) -> Result<String> {
        let content = fs::read(file_path).map_err(|source| UmpireError::io(file_path, source))?;
        let name = resource_name(type_name, &content);
        let destination = self.resources_dir().join(&name);

        if destination.exists() {
            let existing =
                fs::read(&destination).map_err(|source| UmpireError::io(&destination, source))?;
            if existing == content {
                warn!(resource = %destination.display(), "skip copying as file already exists");
                return Ok(name);
            }
            return Err(UmpireError::HashCollision {
                source_path: file_path.to_path_buf(),
                resource: destination,
            });
        }

        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir).map_err(|source| UmpireError::io(&temp_dir, source))?;
        let staging = temp_dir.join(Uuid::new_v4().to_string());
        fs::write(&staging, &content).map_err(|source| UmpireError::io(&staging, source))?;
        fs::rename(&staging, &destination).map_err(|source| UmpireError::io(&destination, source))?;
        info!(resource = %destination.display(), "resource added");
        Ok(name)
    }

    pub fn add_config_from_blob(&self, blob: &[u8], type_name: &str) -> Result<String> {
        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir).map_err(|source| UmpireError::io(&temp_dir, source))?;
        let path = temp_dir.join(format!("blob-{}", Uuid::new_v4()));
        fs::write(&path, blob).map_err(|source| UmpireError::io(&path, source))?;
        let result = self.add_config(&path, type_name);
        if let Err(err) = fs::remove_file(&path) {
            debug!(path = %path.display(), error = %err, "unable to remove temporary blob");
        }
        result
    }

    pub fn has_staging_config_file(&self) -> bool {
        self.staging_config_file().is_file()
    }

    /// Stage a config for review. Defaults to the active config; files outside
    /// the resources directory are added as resources first.
    pub fn stage_config_file(&self, config_path: Option<&Path>, force: bool) -> Result<()> {
        if self.has_staging_config_file() && !force {
            return Err(UmpireError::AlreadyStaged);
        }
        let source = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_config_file());
        let source = fs::canonicalize(&source).map_err(|err| UmpireError::io(&source, err))?;
        let resources = fs::canonicalize(self.resources_dir())
            .map_err(|err| UmpireError::io(self.resources_dir(), err))?;
        let target = if source.parent() == Some(resources.as_path()) {
            source
        } else {
            let name = self.add_config(&source, UMPIRE_CONFIG_TYPE)?;
            resources.join(name)
        };
        replace_link(&target, &self.staging_config_file())?;
        info!(config = %target.display(), "config staged");
        Ok(())
    }

    pub fn unstage_config_file(&self) -> Result<()> {
        let link = self.staging_config_file();
        match fs::remove_file(&link) {
            Ok(()) => {
                info!("config unstaged");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UmpireError::io(link, err)),
        }
    }

    pub fn get_staging_config(&self) -> Result<Option<String>> {
        let path = self.staging_config_file();
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| UmpireError::io(path, source))
    }
}

impl ResourceLocator for UmpireEnv {
    fn resource_path(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.resources_dir().join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("resource {} not found", path.display()),
            ))
        }
    }
}

fn resource_name(type_name: &str, content: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(content));
    format!("{}.{}.json", type_name, &digest[..RESOURCE_HASH_LEN])
}

fn replace_link(target: &Path, link: &Path) -> Result<()> {
    match fs::remove_file(link) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(UmpireError::io(link, err)),
    }
    #[cfg(unix)]
    let linked = std::os::unix::fs::symlink(target, link);
    #[cfg(not(unix))]
    let linked = fs::copy(target, link).map(|_| ());
    linked.map_err(|source| UmpireError::io(link, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(dir: &Path) -> UmpireEnv {
        let env = UmpireEnv::new(dir, 8080, Arc::new(ServiceRegistry::new()));
        env.ensure_layout().expect("layout");
        env
    }

    #[test]
    fn resource_names_embed_content_hash() {
        let a = resource_name("umpire", b"{}");
        let b = resource_name("umpire", b"{ }");
        assert!(a.starts_with("umpire."));
        assert!(a.ends_with(".json"));
        assert_ne!(a, b);
        assert_eq!(a.len(), "umpire.".len() + RESOURCE_HASH_LEN + ".json".len());
    }

    #[test]
    fn adding_same_content_twice_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = env(dir.path());
        let first = env.add_config_from_blob(b"config", "umpire").expect("add");
        let second = env.add_config_from_blob(b"config", "umpire").expect("add again");
        assert_eq!(first, second);
        assert!(env.get_resource_path(&first).is_ok());
        assert!(matches!(
            env.get_resource_path("absent.json"),
            Err(UmpireError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn shopfloor_url_requires_loaded_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            env(dir.path()).shopfloor_service_url(),
            Err(UmpireError::ConfigNotLoaded)
        ));
    }
}
