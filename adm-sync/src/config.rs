use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use graph_diff_core::RunError;
use serde::Deserialize;
use thiserror::Error;

use crate::parse::RoleMap;

/// Job configuration read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Value stamped into `system_of_record` and used to scope the target.
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub update_sites: bool,
    /// Inventory store file. Relative paths resolve against the config file.
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceConfig>,
    #[serde(default)]
    pub hostname_map: Vec<HostnameRole>,
}

/// One management-system instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Feed snapshot served for this instance.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostnameRole {
    pub pattern: String,
    pub role: String,
}

/// Resolved connection details of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub verify: bool,
}

/// Settings shared by both adapters of one run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub source_name: String,
    pub namespace: String,
    pub tenant: Option<String>,
    pub update_sites: bool,
    /// Log per-entity load and write events at info instead of debug.
    pub debug: bool,
    pub roles: RoleMap,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            source_name: default_source_name(),
            namespace: default_namespace(),
            tenant: None,
            update_sites: false,
            debug: false,
            roles: RoleMap::default(),
        }
    }
}

/// Errors returned when loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load a configuration file and resolve its relative paths.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut config = parse_config(&raw, path.display().to_string())?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

fn parse_config(raw: &str, path: String) -> Result<Config, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse { path, source })
}

impl Config {
    /// Check job-wide settings. Per-instance problems are reported by
    /// [`InstanceConfig::credentials`] so they only abort that instance.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.instances.is_empty() {
            return Err(RunError::FatalConfiguration(
                "no [[instance]] configured".to_string(),
            ));
        }
        self.role_map().map(|_| ())
    }

    pub fn role_map(&self) -> Result<RoleMap, RunError> {
        RoleMap::new(
            self.hostname_map
                .iter()
                .map(|entry| (entry.pattern.as_str(), entry.role.as_str())),
        )
        .map_err(|err| RunError::FatalConfiguration(format!("invalid hostname_map pattern: {err}")))
    }

    /// Build the adapter settings, with an optional tenant override.
    pub fn settings(&self, tenant: Option<&str>, debug: bool) -> Result<SyncSettings, RunError> {
        Ok(SyncSettings {
            source_name: self.source_name.clone(),
            namespace: self.namespace.clone(),
            tenant: tenant.map(str::to_string).or_else(|| self.tenant.clone()),
            update_sites: self.update_sites,
            debug,
            roles: self.role_map()?,
        })
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|instance| instance.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.store = resolve(base, &self.store);
        for instance in &mut self.instances {
            if let Some(snapshot) = &instance.snapshot {
                instance.snapshot = Some(resolve(base, snapshot));
            }
        }
    }
}

impl InstanceConfig {
    /// Resolve credentials, reading `password_env` when no inline password
    /// is set.
    pub fn credentials(&self) -> Result<Credentials, RunError> {
        let missing = |what: &str| {
            RunError::FatalConfiguration(format!("instance {} has no {what}", self.name))
        };
        if self.base_url.trim().is_empty() {
            return Err(missing("base_url"));
        }
        if self.username.trim().is_empty() {
            return Err(missing("username"));
        }
        let password = match (&self.password, &self.password_env) {
            (Some(password), _) if !password.is_empty() => password.clone(),
            (_, Some(var)) => env::var(var).map_err(|_| {
                RunError::FatalConfiguration(format!(
                    "instance {} password variable {var} is not set",
                    self.name
                ))
            })?,
            _ => return Err(missing("password")),
        };
        Ok(Credentials {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            username: self.username.clone(),
            password,
            verify: self.verify,
        })
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn default_source_name() -> String {
    "Citrix ADM".to_string()
}

fn default_namespace() -> String {
    "Global".to_string()
}

fn default_store() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_verify() -> bool {
    true
}
