//! YAML configuration for the catalog daemon.

use crate::catalog::{PoolPolicy, VolumeStatus};
use crate::edit::{duration_to_seconds, size_to_bytes, validate_name, EditError};
use crate::job::JobKind;
use crate::util::{config_base_dir, resolve_relative};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:9101";
pub const DEFAULT_MEDIA_TYPE: &str = "File";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid listen address `{0}`")]
    InvalidListen(String),
    #[error("{field}: {source}")]
    InvalidValue {
        field: String,
        source: EditError,
    },
    #[error("pool `{0}` is defined more than once")]
    DuplicatePool(String),
    #[error("unknown pool `{0}`")]
    UnknownPool(String),
    #[error("job `{0}` is defined more than once")]
    DuplicateJob(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub max_connections: Option<usize>,
    /// Per-connection read/write timeout; `0` or absent disables it.
    #[serde(default)]
    pub io_timeout: Option<String>,
    /// Media type of the storage resource jobs write to.
    #[serde(default = "default_media_type")]
    pub media_type: String,
    #[serde(default)]
    pub catalog_snapshot: Option<PathBuf>,
    /// How often the binary writes the catalog snapshot.
    #[serde(default)]
    pub snapshot_interval: Option<String>,
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    #[serde(default)]
    pub volumes: Vec<VolumeSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub name: String,
    #[serde(default)]
    pub use_volume_once: bool,
    #[serde(default)]
    pub max_volume_jobs: u32,
    /// Human duration such as `7 days`.
    #[serde(default)]
    pub volume_use_duration: Option<String>,
    #[serde(default = "default_true")]
    pub accept_any_volume: bool,
    #[serde(default = "default_true")]
    pub catalog_files: bool,
    #[serde(default)]
    pub label_format: Option<String>,
    #[serde(default)]
    pub max_volumes: u32,
    /// Human size such as `500m`.
    #[serde(default)]
    pub max_volume_bytes: Option<String>,
    #[serde(default)]
    pub volume_retention: Option<String>,
    #[serde(default = "default_true")]
    pub recycle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub kind: JobKind,
    pub pool: String,
    #[serde(default)]
    pub media_type: Option<String>,
}

/// A volume that is provisioned at startup when the catalog lacks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeSeed {
    pub name: String,
    pub pool: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub status: VolumeStatus,
    #[serde(default)]
    pub slot: i32,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_media_type() -> String {
    DEFAULT_MEDIA_TYPE.to_string()
}

fn default_true() -> bool {
    true
}

fn duration_field(field: String, value: Option<&str>) -> Result<u64, ConfigError> {
    match value {
        Some(text) => {
            duration_to_seconds(text).map_err(|source| ConfigError::InvalidValue { field, source })
        }
        None => Ok(0),
    }
}

fn size_field(field: String, value: Option<&str>) -> Result<u64, ConfigError> {
    match value {
        Some(text) => {
            size_to_bytes(text).map_err(|source| ConfigError::InvalidValue { field, source })
        }
        None => Ok(0),
    }
}

fn name_field(field: &str, name: &str) -> Result<(), ConfigError> {
    validate_name(name).map_err(|source| ConfigError::InvalidValue {
        field: format!("{field} `{name}`"),
        source,
    })
}

/// Reads `path`, resolving relative paths against its directory.
pub fn load_config(path: &Path) -> Result<DaemonConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = DaemonConfig::from_yaml(&raw)?;
    let base = config_base_dir(path);
    if let Some(snapshot) = config.catalog_snapshot.take() {
        config.catalog_snapshot = Some(resolve_relative(&base, &snapshot));
    }
    Ok(config)
}

impl DaemonConfig {
    /// Parses and validates a configuration document.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.io_timeout()?;
        self.snapshot_interval()?;
        let pools = self.pool_policies()?;
        let mut job_names: Vec<&str> = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            name_field("job", &job.name)?;
            if job_names.contains(&job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
            job_names.push(job.name.as_str());
            if !pools.contains_key(&job.pool) {
                return Err(ConfigError::UnknownPool(job.pool.clone()));
            }
        }
        for volume in &self.volumes {
            name_field("volume", &volume.name)?;
            if !pools.contains_key(&volume.pool) {
                return Err(ConfigError::UnknownPool(volume.pool.clone()));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(self.listen.clone()))
    }

    pub fn io_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        let seconds = duration_field("io_timeout".into(), self.io_timeout.as_deref())?;
        Ok(Some(Duration::from_secs(seconds)).filter(|timeout| !timeout.is_zero()))
    }

    pub fn snapshot_interval(&self) -> Result<Option<Duration>, ConfigError> {
        let seconds = duration_field("snapshot_interval".into(), self.snapshot_interval.as_deref())?;
        Ok(Some(Duration::from_secs(seconds)).filter(|interval| !interval.is_zero()))
    }

    /// Builds one policy per configured pool, numbered from 1 in file order.
    pub fn pool_policies(&self) -> Result<HashMap<String, Arc<PoolPolicy>>, ConfigError> {
        let mut policies = HashMap::with_capacity(self.pools.len());
        for (idx, pool) in self.pools.iter().enumerate() {
            name_field("pool", &pool.name)?;
            if policies.contains_key(&pool.name) {
                return Err(ConfigError::DuplicatePool(pool.name.clone()));
            }
            let field = |name: &str| format!("pools.{}.{name}", pool.name);
            let mut policy = PoolPolicy::new(idx as u32 + 1, &pool.name);
            policy.use_volume_once = pool.use_volume_once;
            policy.max_volume_jobs = pool.max_volume_jobs;
            policy.volume_use_duration = duration_field(
                field("volume_use_duration"),
                pool.volume_use_duration.as_deref(),
            )?;
            policy.accept_any_volume = pool.accept_any_volume;
            policy.catalog_files = pool.catalog_files;
            policy.label_format = pool.label_format.clone();
            policy.max_volumes = pool.max_volumes;
            policy.max_volume_bytes =
                size_field(field("max_volume_bytes"), pool.max_volume_bytes.as_deref())?;
            if let Some(retention) = pool.volume_retention.as_deref() {
                policy.volume_retention =
                    duration_field(field("volume_retention"), Some(retention))?;
            }
            policy.recycle = pool.recycle;
            policies.insert(pool.name.clone(), Arc::new(policy));
        }
        Ok(policies)
    }

    #[cfg(feature = "net")]
    pub fn catalog_server_config(
        &self,
    ) -> Result<crate::net::CatalogServerConfig, ConfigError> {
        let mut server = crate::net::CatalogServerConfig::new(self.listen_addr()?);
        server.max_connections = self.max_connections;
        server.io_timeout = self.io_timeout()?;
        Ok(server)
    }
}
