//! Process-scoped services shared by every connection handler.

use crate::catalog::{CatalogError, CatalogStore, MemoryCatalog, PoolPolicy, VolumeRecord};
use crate::config::{ConfigError, DaemonConfig};
use crate::job::{JobContext, JobRegistry};
use crate::messages::{LogSink, MessageSink};
use crate::util::VolstreamError;
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "net")]
use crate::dispatcher::CatalogDispatcher;
#[cfg(feature = "net")]
use crate::net::{CatalogServer, CatalogServerHandle};

/// Catalog and operator message destination, injected into handlers.
#[derive(Clone)]
pub struct DaemonContext {
    pub store: Arc<dyn CatalogStore>,
    pub messages: Arc<dyn MessageSink>,
}

impl DaemonContext {
    pub fn new(store: Arc<dyn CatalogStore>, messages: Arc<dyn MessageSink>) -> Self {
        Self { store, messages }
    }
}

/// Everything the catalog daemon needs, built from its configuration.
pub struct Daemon {
    pub context: DaemonContext,
    pub catalog: Arc<MemoryCatalog>,
    pub jobs: Arc<JobRegistry>,
    pub pools: HashMap<String, Arc<PoolPolicy>>,
    pub snapshot_path: Option<PathBuf>,
}

impl Daemon {
    /// Opens the catalog snapshot, seeds configured volumes that are not yet
    /// known and registers the configured jobs.
    pub fn bootstrap(config: &DaemonConfig) -> Result<Self, VolstreamError> {
        let catalog = Arc::new(match &config.catalog_snapshot {
            Some(path) => MemoryCatalog::open(path)?,
            None => MemoryCatalog::new(),
        });
        let pools = config.pool_policies()?;
        let lookup_pool = |name: &str| {
            pools
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownPool(name.to_string()))
        };
        for seed in &config.volumes {
            if catalog.get_volume(&seed.name)?.is_some() {
                continue;
            }
            let pool = lookup_pool(&seed.pool)?;
            let media_type = seed
                .media_type
                .clone()
                .unwrap_or_else(|| config.media_type.clone());
            let mut record = VolumeRecord::new(&seed.name, pool.pool_id, media_type)
                .with_status(seed.status);
            record.vol_max_bytes = pool.max_volume_bytes;
            record.slot = seed.slot;
            catalog.insert_volume(record)?;
            info!("event=volume_seeded volume={} pool={}", seed.name, pool.name);
        }
        let jobs = Arc::new(JobRegistry::new());
        for job in &config.jobs {
            let pool = lookup_pool(&job.pool)?;
            let media_type = job
                .media_type
                .clone()
                .unwrap_or_else(|| config.media_type.clone());
            jobs.register(JobContext::new(job.id, &job.name, job.kind, pool, media_type));
        }
        info!(
            "event=daemon_bootstrap pools={} jobs={} volumes={}",
            pools.len(),
            jobs.len(),
            catalog.volumes().len()
        );
        let messages: Arc<dyn MessageSink> = Arc::new(LogSink);
        let store: Arc<dyn CatalogStore> = catalog.clone();
        Ok(Self {
            context: DaemonContext::new(store, messages),
            catalog,
            jobs,
            pools,
            snapshot_path: config.catalog_snapshot.clone(),
        })
    }

    /// Starts the catalog listener described by `config`.
    #[cfg(feature = "net")]
    pub fn serve(&self, config: &DaemonConfig) -> Result<CatalogServerHandle, VolstreamError> {
        let dispatcher = Arc::new(CatalogDispatcher::new(self.context.clone()));
        let server = CatalogServer::spawn(
            config.catalog_server_config()?,
            dispatcher,
            self.jobs.clone(),
        )?;
        info!(
            "event=catalogd_ready addr={} jobs={}",
            server.local_addr(),
            self.jobs.len()
        );
        Ok(server)
    }

    /// Writes the catalog snapshot when one is configured.
    pub fn save_snapshot(&self) -> Result<(), CatalogError> {
        match &self.snapshot_path {
            Some(path) => self.catalog.save_snapshot(path),
            None => Ok(()),
        }
    }
}
