#![allow(dead_code)]

use super::catalog_support::{default_pool, CatalogFixture, MEDIA_TYPE};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use volstream::job::{JobContext, JobKind, JobRegistry};
use volstream::net::{CatalogClient, CatalogServer, CatalogServerConfig, CatalogServerHandle};
use volstream::util::RetryPolicy;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RunningCatalog {
    pub fixture: CatalogFixture,
    pub jobs: Arc<JobRegistry>,
    pub server: CatalogServerHandle,
}

impl RunningCatalog {
    /// Serves `fixture` on an ephemeral port with one registered job per
    /// `(id, kind)` pair, named `nightly.{id}` or `restore.{id}`.
    pub fn start(fixture: CatalogFixture, jobs: &[(u32, JobKind)]) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let pool = Arc::new(default_pool());
        for (id, kind) in jobs {
            let name = match kind {
                JobKind::Backup => format!("nightly.{id}"),
                _ => format!("restore.{id}"),
            };
            registry.register(JobContext::new(*id, name, *kind, pool.clone(), MEDIA_TYPE));
        }
        let mut config = CatalogServerConfig::new("127.0.0.1:0".parse().unwrap());
        config.io_timeout = Some(IO_TIMEOUT);
        let server = CatalogServer::spawn(
            config,
            Arc::new(fixture.dispatcher()),
            registry.clone(),
        )
        .expect("catalog server starts");
        Self {
            fixture,
            jobs: registry,
            server,
        }
    }

    pub fn client(&self, job_name: &str) -> CatalogClient {
        CatalogClient::connect(
            self.server.local_addr(),
            job_name,
            &RetryPolicy::linear(3, Duration::from_millis(20)),
            IO_TIMEOUT,
        )
        .expect("client connects")
    }
}

/// Polls `check` until it holds or two seconds pass.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
