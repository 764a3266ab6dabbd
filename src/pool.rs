//! Fixed-size worker pool over independent registry clients.
//!
//! Each worker owns a full client stack: its own session, its own network
//! identity, its own pacing clock. The pool adds nothing but dispatch: a
//! busy-flag table guarded by one mutex, polled by submitters until a worker
//! frees up. Workers never share sessions or proxies, so one worker tripping
//! the registry's defenses cannot poison its siblings.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::RegistryClient;
use crate::config::{ClientConfig, PoolConfig};
use crate::detect::BlockDetector;
use crate::proxy::ProxyProvider;
use crate::query::{SearchIssuer, SearchQuery};
use crate::record::QueryOutcome;
use crate::session::SessionProvider;
use crate::transport::TransportFactory;
use crate::Result;

/// Builds a [`WorkerPool`], wiring optional collaborators into every worker.
pub struct WorkerPoolBuilder {
    pool: PoolConfig,
    client: ClientConfig,
    session_provider: Arc<dyn SessionProvider>,
    issuer: Arc<dyn SearchIssuer>,
    proxy_provider: Option<Arc<dyn ProxyProvider>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    detector: Option<Arc<dyn BlockDetector>>,
}

impl WorkerPoolBuilder {
    /// Starts a builder with the required collaborators.
    pub fn new(
        pool: PoolConfig,
        client: ClientConfig,
        session_provider: Arc<dyn SessionProvider>,
        issuer: Arc<dyn SearchIssuer>,
    ) -> Self {
        Self {
            pool,
            client,
            session_provider,
            issuer,
            proxy_provider: None,
            transport_factory: None,
            detector: None,
        }
    }

    /// Wires a proxy provider; workers get leased identities round-robin.
    pub fn with_proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy_provider = Some(provider);
        self
    }

    /// Replaces the transport factory for every worker.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Replaces the block detector for every worker.
    pub fn with_detector(mut self, detector: Arc<dyn BlockDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Builds the pool, leasing initial proxies when a provider is wired.
    ///
    /// A short lease (fewer proxies than workers) is not an error; identities
    /// are reused round-robin across workers.
    pub async fn build(self) -> Result<WorkerPool> {
        let count = self.pool.concurrency.max(1);
        let proxies = match &self.proxy_provider {
            Some(provider) => provider.lease(count).await?,
            None => Vec::new(),
        };

        let workers: Vec<Arc<RegistryClient>> = (0..count)
            .map(|i| {
                let mut client = RegistryClient::new(
                    self.client.clone(),
                    Arc::clone(&self.session_provider),
                    Arc::clone(&self.issuer),
                );
                if let Some(factory) = &self.transport_factory {
                    client = client.with_transport_factory(Arc::clone(factory));
                }
                if let Some(detector) = &self.detector {
                    client = client.with_detector(Arc::clone(detector));
                }
                if let Some(provider) = &self.proxy_provider {
                    client = client.with_proxy_provider(Arc::clone(provider));
                }
                if !proxies.is_empty() {
                    client = client.with_proxy(proxies[i % proxies.len()].clone());
                }
                Arc::new(client)
            })
            .collect();

        Ok(WorkerPool {
            workers,
            busy: Mutex::new(vec![false; count]),
            poll_interval: self.pool.poll_interval(),
        })
    }
}

/// A fixed set of independent workers with busy-flag dispatch.
pub struct WorkerPool {
    workers: Vec<Arc<RegistryClient>>,
    busy: Mutex<Vec<bool>>,
    poll_interval: Duration,
}

/// A claimed worker. Dropping the slot marks the worker idle again, so the
/// flag is released even when the query future is cancelled.
struct WorkerSlot<'a> {
    pool: &'a WorkerPool,
    index: usize,
}

impl WorkerSlot<'_> {
    fn client(&self) -> &RegistryClient {
        &self.pool.workers[self.index]
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        let mut busy = self
            .pool
            .busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        busy[self.index] = false;
    }
}

impl WorkerPool {
    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Eagerly establishes every worker's session, in parallel.
    ///
    /// All-or-nothing: any worker failing to authenticate fails the whole
    /// init, leaving no half-ready pool.
    pub async fn init(&self) -> Result<()> {
        let results =
            futures::future::join_all(self.workers.iter().map(|w| w.ensure_session())).await;
        for result in results {
            result?;
        }
        info!("Worker pool ready: {} workers", self.workers.len());
        Ok(())
    }

    /// Claims the first idle worker, polling until one frees up.
    async fn acquire_worker(&self) -> WorkerSlot<'_> {
        loop {
            {
                let mut busy = self
                    .busy
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(index) = busy.iter().position(|flag| !*flag) {
                    busy[index] = true;
                    return WorkerSlot { pool: self, index };
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Runs one query on the first idle worker.
    pub async fn submit(&self, query: SearchQuery) -> QueryOutcome {
        let slot = self.acquire_worker().await;
        slot.client().run_query(&query).await
    }

    /// Runs a batch of queries across the pool.
    ///
    /// At most `size()` queries are in flight at once. Outcomes come back in
    /// submission order regardless of which worker finished first.
    pub async fn submit_all(&self, queries: Vec<SearchQuery>) -> Vec<QueryOutcome> {
        let indexed = queries
            .into_iter()
            .enumerate()
            .map(|(index, query)| async move { (index, self.submit(query).await) });

        let mut outcomes = futures::future::join_all(indexed).await;
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Tears down every worker. Best-effort: failures are logged, never
    /// propagated, and remaining workers still get their teardown.
    pub async fn close(&self) {
        for (index, worker) in self.workers.iter().enumerate() {
            if let Err(error) = worker.close().await {
                warn!("Worker {} teardown failed: {}", index, error);
            }
        }
    }
}
