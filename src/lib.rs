//! # registry-harvest
//!
//! A session-authenticated access engine for registry APIs guarded by
//! anti-bot defenses.
//!
//! The crate manages everything between "I have a query" and "I have the
//! records": session token lifecycle with expiry-buffer renewal, enforced
//! inter-request pacing, page-by-page result collection with resume, a
//! three-class failure taxonomy with separate retry and crash-recovery
//! budgets, and a fixed pool of isolated workers each holding its own
//! session and network identity.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use registry_harvest::{
//!     ClientConfig, PoolConfig, SearchQuery, WorkerPoolBuilder,
//!     SessionProvider, SearchIssuer,
//! };
//!
//! async fn run(
//!     sessions: Arc<dyn SessionProvider>,
//!     issuer: Arc<dyn SearchIssuer>,
//! ) -> anyhow::Result<()> {
//!     let pool = WorkerPoolBuilder::new(
//!         PoolConfig::new(3),
//!         ClientConfig::new("https://registry.example"),
//!         sessions,
//!         issuer,
//!     )
//!     .build()
//!     .await?;
//!     pool.init().await?;
//!
//!     for outcome in pool.submit_all(vec![SearchQuery::new("acme corp")]).await {
//!         if let Some(report) = outcome.report() {
//!             println!("{}: {} records", report.metadata.query, report.results.len());
//!         }
//!     }
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod detect;
mod error;
mod fetch;
mod pool;
mod query;
mod record;
mod recovery;
mod session;
mod transport;

pub mod proxy;

pub use client::{PageCursor, RegistryClient};
pub use config::{ClientConfig, PoolConfig};
pub use detect::{BlockDetector, BlockSignal, TextBlockDetector};
pub use error::{ErrorKind, RequestError, Result};
pub use fetch::{session_headers, RateLimitedFetcher};
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use query::{SearchHandle, SearchIssuer, SearchQuery};
pub use record::{PageResponse, Performance, QueryOutcome, Record, SearchMetadata, SearchReport};
pub use recovery::{classify, run_with_recovery, BackoffPolicy, FailureClass, RecoveryBudget};
pub use session::{
    SessionManager, SessionProvider, SessionTokens, StaticSessionProvider, EXPIRY_SAFETY_BUFFER,
};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, HttpTransportFactory, Transport, TransportFactory,
};
