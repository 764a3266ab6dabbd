//! Registry client: one session, one network identity, sequential requests.
//!
//! A [`RegistryClient`] ties together the session manager, the rate-limited
//! fetch layer and the pagination logic for a single worker. Its identity
//! (proxy + transport) is an immutable snapshot replaced wholesale on
//! rotation, never patched field by field, so a reader mid-request and a
//! concurrent rotation cannot observe a half-updated identity.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::detect::{BlockDetector, TextBlockDetector};
use crate::fetch::RateLimitedFetcher;
use crate::proxy::{ProxyConfig, ProxyProvider};
use crate::query::{SearchHandle, SearchIssuer, SearchQuery};
use crate::record::{PageResponse, QueryOutcome, Record, SearchReport};
use crate::recovery::{run_with_recovery, BackoffPolicy, RecoveryBudget};
use crate::session::{SessionManager, SessionProvider, SessionTokens};
use crate::transport::{ApiRequest, HttpTransportFactory, Transport, TransportFactory};
use crate::{ErrorKind, RequestError, Result};

/// One network identity: a proxy (or direct egress) and the transport bound
/// to it. Replaced as a unit on rotation.
#[derive(Clone)]
struct Identity {
    proxy: Option<ProxyConfig>,
    transport: Option<Arc<dyn Transport>>,
}

/// Resumable pagination position: the next page to fetch and everything
/// collected so far. Lives outside the retried operation so completed pages
/// survive a failure and are never re-fetched.
#[derive(Debug, Default)]
pub struct PageCursor {
    /// Next page index to fetch (0-based).
    pub next_page: u64,
    /// Records collected so far, in page order.
    pub collected: Vec<Record>,
}

impl PageCursor {
    /// A cursor starting at page 0 with nothing collected.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor resuming at the given page.
    pub fn starting_at(page: u64) -> Self {
        Self {
            next_page: page,
            collected: Vec::new(),
        }
    }
}

/// Session-authenticated client for one worker.
pub struct RegistryClient {
    config: ClientConfig,
    sessions: SessionManager,
    fetcher: RateLimitedFetcher,
    issuer: Arc<dyn SearchIssuer>,
    proxy_provider: Option<Arc<dyn ProxyProvider>>,
    transport_factory: Arc<dyn TransportFactory>,
    detector: Arc<dyn BlockDetector>,
    identity: RwLock<Identity>,
}

impl RegistryClient {
    /// Creates a client with direct egress and the default HTTP transport.
    pub fn new(
        config: ClientConfig,
        session_provider: Arc<dyn SessionProvider>,
        issuer: Arc<dyn SearchIssuer>,
    ) -> Self {
        let fetcher = RateLimitedFetcher::new(config.min_interval(), config.request_timeout());
        let sessions = SessionManager::new(session_provider, config.session_max_age());
        let transport_factory = Arc::new(HttpTransportFactory::new(
            config.user_agent.clone(),
            config.request_timeout(),
        ));
        Self {
            config,
            sessions,
            fetcher,
            issuer,
            proxy_provider: None,
            transport_factory,
            detector: Arc::new(TextBlockDetector::new()),
            identity: RwLock::new(Identity {
                proxy: None,
                transport: None,
            }),
        }
    }

    /// Assigns an initial network identity.
    pub fn with_proxy(self, proxy: ProxyConfig) -> Self {
        Self {
            identity: RwLock::new(Identity {
                proxy: Some(proxy),
                transport: None,
            }),
            ..self
        }
    }

    /// Wires the proxy-lease provider used for identity rotation.
    pub fn with_proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy_provider = Some(provider);
        self
    }

    /// Replaces the transport factory (tests substitute a scripted wire).
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = factory;
        self
    }

    /// Replaces the block-page classifier.
    pub fn with_detector(mut self, detector: Arc<dyn BlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the proxy currently assigned, if any.
    pub async fn current_proxy(&self) -> Option<ProxyConfig> {
        self.identity.read().await.proxy.clone()
    }

    /// Returns the current identity snapshot, building the transport lazily.
    async fn identity(&self) -> Result<(Option<ProxyConfig>, Arc<dyn Transport>)> {
        {
            let guard = self.identity.read().await;
            if let Some(transport) = &guard.transport {
                return Ok((guard.proxy.clone(), Arc::clone(transport)));
            }
        }

        let mut guard = self.identity.write().await;
        let transport = match &guard.transport {
            Some(transport) => Arc::clone(transport),
            None => {
                let built = self.transport_factory.build(guard.proxy.as_ref())?;
                guard.transport = Some(Arc::clone(&built));
                built
            }
        };
        Ok((guard.proxy.clone(), transport))
    }

    /// Replaces the whole network identity and drops the session.
    ///
    /// With a proxy provider wired, a fresh lease is requested; otherwise the
    /// transport is rebuilt on the current egress. The old session is always
    /// invalidated: its cookies are bound to the old identity in the server's
    /// anti-abuse profiling.
    pub async fn rotate_identity(&self) -> Result<()> {
        let fresh_proxy = match &self.proxy_provider {
            Some(provider) => provider.lease(1).await?.into_iter().next(),
            None => self.identity.read().await.proxy.clone(),
        };

        let transport = self.transport_factory.build(fresh_proxy.as_ref())?;
        {
            let mut guard = self.identity.write().await;
            *guard = Identity {
                proxy: fresh_proxy,
                transport: Some(transport),
            };
        }
        self.sessions.invalidate().await;
        info!("Network identity rotated");
        Ok(())
    }

    /// Returns a valid session, acquiring through the current identity.
    pub async fn ensure_session(&self) -> Result<SessionTokens> {
        let (proxy, _) = self.identity().await?;
        self.sessions.ensure_valid(proxy.as_ref()).await
    }

    /// Rotation plus session respawn, used as the crash-recovery step.
    async fn recover_identity(&self) -> Result<()> {
        self.rotate_identity().await?;
        self.ensure_session().await?;
        Ok(())
    }

    /// Issues a search through the privileged quick-search collaborator.
    pub async fn quick_search(&self, query: &SearchQuery) -> Result<SearchHandle> {
        let (proxy, _) = self.identity().await?;
        let session = self.sessions.ensure_valid(proxy.as_ref()).await?;
        let handle = self
            .issuer
            .quick_search(&session, proxy.as_ref(), query)
            .await?;
        debug!(
            "Quick search issued: id={} total={}",
            handle.search_id, handle.total_results
        );
        Ok(handle)
    }

    fn page_url(&self, search_id: &str, page: u64, page_size: u32) -> String {
        format!(
            "{}/api/search/{}/results?page={}&pageSize={}",
            self.config.base_url,
            urlencoding::encode(search_id),
            page,
            page_size
        )
    }

    fn detail_url(&self, record_id: &str, search_id: Option<&str>) -> String {
        match search_id {
            Some(sid) => format!(
                "{}/api/records/{}?searchId={}",
                self.config.base_url,
                urlencoding::encode(record_id),
                urlencoding::encode(sid)
            ),
            None => format!(
                "{}/api/records/{}",
                self.config.base_url,
                urlencoding::encode(record_id)
            ),
        }
    }

    /// Fetches one result page.
    ///
    /// Bodies that are not valid page JSON go through the block detector.
    /// The explicit no-results signal is honored before any block indicator,
    /// so an empty result set is never classified as a block.
    pub async fn fetch_page(
        &self,
        handle: &SearchHandle,
        page: u64,
        page_size: u32,
    ) -> Result<PageResponse> {
        let url = self.page_url(&handle.search_id, page, page_size);
        let (proxy, transport) = self.identity().await?;
        let response = self
            .fetcher
            .api_fetch(
                transport.as_ref(),
                &self.sessions,
                proxy.as_ref(),
                ApiRequest::get(&url),
            )
            .await?;

        match response.json::<PageResponse>(&url) {
            Ok(page) => Ok(page),
            Err(parse_err) => {
                let signal = self.detector.classify(&response.body);
                if signal.is_no_results {
                    return Ok(PageResponse {
                        records: Vec::new(),
                        total_results: 0,
                    });
                }
                if signal.blocked {
                    let reason = signal.reason.unwrap_or_default();
                    let kind = if reason.contains("captcha") || reason.contains("robot") {
                        ErrorKind::CaptchaRequired
                    } else {
                        ErrorKind::Blocked
                    };
                    return Err(RequestError::new(
                        kind,
                        &url,
                        format!("block page detected: {}", reason),
                    ));
                }
                Err(parse_err)
            }
        }
    }

    /// Continues pagination from the cursor's position.
    ///
    /// Pages are fetched strictly in increasing order; the walk stops early
    /// once `limit` records are collected (0 = no limit). Individual page
    /// failures are not retried here; they propagate with the cursor holding
    /// the progress made, so a resume never re-issues completed pages.
    pub async fn fetch_from(
        &self,
        handle: &SearchHandle,
        page_size: u32,
        limit: usize,
        cursor: &mut PageCursor,
    ) -> Result<()> {
        if page_size == 0 {
            return Err(RequestError::new(
                ErrorKind::Unknown,
                "",
                "page size must be positive",
            ));
        }

        let total_pages = handle.total_results.div_ceil(page_size as u64);
        while cursor.next_page < total_pages {
            if limit > 0 && cursor.collected.len() >= limit {
                break;
            }
            let page = self.fetch_page(handle, cursor.next_page, page_size).await?;
            debug!(
                "Fetched page {}/{} ({} records)",
                cursor.next_page + 1,
                total_pages,
                page.records.len()
            );
            cursor.collected.extend(page.records);
            cursor.next_page += 1;
        }

        if limit > 0 && cursor.collected.len() > limit {
            cursor.collected.truncate(limit);
        }
        Ok(())
    }

    /// Fetches the whole result set for a handle, from page 0.
    ///
    /// Deterministic for a fixed handle/session pair: repeating the call
    /// yields the same records, modulo upstream data changes.
    pub async fn fetch_all(
        &self,
        handle: &SearchHandle,
        page_size: u32,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let mut cursor = PageCursor::new();
        self.fetch_from(handle, page_size, limit, &mut cursor)
            .await?;
        Ok(cursor.collected)
    }

    /// Fetches the structured detail payload for one record.
    pub async fn fetch_detail(
        &self,
        record_id: &str,
        search_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        let url = self.detail_url(record_id, search_id);
        let (proxy, transport) = self.identity().await?;
        let response = self
            .fetcher
            .api_fetch(
                transport.as_ref(),
                &self.sessions,
                proxy.as_ref(),
                ApiRequest::get(&url),
            )
            .await?;

        match response.json::<serde_json::Value>(&url) {
            Ok(detail) => Ok(detail),
            Err(parse_err) => {
                let signal = self.detector.classify(&response.body);
                if signal.blocked {
                    let reason = signal.reason.unwrap_or_default();
                    let kind = if reason.contains("captcha") || reason.contains("robot") {
                        ErrorKind::CaptchaRequired
                    } else {
                        ErrorKind::Blocked
                    };
                    return Err(RequestError::new(
                        kind,
                        &url,
                        format!("block page detected: {}", reason),
                    ));
                }
                Err(parse_err)
            }
        }
    }

    /// Runs one full query: session ensure, quick search, full pagination,
    /// all through the retry/recovery state machine.
    ///
    /// Progress is never discarded: a terminal failure after some pages were
    /// collected comes back as [`QueryOutcome::Partial`].
    pub async fn run_query(&self, query: &SearchQuery) -> QueryOutcome {
        let executed_at = SystemTime::now();
        let start = Instant::now();
        let mut budget = RecoveryBudget::new(self.config.max_retries, self.config.max_recoveries);
        let backoff = BackoffPolicy::new(
            Duration::from_millis(self.config.backoff_base_ms),
            Duration::from_millis(self.config.backoff_max_ms),
        );

        let handle = match run_with_recovery(
            &mut budget,
            &backoff,
            || self.quick_search(query),
            || self.recover_identity(),
        )
        .await
        {
            Ok(handle) => handle,
            Err(error) => return QueryOutcome::Failed(error),
        };

        // The cursor lives outside the retried operation: a retry or crash
        // recovery resumes from the first unfetched page.
        let cursor = Mutex::new(PageCursor::new());
        let walk = run_with_recovery(
            &mut budget,
            &backoff,
            || async {
                let mut guard = cursor.lock().await;
                self.fetch_from(&handle, query.page_size, query.limit, &mut guard)
                    .await
            },
            || self.recover_identity(),
        )
        .await;

        let cursor = cursor.into_inner();
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = SearchReport::new(
            &query.query,
            &handle.search_id,
            handle.total_results,
            cursor.collected,
            executed_at,
            duration_ms,
        );

        match walk {
            Ok(()) => QueryOutcome::Complete(report),
            Err(error) => {
                warn!("Query '{}' failed after {} records: {}", query.query, report.results.len(), error);
                if report.results.is_empty() {
                    QueryOutcome::Failed(error)
                } else {
                    QueryOutcome::Partial(report, error)
                }
            }
        }
    }

    /// Tears down session-side resources. Best-effort.
    pub async fn close(&self) -> Result<()> {
        self.sessions.release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionTokens;
    use crate::transport::ApiResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> ClientConfig {
        ClientConfig::new("https://registry.example")
            .with_min_interval(Duration::ZERO)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    struct TestProvider;

    #[async_trait]
    impl SessionProvider for TestProvider {
        async fn acquire(&self, _proxy: Option<&ProxyConfig>) -> Result<SessionTokens> {
            Ok(SessionTokens::new("af", "sid", "bearer"))
        }
    }

    struct TestIssuer {
        total: u64,
    }

    #[async_trait]
    impl SearchIssuer for TestIssuer {
        async fn quick_search(
            &self,
            _session: &SessionTokens,
            _proxy: Option<&ProxyConfig>,
            query: &SearchQuery,
        ) -> Result<SearchHandle> {
            Ok(SearchHandle::new("srch-1", self.total, &query.query))
        }
    }

    /// Transport serving deterministic record pages for any page URL.
    struct PageTransport {
        total: u64,
        calls: AtomicUsize,
        pages_seen: std::sync::Mutex<Vec<u64>>,
    }

    impl PageTransport {
        fn new(total: u64) -> Self {
            Self {
                total,
                calls: AtomicUsize::new(0),
                pages_seen: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn page_fetches(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn pages_seen(&self) -> Vec<u64> {
            self.pages_seen.lock().unwrap().clone()
        }
    }

    fn query_param(url: &str, name: &str) -> Option<u64> {
        let parsed = url::Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse().ok())
    }

    #[async_trait]
    impl Transport for PageTransport {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = query_param(&request.url, "page").unwrap_or(0);
            let page_size = query_param(&request.url, "pageSize").unwrap_or(100);
            self.pages_seen.lock().unwrap().push(page);

            let start = page * page_size;
            let end = (start + page_size).min(self.total);
            let records: Vec<String> = (start..end).map(|i| format!(r#"{{"id":"r{}"}}"#, i)).collect();
            let body = format!(
                r#"{{"records":[{}],"totalResults":{}}}"#,
                records.join(","),
                self.total
            );
            Ok(ApiResponse {
                status: 200,
                body,
                retry_after_secs: None,
            })
        }
    }

    struct FixedFactory {
        transport: Arc<dyn Transport>,
    }

    impl TransportFactory for FixedFactory {
        fn build(&self, _proxy: Option<&ProxyConfig>) -> Result<Arc<dyn Transport>> {
            Ok(Arc::clone(&self.transport))
        }
    }

    fn client_with(transport: Arc<dyn Transport>, total: u64) -> RegistryClient {
        RegistryClient::new(
            test_config(),
            Arc::new(TestProvider),
            Arc::new(TestIssuer { total }),
        )
        .with_transport_factory(Arc::new(FixedFactory { transport }))
    }

    #[tokio::test]
    async fn test_fetch_all_250_of_100_is_three_pages() {
        let transport = Arc::new(PageTransport::new(250));
        let client = client_with(transport.clone(), 250);
        let handle = client.quick_search(&SearchQuery::new("acme")).await.unwrap();

        let records = client.fetch_all(&handle, 100, 0).await.unwrap();

        assert_eq!(records.len(), 250);
        assert_eq!(transport.page_fetches(), 3);
        assert_eq!(transport.pages_seen(), vec![0, 1, 2]);
        // Final page holds the remaining 50
        assert_eq!(records[249].id, "r249");
    }

    #[tokio::test]
    async fn test_fetch_all_zero_total_is_zero_fetches() {
        let transport = Arc::new(PageTransport::new(0));
        let client = client_with(transport.clone(), 0);
        let handle = client.quick_search(&SearchQuery::new("nothing")).await.unwrap();

        let records = client.fetch_all(&handle, 100, 0).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(transport.page_fetches(), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_limit_stops_early() {
        let transport = Arc::new(PageTransport::new(500));
        let client = client_with(transport.clone(), 500);
        let handle = client.quick_search(&SearchQuery::new("acme")).await.unwrap();

        let records = client.fetch_all(&handle, 100, 150).await.unwrap();

        assert_eq!(records.len(), 150);
        // 2 pages cover 150 records; the remaining 3 are never fetched
        assert_eq!(transport.page_fetches(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_is_idempotent() {
        let transport = Arc::new(PageTransport::new(120));
        let client = client_with(transport, 120);
        let handle = client.quick_search(&SearchQuery::new("acme")).await.unwrap();

        let first = client.fetch_all(&handle, 50, 0).await.unwrap();
        let second = client.fetch_all(&handle, 50, 0).await.unwrap();

        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ids2);
    }

    #[tokio::test]
    async fn test_fetch_from_resumes_without_refetching() {
        let transport = Arc::new(PageTransport::new(300));
        let client = client_with(transport.clone(), 300);
        let handle = client.quick_search(&SearchQuery::new("acme")).await.unwrap();

        let mut cursor = PageCursor::starting_at(1);
        client.fetch_from(&handle, 100, 0, &mut cursor).await.unwrap();

        assert_eq!(cursor.collected.len(), 200);
        assert_eq!(transport.pages_seen(), vec![1, 2]);
        assert_eq!(cursor.next_page, 3);
    }

    #[tokio::test]
    async fn test_fetch_from_rejects_zero_page_size() {
        let transport = Arc::new(PageTransport::new(10));
        let client = client_with(transport, 10);
        let handle = SearchHandle::new("srch-1", 10, "acme");

        let mut cursor = PageCursor::new();
        let err = client.fetch_from(&handle, 0, 0, &mut cursor).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
    }

    struct HtmlTransport {
        body: &'static str,
    }

    #[async_trait]
    impl Transport for HtmlTransport {
        async fn execute(&self, _request: &ApiRequest) -> Result<ApiResponse> {
            Ok(ApiResponse {
                status: 200,
                body: self.body.to_string(),
                retry_after_secs: None,
            })
        }
    }

    #[tokio::test]
    async fn test_captcha_body_classified_not_parse_error() {
        let transport = Arc::new(HtmlTransport {
            body: "<html>please solve the CAPTCHA</html>",
        });
        let client = client_with(transport, 10);
        let handle = SearchHandle::new("srch-1", 10, "acme");

        let err = client.fetch_page(&handle, 0, 100).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CaptchaRequired);
    }

    #[tokio::test]
    async fn test_no_results_body_is_empty_page_not_block() {
        let transport = Arc::new(HtmlTransport {
            body: "<html>No records found</html>",
        });
        let client = client_with(transport, 10);
        let handle = SearchHandle::new("srch-1", 10, "acme");

        let page = client.fetch_page(&handle, 0, 100).await.unwrap();
        assert!(page.records.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let transport = Arc::new(HtmlTransport {
            body: "<html>perfectly ordinary but not JSON</html>",
        });
        let client = client_with(transport, 10);
        let handle = SearchHandle::new("srch-1", 10, "acme");

        let err = client.fetch_page(&handle, 0, 100).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_fetch_detail() {
        let transport = Arc::new(HtmlTransport {
            body: r#"{"id":"r1","name":"Acme Corp"}"#,
        });
        let client = client_with(transport, 10);

        let detail = client.fetch_detail("r1", Some("srch-1")).await.unwrap();
        assert_eq!(detail["name"], "Acme Corp");
    }

    #[tokio::test]
    async fn test_run_query_complete() {
        let transport = Arc::new(PageTransport::new(250));
        let client = client_with(transport, 250);

        let outcome = client
            .run_query(&SearchQuery::new("acme").with_page_size(100))
            .await;

        assert!(outcome.is_complete());
        let report = outcome.report().unwrap();
        assert_eq!(report.results.len(), 250);
        assert_eq!(report.metadata.search_id, "srch-1");
        assert_eq!(report.metadata.total_results, 250);
    }

    /// Transport that serves page 0 then fails fatally.
    struct FailAfterFirstPage {
        inner: PageTransport,
    }

    #[async_trait]
    impl Transport for FailAfterFirstPage {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
            let page = query_param(&request.url, "page").unwrap_or(0);
            if page > 0 {
                return Ok(ApiResponse {
                    status: 403,
                    body: String::new(),
                    retry_after_secs: None,
                });
            }
            self.inner.execute(request).await
        }
    }

    #[tokio::test]
    async fn test_run_query_partial_preserves_progress() {
        let transport = Arc::new(FailAfterFirstPage {
            inner: PageTransport::new(250),
        });
        let client = client_with(transport, 250);

        let outcome = client
            .run_query(&SearchQuery::new("acme").with_page_size(100))
            .await;

        assert!(!outcome.is_complete());
        let report = outcome.report().expect("partial progress kept");
        assert_eq!(report.results.len(), 100);
        assert_eq!(outcome.error().unwrap().kind, ErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_page_url_encodes_search_id() {
        let transport = Arc::new(PageTransport::new(0));
        let client = client_with(transport, 0);
        let url = client.page_url("id with spaces", 2, 50);
        assert_eq!(
            url,
            "https://registry.example/api/search/id%20with%20spaces/results?page=2&pageSize=50"
        );
    }

    #[tokio::test]
    async fn test_detail_url_variants() {
        let transport = Arc::new(PageTransport::new(0));
        let client = client_with(transport, 0);
        assert_eq!(
            client.detail_url("r1", None),
            "https://registry.example/api/records/r1"
        );
        assert_eq!(
            client.detail_url("r1", Some("s1")),
            "https://registry.example/api/records/r1?searchId=s1"
        );
    }

    #[tokio::test]
    async fn test_rotate_identity_clears_session_and_replaces_proxy() {
        struct LeaseCounter {
            leases: AtomicUsize,
        }

        #[async_trait]
        impl ProxyProvider for LeaseCounter {
            async fn lease(&self, count: usize) -> Result<Vec<ProxyConfig>> {
                let n = self.leases.fetch_add(1, Ordering::SeqCst);
                Ok((0..count)
                    .map(|i| ProxyConfig::new("10.0.0.1", 9000 + (n + i) as u16))
                    .collect())
            }
        }

        let transport = Arc::new(PageTransport::new(0));
        let provider = Arc::new(LeaseCounter {
            leases: AtomicUsize::new(0),
        });
        let client = client_with(transport, 0)
            .with_proxy(ProxyConfig::new("10.0.0.1", 8000))
            .with_proxy_provider(provider);

        client.ensure_session().await.unwrap();
        assert_eq!(client.current_proxy().await.unwrap().port, 8000);

        client.rotate_identity().await.unwrap();
        assert_eq!(client.current_proxy().await.unwrap().port, 9000);
        assert!(client.sessions.current().await.is_none());
    }
}
