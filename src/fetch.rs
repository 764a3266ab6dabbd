//! Rate-limited, session-bearing request execution.
//!
//! [`RateLimitedFetcher`] is the only path outbound requests take. It
//! enforces the minimum inter-request spacing (tracked from the previous
//! request's completion, so spacing is guaranteed rather than best-effort),
//! derives session headers fresh from the session manager on every call, and
//! performs the single retry-on-auth-failure dance: a 401/403 invalidates the
//! local session, re-acquires exactly once and replays the request; a second
//! auth failure surfaces as a classified error.
//!
//! Spacing is per client. Sibling workers pace independently, so aggregate
//! throughput scales with pool size.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::session::{SessionManager, SessionTokens};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::proxy::ProxyConfig;
use crate::{RequestError, Result};

/// Derives the outbound headers for a session.
///
/// Recomputed on every request; header values are never cached across calls.
pub fn session_headers(tokens: &SessionTokens) -> Vec<(String, String)> {
    vec![
        ("X-Auth-Token".to_string(), tokens.auth_token.clone()),
        (
            "Authorization".to_string(),
            format!("Bearer {}", tokens.bearer_token),
        ),
        (
            "Cookie".to_string(),
            format!("SESSION={}", tokens.session_id),
        ),
        ("Accept".to_string(), "application/json".to_string()),
    ]
}

/// Paced, authenticated request executor for one client.
pub struct RateLimitedFetcher {
    min_interval: Duration,
    request_timeout: Duration,
    last_completed: Mutex<Option<Instant>>,
}

impl RateLimitedFetcher {
    /// Creates a fetcher with the given pacing and deadline.
    pub fn new(min_interval: Duration, request_timeout: Duration) -> Self {
        Self {
            min_interval,
            request_timeout,
            last_completed: Mutex::new(None),
        }
    }

    /// Sleeps out the remainder of the spacing interval.
    async fn pace(&self) {
        let remaining = {
            let guard = self.last_completed.lock().await;
            guard.and_then(|last| self.min_interval.checked_sub(last.elapsed()))
        };
        if let Some(wait) = remaining {
            debug!("Pacing: sleeping {:?} before next request", wait);
            tokio::time::sleep(wait).await;
        }
    }

    async fn mark_completed(&self) {
        *self.last_completed.lock().await = Some(Instant::now());
    }

    /// Executes one attempt with session headers and the request deadline.
    async fn attempt(
        &self,
        transport: &dyn Transport,
        sessions: &SessionManager,
        proxy: Option<&ProxyConfig>,
        request: &ApiRequest,
    ) -> Result<ApiResponse> {
        self.pace().await;

        let tokens = sessions.ensure_valid(proxy).await?;
        let mut prepared = request.clone();
        for (name, value) in session_headers(&tokens) {
            prepared = prepared.with_header(name, value);
        }

        let result = tokio::time::timeout(self.request_timeout, transport.execute(&prepared)).await;
        self.mark_completed().await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(RequestError::timeout(&request.url)),
        }
    }

    /// Executes the request, renewing the session once on 401/403.
    pub async fn api_fetch(
        &self,
        transport: &dyn Transport,
        sessions: &SessionManager,
        proxy: Option<&ProxyConfig>,
        request: ApiRequest,
    ) -> Result<ApiResponse> {
        let response = self.attempt(transport, sessions, proxy, &request).await?;

        let response = if matches!(response.status, 401 | 403) {
            warn!(
                "Auth failure (HTTP {}) on {}, renewing session and retrying once",
                response.status, request.url
            );
            sessions.invalidate().await;
            self.attempt(transport, sessions, proxy, &request).await?
        } else {
            response
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(RequestError::from_status(
                response.status,
                &request.url,
                response.retry_after_secs,
            ))
        }
    }
}
