//! Session token lifecycle management.
//!
//! The registry issues three credentials per login (anti-forgery token,
//! server session id, bearer token), all of which must accompany every API
//! call. Acquisition itself is an external concern (an interactive login
//! flow) abstracted behind [`SessionProvider`]; this module owns validity
//! tracking and renewal.
//!
//! A [`SessionManager`] belongs to exactly one client. Tokens are immutable
//! once obtained; renewal replaces the whole set, never patches fields.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::proxy::ProxyConfig;
use crate::Result;

/// Safety margin subtracted from a token's declared expiry. A session within
/// this window of expiring is treated as already expired.
pub const EXPIRY_SAFETY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// The credential set for one authenticated session.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Anti-forgery token sent with every request.
    pub auth_token: String,
    /// Server-side session identifier (cookie value).
    pub session_id: String,
    /// Bearer token for the Authorization header.
    pub bearer_token: String,
    /// When the session was obtained.
    pub obtained_at: SystemTime,
    /// Declared expiry, when the server reports one.
    pub expires_at: Option<SystemTime>,
}

impl SessionTokens {
    /// Creates a token set obtained now, with no declared expiry.
    pub fn new(
        auth_token: impl Into<String>,
        session_id: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            session_id: session_id.into(),
            bearer_token: bearer_token.into(),
            obtained_at: SystemTime::now(),
            expires_at: None,
        }
    }

    /// Sets a declared expiry time.
    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the session age, zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.obtained_at)
            .unwrap_or_default()
    }

    /// Whether the session is still usable.
    ///
    /// With a declared expiry: valid while the expiry minus the safety buffer
    /// is in the future. Without one: valid while younger than `max_age`.
    pub fn is_valid(&self, max_age: Duration) -> bool {
        match self.expires_at {
            Some(expiry) => match expiry.checked_sub(EXPIRY_SAFETY_BUFFER) {
                Some(deadline) => SystemTime::now() < deadline,
                None => false,
            },
            None => self.age() < max_age,
        }
    }
}

/// Trait for the external session-acquisition flow.
///
/// Implementations drive whatever login mechanism the registry requires and
/// must return all three credentials or fail; partial success is not a
/// supported outcome. Acquisition failures are not retried here; they
/// propagate for the recovery layer to handle.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquires a fresh session, optionally through the given proxy.
    async fn acquire(&self, proxy: Option<&ProxyConfig>) -> Result<SessionTokens>;

    /// Releases resources held on behalf of a session (browser contexts,
    /// cookie jars). Best-effort; the default does nothing.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// A provider that hands out a fixed, externally obtained token set.
///
/// Useful for CLI runs where tokens were extracted manually, and for tests.
pub struct StaticSessionProvider {
    tokens: SessionTokens,
}

impl StaticSessionProvider {
    /// Creates a provider returning clones of the given tokens.
    pub fn new(tokens: SessionTokens) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn acquire(&self, _proxy: Option<&ProxyConfig>) -> Result<SessionTokens> {
        Ok(SessionTokens {
            obtained_at: SystemTime::now(),
            ..self.tokens.clone()
        })
    }
}

/// Owns one client's session and its renewal.
///
/// Acquisition is serialized behind an async mutex: when several callers on
/// the same client race past an expired session, the first performs the
/// acquisition and the rest await the lock, then see the fresh tokens.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    state: Mutex<Option<SessionTokens>>,
    max_age: Duration,
}

impl SessionManager {
    /// Creates a manager with the given acquisition provider.
    pub fn new(provider: Arc<dyn SessionProvider>, max_age: Duration) -> Self {
        Self {
            provider,
            state: Mutex::new(None),
            max_age,
        }
    }

    /// Returns valid tokens, acquiring or renewing as needed.
    ///
    /// A failed acquisition leaves the prior (expired) state untouched and
    /// propagates the provider's error.
    pub async fn ensure_valid(&self, proxy: Option<&ProxyConfig>) -> Result<SessionTokens> {
        let mut guard = self.state.lock().await;

        if let Some(tokens) = guard.as_ref() {
            if tokens.is_valid(self.max_age) {
                return Ok(tokens.clone());
            }
            debug!("Session expired or inside safety buffer, renewing");
        }

        let fresh = self.provider.acquire(proxy).await?;
        *guard = Some(fresh.clone());
        debug!("Session acquired");
        Ok(fresh)
    }

    /// Drops the current tokens so the next call re-acquires.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    /// Returns the current tokens without validity checks.
    pub async fn current(&self) -> Option<SessionTokens> {
        self.state.lock().await.clone()
    }

    /// Releases provider-side resources. Best-effort.
    pub async fn release(&self) -> Result<()> {
        self.invalidate().await;
        self.provider.release().await
    }
}
