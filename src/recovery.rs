//! Failure classification, backoff and the retry/recovery driver.
//!
//! Three failure classes with distinct handling:
//!
//! - **Transient** (retryable kinds): randomized backoff, then retry in
//!   place, bounded by the transient retry budget.
//! - **Crash** (the underlying session context or connection itself died,
//!   recognized by message signature): rotate network identity, respawn the
//!   session and replay the operation. Bounded by its own, larger budget;
//!   crash recovery never consumes a transient retry unit.
//! - **Fatal** (blocked, CAPTCHA, parse, not-found): surfaced immediately.
//!
//! Budgets live in an explicit [`RecoveryBudget`] value passed through the
//! call chain, so budget state is inspectable rather than hidden in captured
//! loop variables.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::{RequestError, Result};

/// Message fragments that identify a dead session context or connection
/// rather than an ordinary transient failure.
const CRASH_SIGNATURES: &[&str] = &[
    "context closed",
    "connection refused",
    "browser has exited",
    "target closed",
    "connection reset by peer",
];

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Back off and retry in place.
    Transient,
    /// Rotate identity, respawn the session, replay.
    Crash,
    /// Surface immediately.
    Fatal,
}

/// Classifies an error into its failure class.
///
/// Crash signatures win over kind-based retryability: a connection refusal
/// is a dead identity, not something worth retrying through.
pub fn classify(error: &RequestError) -> FailureClass {
    let message = error.message.to_lowercase();
    if CRASH_SIGNATURES.iter().any(|sig| message.contains(sig)) {
        return FailureClass::Crash;
    }
    if error.kind.is_retryable() {
        return FailureClass::Transient;
    }
    FailureClass::Fatal
}

/// Bounded retry and recovery allowances for one logical operation sequence.
///
/// The two budgets are deliberately separate: a crash recovery does not
/// consume a transient retry unit, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryBudget {
    retries_left: u32,
    recoveries_left: u32,
}

impl RecoveryBudget {
    /// Creates a budget with the given allowances.
    pub fn new(max_retries: u32, max_recoveries: u32) -> Self {
        Self {
            retries_left: max_retries,
            recoveries_left: max_recoveries,
        }
    }

    /// Consumes one transient retry unit; false when exhausted.
    pub fn try_consume_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        true
    }

    /// Consumes one crash recovery unit; false when exhausted.
    pub fn try_consume_recovery(&mut self) -> bool {
        if self.recoveries_left == 0 {
            return false;
        }
        self.recoveries_left -= 1;
        true
    }

    /// Remaining transient retries.
    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    /// Remaining crash recoveries.
    pub fn recoveries_left(&self) -> u32 {
        self.recoveries_left
    }
}

/// Randomized exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given base delay and cap.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Computes the delay for the given retry attempt (0-based).
    ///
    /// A server-supplied Retry-After always wins when it is longer than the
    /// computed window.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let exp = self
            .base
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max)
            .min(self.max);

        // Cheap jitter without a rand dependency: up to half the base on top.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let jitter_range_ms = (self.base.as_millis() as u64 / 2).max(1);
        let jitter = Duration::from_millis(seed % jitter_range_ms);

        let computed = (exp + jitter).min(self.max);
        match retry_after_secs {
            Some(secs) => computed.max(Duration::from_secs(secs)),
            None => computed,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Drives one logical operation through the retry/recovery state machine.
///
/// `operation` is replayed on transient failures (after backoff) and after
/// successful crash recoveries; `on_crash` must rotate the identity and
/// re-establish a valid session before the operation resumes. The last error
/// is surfaced once the applicable budget runs out.
pub async fn run_with_recovery<T, Op, OpFut, Crash, CrashFut>(
    budget: &mut RecoveryBudget,
    backoff: &BackoffPolicy,
    mut operation: Op,
    mut on_crash: Crash,
) -> Result<T>
where
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T>>,
    Crash: FnMut() -> CrashFut,
    CrashFut: Future<Output = Result<()>>,
{
    let mut transient_attempt: u32 = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match classify(&error) {
            FailureClass::Fatal => {
                debug!("Fatal failure, surfacing: {}", error);
                return Err(error);
            }
            FailureClass::Transient => {
                if !budget.try_consume_retry() {
                    warn!("Retry budget exhausted: {}", error);
                    return Err(error);
                }
                let wait = backoff.delay(transient_attempt, error.retry_after_secs);
                transient_attempt += 1;
                debug!(
                    "Transient failure ({}), backing off {:?} ({} retries left)",
                    error,
                    wait,
                    budget.retries_left()
                );
                tokio::time::sleep(wait).await;
            }
            FailureClass::Crash => {
                if !budget.try_consume_recovery() {
                    warn!("Recovery budget exhausted: {}", error);
                    return Err(error);
                }
                warn!(
                    "Session context crashed ({}), rotating identity ({} recoveries left)",
                    error,
                    budget.recoveries_left()
                );
                on_crash().await?;
            }
        }
    }
}
