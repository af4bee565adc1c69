//! Per-dependency circuit breakers
//!
//! A [`CircuitBreaker`] stops calls to a dependency after it failed
//! `failure_threshold` times in a row, rejects everything for
//! `reset_timeout`, and then lets exactly one trial call through to decide
//! whether to close again. Breakers live in a [`BreakerRegistry`] keyed by
//! dependency name and are shared by every job that talks to that
//! dependency.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::error::WorkerError;

/// Default consecutive failures before opening
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time a breaker stays open
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker thresholds, fixed for the breaker's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Error returned by [`CircuitBreaker::call`]
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Rejected without calling the dependency
    Open {
        dependency: String,
        /// Time left before a trial call is allowed (zero while a trial runs)
        retry_after: Duration,
    },
    /// The dependency was called and failed
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open {
                dependency,
                retry_after,
            } => write!(
                f,
                "circuit open for {}, retry in {}s",
                dependency,
                retry_after.as_secs()
            ),
            Self::Inner(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}

impl From<BreakerError<WorkerError>> for WorkerError {
    fn from(err: BreakerError<WorkerError>) -> Self {
        match err {
            BreakerError::Open {
                dependency,
                retry_after,
            } => WorkerError::CircuitOpen {
                dependency,
                retry_after,
            },
            BreakerError::Inner(e) => e,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub dependency: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// State change to log once the lock is released
enum Transition {
    Opened { failures: u32 },
    Reopened,
    Closed,
}

/// Circuit breaker for one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state as last recorded
    ///
    /// An open breaker whose timeout has passed still reports `Open` until the
    /// next call turns it half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            dependency: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
            failure_threshold: self.config.failure_threshold,
            reset_timeout: self.config.reset_timeout,
        }
    }

    /// Run `f` through the breaker; every `Err` counts as a failure
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_filtered(f, |_| true).await
    }

    /// Run `f` through the breaker, counting only errors that match
    ///
    /// Errors rejected by `counts_as_failure` (a 404, a validation error)
    /// prove the dependency answered and are recorded as successes.
    pub async fn call_filtered<T, E, F, Fut, P>(
        &self,
        f: F,
        counts_as_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let mut permit = match self.acquire() {
            Ok(permit) => permit,
            Err(retry_after) => {
                debug!(
                    dependency = %self.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit open, call rejected"
                );
                return Err(BreakerError::Open {
                    dependency: self.name.clone(),
                    retry_after,
                });
            }
        };

        let result = f().await;
        let failed = matches!(&result, Err(e) if counts_as_failure(e));
        permit.settle(failed);
        result.map_err(BreakerError::Inner)
    }

    /// Admit a call or return the time left until a trial is allowed
    fn acquire(&self) -> Result<Permit<'_>, Duration> {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let reset = chrono::Duration::from_std(self.config.reset_timeout)
                    .unwrap_or(chrono::Duration::MAX);
                let reopen_at = inner.opened_at.unwrap_or(now) + reset;
                if now >= reopen_at {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    drop(inner);
                    debug!(dependency = %self.name, "Circuit half-open, sending trial call");
                    Ok(Permit::new(self, true))
                } else {
                    Err(clock::until(self.clock.as_ref(), reopen_at))
                }
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(Duration::ZERO),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn record(&self, trial: bool, failed: bool) {
        let now = self.clock.now();
        let mut inner = self.lock();

        let transition = if trial {
            inner.trial_in_flight = false;
            if failed {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                Some(Transition::Reopened)
            } else {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.consecutive_failures = 0;
                Some(Transition::Closed)
            }
        } else if failed {
            // Calls admitted before the breaker opened do not count twice
            if inner.state == CircuitState::Closed {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    Some(Transition::Opened {
                        failures: inner.consecutive_failures,
                    })
                } else {
                    None
                }
            } else {
                None
            }
        } else {
            inner.consecutive_failures = 0;
            None
        };
        drop(inner);

        match transition {
            Some(Transition::Opened { failures }) => warn!(
                dependency = %self.name,
                failures,
                reset_timeout_secs = self.config.reset_timeout.as_secs(),
                "Circuit opened"
            ),
            Some(Transition::Reopened) => warn!(
                dependency = %self.name,
                "Trial call failed, circuit reopened"
            ),
            Some(Transition::Closed) => info!(dependency = %self.name, "Circuit closed"),
            None => {}
        }
    }

    fn abandon_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }
}

/// Admission ticket for one call; an unsettled trial is released on drop
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(&mut self, failed: bool) {
        self.settled = true;
        self.breaker.record(self.trial, failed);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.abandon_trial();
        }
    }
}

/// All breakers of the process, created on first use
#[derive(Debug)]
pub struct BreakerRegistry {
    clock: Arc<dyn Clock>,
    defaults: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            defaults,
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Use different thresholds for one dependency
    pub fn with_config(mut self, dependency: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(dependency.into(), config);
        self
    }

    /// Breaker for `dependency`, created with its configured thresholds
    pub fn get(&self, dependency: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(dependency)
                    .copied()
                    .unwrap_or(self.defaults);
                Arc::new(CircuitBreaker::new(dependency, config, self.clock.clone()))
            })
            .clone()
    }

    /// Create breakers up front so they show in [`BreakerRegistry::snapshot`]
    pub fn register(&self, dependencies: &[&str]) {
        for dependency in dependencies {
            self.get(dependency);
        }
    }

    /// `call` on the named breaker
    pub async fn call<T, E, F, Fut>(&self, dependency: &str, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get(dependency).call(f).await
    }

    /// Status of every known breaker, sorted by name
    pub fn snapshot(&self) -> Vec<BreakerStatus> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut statuses: Vec<BreakerStatus> = breakers.iter().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        statuses
    }
}
