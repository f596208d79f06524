//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: a single probe tests whether the downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: samples >= minimum and failure ratio >= threshold
//! Open → Half-Open: lazily, on the first call after reset_timeout
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails or times out
//! ```
//!
//! # Design Decisions
//! - One breaker per protected operation, not global
//! - Fail fast in Open state: the operation is never invoked
//! - Single probe in Half-Open (prevents hammering a recovering downstream)
//! - No background timer; Open → Half-Open happens on the next call
//! - Counters and state live behind one mutex, never held across an await
//! - Results of calls admitted before a transition are discarded after it
//! - A dropped (cancelled) call counts as neither success nor failure

use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ResilienceConfig;
use crate::observability::metrics;
use crate::resilience::error::ResilienceError;
use crate::resilience::timeouts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Transition notifications published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    Open,
    Close,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Deadline for a single protected call.
    pub timeout: Duration,
    /// Failure percentage (0-100) at which the circuit opens.
    pub error_threshold_percentage: u8,
    /// Cool-down before a probe is let through.
    pub reset_timeout: Duration,
    /// Completed calls required before the ratio is evaluated.
    pub minimum_samples: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            timeout: config.timeout(),
            error_threshold_percentage: config.error_threshold_percentage.min(100),
            reset_timeout: config.reset_timeout(),
            minimum_samples: config.minimum_samples.max(1),
        }
    }
}

/// Counters since the last reset or state transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejects: u64,
}

impl BreakerStats {
    /// Completed calls; rejects never reached the downstream and are excluded.
    pub fn total(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    pub fn failed(&self) -> u64 {
        self.failures + self.timeouts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub stats: BreakerStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    stats: BreakerStats,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped on every transition; permits from an older generation are ignored.
    generation: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                stats: BreakerStats::default(),
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stored state. An Open breaker whose cool-down elapsed still reports
    /// Open until the next call moves it to Half-Open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            stats: inner.stats,
        }
    }

    /// Receive Open/Close/HalfOpen notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::Closed {
            inner.stats = BreakerStats::default();
            inner.generation += 1;
        } else {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Invoke `op` through the breaker under the configured timeout.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_within(None, op).await
    }

    /// Like [`call`](Self::call), with an extra deadline; the tighter one wins.
    pub async fn call_within<F, Fut, T, E>(
        &self,
        limit: Option<Duration>,
        op: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.acquire() else {
            return Err(ResilienceError::CircuitOpen {
                name: self.name.clone(),
            });
        };

        let deadline = timeouts::tightest(Some(self.config.timeout), limit);
        let result = timeouts::enforce(deadline, async {
            op().await.map_err(ResilienceError::Upstream)
        })
        .await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(ResilienceError::Timeout { .. }) => Outcome::Timeout,
            Err(_) => Outcome::Failure,
        };
        permit.complete(outcome);
        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.reset_timeout);
                if !cooled_down {
                    return self.reject(&mut inner);
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return self.reject(&mut inner);
                }
                true
            }
        };
        if probe {
            inner.probe_in_flight = true;
        }
        Some(Permit {
            breaker: self,
            generation: inner.generation,
            probe,
            completed: false,
        })
    }

    fn reject(&self, inner: &mut Inner) -> Option<Permit<'_>> {
        inner.stats.rejects += 1;
        tracing::debug!(breaker = %self.name, state = inner.state.as_str(), "Call rejected");
        metrics::record_breaker_rejection(&self.name);
        None
    }

    fn record(&self, generation: u64, outcome: Outcome) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::trace!(breaker = %self.name, "Discarding result from previous state");
            return;
        }

        match outcome {
            Outcome::Success => inner.stats.successes += 1,
            Outcome::Failure => inner.stats.failures += 1,
            Outcome::Timeout => inner.stats.timeouts += 1,
        }

        match inner.state {
            CircuitState::HalfOpen => {
                if outcome == Outcome::Success {
                    self.transition(&mut inner, CircuitState::Closed);
                } else {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::Closed if outcome != Outcome::Success => {
                if self.should_trip(&inner.stats) {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn should_trip(&self, stats: &BreakerStats) -> bool {
        let total = stats.total();
        total >= u64::from(self.config.minimum_samples)
            && stats.failed() * 100 >= u64::from(self.config.error_threshold_percentage) * total
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        let stats = inner.stats;

        inner.state = to;
        inner.stats = BreakerStats::default();
        inner.generation += 1;
        inner.probe_in_flight = false;
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);

        let event = match to {
            CircuitState::Open => {
                tracing::warn!(
                    breaker = %self.name,
                    from = from.as_str(),
                    successes = stats.successes,
                    failures = stats.failures,
                    timeouts = stats.timeouts,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "Circuit breaker opened"
                );
                BreakerEvent::Open
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing");
                BreakerEvent::HalfOpen
            }
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, from = from.as_str(), "Circuit breaker closed");
                BreakerEvent::Close
            }
        };
        metrics::record_breaker_transition(&self.name, to);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Admission to call the downstream once.
///
/// Dropped without [`complete`](Permit::complete) means the call was
/// cancelled; a cancelled probe frees the probe slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    completed: bool,
}

impl Permit<'_> {
    fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.breaker.record(self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::debug!(breaker = %self.breaker.name, probe = self.probe, "Call cancelled");
        if self.probe {
            let mut inner = self.breaker.lock();
            if inner.generation == self.generation && inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }
}
