use crate::config::ProviderKind;
use conclave_core::{ConclaveError, ConclaveResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Thresholds and cooldown for a provider's circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Successful trial calls in `HalfOpen` that close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Trial calls admitted while `HalfOpen`.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    /// Seconds the circuit stays `Open` before admitting trials.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    2
}

fn default_half_open_max_calls() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    30
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            half_open_max_calls: default_half_open_max_calls(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Reject configurations that could never close again.
    pub fn validate(&self) -> ConclaveResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConclaveError::Config(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.success_threshold == 0 || self.half_open_max_calls == 0 {
            return Err(ConclaveError::Config(
                "breaker.success_threshold and breaker.half_open_max_calls must be at least 1"
                    .into(),
            ));
        }
        if self.success_threshold > self.half_open_max_calls {
            return Err(ConclaveError::Config(format!(
                "breaker.success_threshold ({}) exceeds breaker.half_open_max_calls ({})",
                self.success_threshold, self.half_open_max_calls
            )));
        }
        Ok(())
    }
}

/// Position of a breaker in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the provider.
    Open,
    /// A limited number of trial calls test the provider.
    HalfOpen,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub provider: ProviderKind,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    /// Bumped on every state transition; permits from an older epoch settle as no-ops.
    epoch: u64,
}

/// How a guarded call ended, as far as the breaker is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// The provider answered but the call carries no health verdict.
    Neutral,
}

/// Per-provider failure-isolation state machine.
///
/// `Closed` → (`failure_threshold` consecutive failures) → `Open` →
/// (cooldown) → `HalfOpen` → (`success_threshold` trial successes) → `Closed`.
/// Any trial failure re-opens the circuit and restarts the cooldown.
///
/// Only permits issued in the current state count. A call admitted while
/// `Closed` that settles after the circuit has moved on is ignored, so the
/// `HalfOpen` verdict rests on its own trial calls alone.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderKind,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `provider`.
    pub fn new(provider: ProviderKind, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                half_open_admitted: 0,
                epoch: 0,
            }),
        }
    }

    /// Provider this breaker guards.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Current state, after applying any elapsed cooldown.
    pub fn state(&self) -> CircuitState {
        let mut s = self.inner.lock();
        self.refresh(&mut s);
        s.state
    }

    /// Snapshot of the counters.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut s = self.inner.lock();
        self.refresh(&mut s);
        CircuitBreakerSnapshot {
            provider: self.provider,
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            consecutive_successes: s.consecutive_successes,
        }
    }

    fn transition(s: &mut BreakerState, to: CircuitState) {
        s.state = to;
        s.consecutive_successes = 0;
        s.half_open_admitted = 0;
        s.epoch += 1;
    }

    fn refresh(&self, s: &mut BreakerState) {
        if s.state != CircuitState::Open {
            return;
        }
        let cooled = s
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.cooldown());
        if cooled {
            Self::transition(s, CircuitState::HalfOpen);
            info!(provider = %self.provider, "Circuit half-open, admitting trial calls");
        }
    }

    fn open(&self, s: &mut BreakerState) {
        Self::transition(s, CircuitState::Open);
        s.opened_at = Some(Instant::now());
        warn!(
            provider = %self.provider,
            failures = s.consecutive_failures,
            cooldown_secs = self.config.cooldown_secs,
            "Circuit opened"
        );
    }

    fn close(&self, s: &mut BreakerState) {
        Self::transition(s, CircuitState::Closed);
        s.consecutive_failures = 0;
        s.opened_at = None;
        info!(provider = %self.provider, "Circuit closed");
    }

    /// Ask permission for one call.
    ///
    /// Returns [`ConclaveError::CircuitOpen`] while open, or while half-open
    /// with every trial slot taken. Settle the permit with
    /// [`BreakerPermit::success`], [`BreakerPermit::failure`] or
    /// [`BreakerPermit::release`]; dropping it unsettled frees its trial slot
    /// without counting an outcome.
    pub fn acquire(&self) -> ConclaveResult<BreakerPermit<'_>> {
        let mut s = self.inner.lock();
        self.refresh(&mut s);
        match s.state {
            CircuitState::Closed => Ok(BreakerPermit {
                breaker: self,
                epoch: s.epoch,
                trial: false,
                settled: false,
            }),
            CircuitState::Open => Err(ConclaveError::CircuitOpen(self.provider.to_string())),
            CircuitState::HalfOpen => {
                if s.half_open_admitted >= self.config.half_open_max_calls {
                    return Err(ConclaveError::CircuitOpen(self.provider.to_string()));
                }
                s.half_open_admitted += 1;
                Ok(BreakerPermit {
                    breaker: self,
                    epoch: s.epoch,
                    trial: true,
                    settled: false,
                })
            }
        }
    }

    /// Record a successful call made without a permit.
    ///
    /// Counts only while `Closed`; `HalfOpen` is decided by trial permits.
    pub fn record_success(&self) {
        let mut s = self.inner.lock();
        self.apply(&mut s, false, Outcome::Success);
    }

    /// Record a failed call made without a permit.
    ///
    /// Counts only while `Closed`; `HalfOpen` is decided by trial permits.
    pub fn record_failure(&self) {
        let mut s = self.inner.lock();
        self.apply(&mut s, false, Outcome::Failure);
    }

    fn settle(&self, epoch: u64, trial: bool, outcome: Outcome) {
        let mut s = self.inner.lock();
        if s.epoch != epoch {
            debug!(provider = %self.provider, ?outcome, "Ignoring outcome of a call from an earlier circuit state");
            return;
        }
        self.apply(&mut s, trial, outcome);
    }

    fn apply(&self, s: &mut BreakerState, trial: bool, outcome: Outcome) {
        match s.state {
            CircuitState::Closed => match outcome {
                Outcome::Success | Outcome::Neutral => s.consecutive_failures = 0,
                Outcome::Failure => {
                    s.consecutive_failures += 1;
                    if s.consecutive_failures >= self.config.failure_threshold {
                        self.open(s);
                    }
                }
            },
            CircuitState::HalfOpen if trial => match outcome {
                Outcome::Success => {
                    s.consecutive_successes += 1;
                    if s.consecutive_successes >= self.config.success_threshold {
                        self.close(s);
                    }
                }
                Outcome::Failure => {
                    s.consecutive_failures += 1;
                    self.open(s);
                }
                Outcome::Neutral => {
                    s.half_open_admitted = s.half_open_admitted.saturating_sub(1);
                }
            },
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// Run `fut` under the breaker.
    ///
    /// Errors that do not implicate the provider (see
    /// [`ConclaveError::trips_breaker`]) settle the permit with
    /// [`BreakerPermit::release`].
    pub async fn call<F, T>(&self, fut: F) -> ConclaveResult<T>
    where
        F: Future<Output = ConclaveResult<T>>,
    {
        let permit = self.acquire()?;
        match fut.await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                if e.trips_breaker() {
                    permit.failure();
                } else {
                    permit.release();
                }
                Err(e)
            }
        }
    }

    /// Force the breaker back to `Closed`.
    pub fn reset(&self) {
        let mut s = self.inner.lock();
        Self::transition(&mut s, CircuitState::Closed);
        s.consecutive_failures = 0;
        s.opened_at = None;
    }
}

/// Admission token returned by [`CircuitBreaker::acquire`].
///
/// Tagged with the breaker's epoch at admission; settling it after the
/// breaker changed state has no effect.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit is one of the `HalfOpen` trial calls.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The guarded call succeeded.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, self.trial, Outcome::Success);
    }

    /// The guarded call failed.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, self.trial, Outcome::Failure);
    }

    /// The provider answered but the outcome says nothing about its health.
    ///
    /// Resets the failure streak while `Closed`; frees the trial slot
    /// without a verdict while `HalfOpen`.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, self.trial, Outcome::Neutral);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.settle(self.epoch, true, Outcome::Neutral);
        }
    }
}

/// One breaker per provider, created on first use and shared by every caller.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<ProviderKind, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create an empty registry; breakers inherit `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker for `provider`, creating it closed if needed.
    pub fn get(&self, provider: ProviderKind) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(provider)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.config.clone())))
            .clone()
    }

    /// Snapshots of every breaker created so far.
    pub fn snapshot(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        breakers.iter().map(|b| b.snapshot()).collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
