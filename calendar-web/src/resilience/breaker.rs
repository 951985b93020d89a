// SPDX-License-Identifier: Apache-2.0
//! Circuit Breaker
//!
//! Closed → Open → Half-Open state machine over a rolling window of call
//! outcomes. Shared process-wide per backend target; state survives
//! individual requests and resets only at startup.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of recent outcomes considered for the failure rate.
    pub window_size: usize,

    /// Failure rate (0.0..=1.0) at which a full window opens the breaker.
    pub failure_rate_threshold: f64,

    /// How long the breaker stays open before admitting trial calls.
    pub cool_down: Duration,

    /// Trial calls admitted in half-open before deciding.
    pub half_open_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_rate_threshold: 0.5,
            cool_down: Duration::from_secs(30),
            half_open_trials: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    /// Rolling outcome window; `true` is a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trials_issued: u32,
    trial_results: u32,
    trial_failures: u32,
}

/// Rejection issued while the breaker is open (or out of trial permits).
#[derive(Debug)]
pub struct CircuitOpen;

/// Admission for one call through the breaker.
///
/// Every permit resolves to exactly one window outcome: `success` or
/// `failure` when the call completes, or a failure on drop when it never
/// did. A cancelled call therefore counts against the window instead of
/// leaving a half-open trial unresolved.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    resolved: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record(false);
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record(true);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record(true);
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                trials_issued: 0,
                trial_results: 0,
                trial_failures: 0,
            }),
        }
    }

    /// Ask to pass a call through.
    ///
    /// Closed always admits; open rejects until the cool-down elapses;
    /// half-open admits at most the configured number of trial calls.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpen> {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            BreakerState::Closed => Ok(self.permit()),
            BreakerState::Open => Err(CircuitOpen),
            BreakerState::HalfOpen => {
                if inner.trials_issued < self.config.half_open_trials {
                    inner.trials_issued += 1;
                    Ok(self.permit())
                } else {
                    Err(CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.record(false);
    }

    pub fn record_failure(&self) {
        self.record(true);
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn permit(&self) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            resolved: false,
        }
    }

    fn record(&self, failed: bool) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.window_size {
                    inner.window.pop_front();
                }

                if inner.window.len() == self.config.window_size {
                    let failures = inner.window.iter().filter(|f| **f).count();
                    let rate = failures as f64 / self.config.window_size as f64;
                    if rate >= self.config.failure_rate_threshold {
                        warn!(
                            failure_rate = rate,
                            window = self.config.window_size,
                            "Circuit breaker opening"
                        );
                        self.open(&mut inner);
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.trial_results += 1;
                if failed {
                    inner.trial_failures += 1;
                }

                if inner.trial_results >= self.config.half_open_trials {
                    let rate = inner.trial_failures as f64 / inner.trial_results as f64;
                    if rate >= self.config.failure_rate_threshold {
                        warn!(failure_rate = rate, "Trial calls failed, reopening breaker");
                        self.open(&mut inner);
                    } else {
                        info!("Trial calls succeeded, closing breaker");
                        inner.state = BreakerState::Closed;
                        inner.window.clear();
                        inner.opened_at = None;
                    }
                }
            }
            // A call that straddled the transition to open; its outcome no
            // longer matters.
            BreakerState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.window.clear();
        inner.trials_issued = 0;
        inner.trial_results = 0;
        inner.trial_failures = 0;
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.cool_down {
                    info!("Cool-down elapsed, breaker half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.trials_issued = 0;
                    inner.trial_results = 0;
                    inner.trial_failures = 0;
                }
            }
        }
    }
}
