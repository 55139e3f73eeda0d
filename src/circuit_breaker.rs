use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{Error, TransportErrorKind};
use crate::util::lock_unpoisoned;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircuitBreakerPolicy {
    failure_rate_threshold: f64,
    minimum_calls: usize,
    window: Duration,
    reset_timeout: Duration,
    half_open_max_requests: usize,
    half_open_success_threshold: usize,
}

impl CircuitBreakerPolicy {
    /// Opens at an 80% failure rate over 120s once 10 calls were seen; probes after 30s.
    pub const fn standard() -> Self {
        Self {
            failure_rate_threshold: 0.8,
            minimum_calls: 10,
            window: Duration::from_secs(120),
            reset_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
            half_open_success_threshold: 1,
        }
    }

    pub fn failure_rate_threshold(mut self, failure_rate_threshold: f64) -> Self {
        self.failure_rate_threshold = failure_rate_threshold.clamp(0.0, 1.0);
        self
    }

    pub const fn minimum_calls(mut self, minimum_calls: usize) -> Self {
        self.minimum_calls = minimum_calls;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window.max(Duration::from_millis(1));
        self
    }

    pub const fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    pub const fn half_open_max_requests(mut self, half_open_max_requests: usize) -> Self {
        self.half_open_max_requests = half_open_max_requests;
        self
    }

    pub const fn half_open_success_threshold(mut self, half_open_success_threshold: usize) -> Self {
        self.half_open_success_threshold = half_open_success_threshold;
        self
    }

    pub fn configured_failure_rate_threshold(&self) -> f64 {
        self.failure_rate_threshold
    }

    pub const fn configured_minimum_calls(&self) -> usize {
        self.minimum_calls
    }

    pub const fn configured_window(&self) -> Duration {
        self.window
    }

    pub const fn configured_reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CircuitAttemptKind {
    Closed,
    HalfOpen,
}

#[derive(Debug)]
enum CircuitState {
    Closed {
        outcomes: VecDeque<(Instant, bool)>,
    },
    Open {
        opened_at: Instant,
    },
    HalfOpen {
        active_requests: usize,
        successful_requests: usize,
    },
}

impl CircuitState {
    fn closed() -> Self {
        Self::Closed {
            outcomes: VecDeque::new(),
        }
    }
}

/// Health gate shared by every client of one service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    policy: CircuitBreakerPolicy,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, policy: CircuitBreakerPolicy) -> Self {
        Self {
            service: service.into(),
            policy,
            state: Mutex::new(CircuitState::closed()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn policy(&self) -> CircuitBreakerPolicy {
        self.policy
    }

    pub fn status(&self) -> CircuitStatus {
        match &*lock_unpoisoned(&self.state) {
            CircuitState::Closed { .. } => CircuitStatus::Closed,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.policy.reset_timeout {
                    CircuitStatus::HalfOpen
                } else {
                    CircuitStatus::Open
                }
            }
            CircuitState::HalfOpen { .. } => CircuitStatus::HalfOpen,
        }
    }

    /// Admits one attempt, or returns how long the caller should stay away. No
    /// hint is given while the half-open probes are all in flight.
    pub(crate) fn begin(self: &Arc<Self>) -> Result<CircuitAttempt, Option<Duration>> {
        let mut state = lock_unpoisoned(&self.state);
        let now = Instant::now();
        match &mut *state {
            CircuitState::Closed { .. } => Ok(CircuitAttempt {
                breaker: Arc::clone(self),
                kind: CircuitAttemptKind::Closed,
                completed: false,
            }),
            CircuitState::Open { opened_at } => {
                let elapsed = now.saturating_duration_since(*opened_at);
                if elapsed >= self.policy.reset_timeout {
                    info!(service = %self.service, "circuit breaker half-open, probing");
                    *state = CircuitState::HalfOpen {
                        active_requests: 1,
                        successful_requests: 0,
                    };
                    return Ok(CircuitAttempt {
                        breaker: Arc::clone(self),
                        kind: CircuitAttemptKind::HalfOpen,
                        completed: false,
                    });
                }
                Err(Some(self.policy.reset_timeout - elapsed))
            }
            CircuitState::HalfOpen {
                active_requests, ..
            } => {
                if *active_requests >= self.policy.half_open_max_requests.max(1) {
                    return Err(None);
                }
                *active_requests = active_requests.saturating_add(1);
                Ok(CircuitAttempt {
                    breaker: Arc::clone(self),
                    kind: CircuitAttemptKind::HalfOpen,
                    completed: false,
                })
            }
        }
    }

    fn record(&self, kind: CircuitAttemptKind, failed: bool) {
        let mut state = lock_unpoisoned(&self.state);
        let now = Instant::now();
        match (&mut *state, kind) {
            (CircuitState::Closed { outcomes }, CircuitAttemptKind::Closed) => {
                outcomes.push_back((now, failed));
                while let Some((recorded_at, _)) = outcomes.front() {
                    if now.saturating_duration_since(*recorded_at) > self.policy.window {
                        outcomes.pop_front();
                    } else {
                        break;
                    }
                }
                let calls = outcomes.len();
                let failures = outcomes.iter().filter(|(_, failed)| *failed).count();
                if calls >= self.policy.minimum_calls.max(1)
                    && failures as f64 / calls as f64 >= self.policy.failure_rate_threshold
                {
                    warn!(
                        service = %self.service,
                        calls,
                        failures,
                        "circuit breaker opened"
                    );
                    *state = CircuitState::Open { opened_at: now };
                }
            }
            (
                CircuitState::HalfOpen {
                    active_requests,
                    successful_requests,
                },
                CircuitAttemptKind::HalfOpen,
            ) => {
                *active_requests = active_requests.saturating_sub(1);
                if failed {
                    warn!(service = %self.service, "circuit breaker probe failed, reopening");
                    *state = CircuitState::Open { opened_at: now };
                    return;
                }
                *successful_requests = successful_requests.saturating_add(1);
                if *successful_requests >= self.policy.half_open_success_threshold.max(1) {
                    info!(service = %self.service, "circuit breaker closed");
                    *state = CircuitState::closed();
                }
            }
            _ => {}
        }
    }

    fn release(&self, kind: CircuitAttemptKind) {
        if kind != CircuitAttemptKind::HalfOpen {
            return;
        }
        let mut state = lock_unpoisoned(&self.state);
        if let CircuitState::HalfOpen {
            active_requests, ..
        } = &mut *state
        {
            *active_requests = active_requests.saturating_sub(1);
        }
    }
}

/// Ticket for one admitted attempt. Dropping it without an outcome records nothing.
pub(crate) struct CircuitAttempt {
    breaker: Arc<CircuitBreaker>,
    kind: CircuitAttemptKind,
    completed: bool,
}

impl CircuitAttempt {
    pub(crate) fn mark_success(mut self) {
        self.breaker.record(self.kind, false);
        self.completed = true;
    }

    pub(crate) fn mark_failure(mut self) {
        self.breaker.record(self.kind, true);
        self.completed = true;
    }

    pub(crate) fn finish(self, error: Option<&Error>) {
        match error.map(counts_as_failure) {
            None | Some(Some(false)) => self.mark_success(),
            Some(Some(true)) => self.mark_failure(),
            Some(None) => drop(self),
        }
    }
}

impl Drop for CircuitAttempt {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.release(self.kind);
            self.completed = true;
        }
    }
}

/// `Some(true)` for outcomes that indicate an unhealthy service, `None` when the
/// attempt never reached a verdict.
pub(crate) fn counts_as_failure(error: &Error) -> Option<bool> {
    match error {
        Error::Transport { kind, .. } => Some(*kind != TransportErrorKind::Tls),
        Error::Timeout { .. } | Error::ReadBody { .. } => Some(true),
        Error::Service(service_error) => {
            let status = service_error.status().as_u16();
            Some(status == 429 || status >= 500 || service_error.is_incorrect_state())
        }
        Error::Cancelled { .. } | Error::DeadlineExceeded { .. } => None,
        _ => Some(false),
    }
}

/// Breakers keyed by service name, shared across the clients built with the same registry.
#[derive(Clone, Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

static PROCESS_REGISTRY: OnceLock<CircuitBreakerRegistry> = OnceLock::new();

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One registry for the whole process, created on first use. Clients only
    /// join it when it is passed to their builder.
    pub fn process() -> Self {
        PROCESS_REGISTRY.get_or_init(Self::default).clone()
    }

    /// Returns the breaker for `service`, creating it with `policy` on first use.
    pub fn breaker(&self, service: &str, policy: CircuitBreakerPolicy) -> Arc<CircuitBreaker> {
        let mut breakers = lock_unpoisoned(&self.breakers);
        Arc::clone(
            breakers
                .entry(service.to_owned())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(service, policy))),
        )
    }

    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        lock_unpoisoned(&self.breakers).get(service).cloned()
    }
}
