use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use rand::RngExt;

use crate::error::{Error, INCORRECT_STATE_CODE, TimeoutPhase, TransportErrorKind};

/// Outcome of one failed attempt, as seen by the retry predicate.
#[derive(Clone, Debug)]
pub struct RetryDecision {
    pub attempt: usize,
    pub max_attempts: usize,
    pub operation: String,
    pub status: Option<StatusCode>,
    pub service_code: Option<String>,
    pub transport_error_kind: Option<TransportErrorKind>,
    pub timeout_phase: Option<TimeoutPhase>,
    pub response_body_read_error: bool,
}

impl RetryDecision {
    pub(crate) fn for_error(
        error: &Error,
        attempt: usize,
        max_attempts: usize,
        operation: &str,
    ) -> Self {
        let mut decision = Self {
            attempt,
            max_attempts,
            operation: operation.to_owned(),
            status: None,
            service_code: None,
            transport_error_kind: None,
            timeout_phase: None,
            response_body_read_error: false,
        };
        match error {
            Error::Service(service_error) => {
                decision.status = Some(service_error.status());
                decision.service_code = Some(service_error.code().to_owned());
            }
            Error::Transport { kind, .. } => decision.transport_error_kind = Some(*kind),
            Error::Timeout { phase, .. } => decision.timeout_phase = Some(*phase),
            Error::ReadBody { .. } => decision.response_body_read_error = true,
            _ => {}
        }
        decision
    }
}

/// Replaces the built-in retry predicate of a [`RetryPolicy`].
pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, decision: &RetryDecision) -> bool;
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    retryable_status_codes: BTreeSet<u16>,
    retryable_service_errors: BTreeSet<(u16, String)>,
    retryable_transport_error_kinds: BTreeSet<TransportErrorKind>,
    retryable_timeout_phases: BTreeSet<TimeoutPhase>,
    retry_on_response_body_read_error: bool,
    retry_classifier: Option<Arc<dyn RetryClassifier>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff", &self.base_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("retryable_service_errors", &self.retryable_service_errors)
            .field(
                "retryable_transport_error_kinds",
                &self.retryable_transport_error_kinds,
            )
            .field("retryable_timeout_phases", &self.retryable_timeout_phases)
            .field(
                "retry_on_response_body_read_error",
                &self.retry_on_response_body_read_error,
            )
            .field("retry_classifier", &self.retry_classifier.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Single attempt; the fallback when nothing else configures retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::standard()
        }
    }

    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_ratio: 0.5,
            retryable_status_codes: default_retryable_status_codes(),
            retryable_service_errors: default_retryable_service_errors(),
            retryable_transport_error_kinds: default_retryable_transport_error_kinds(),
            retryable_timeout_phases: default_retryable_timeout_phases(),
            retry_on_response_body_read_error: true,
            retry_classifier: None,
        }
    }

    /// The SDK-wide default schedule: 8 attempts, exponential from 1s, capped at 30s.
    pub fn sdk_default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            ..Self::standard()
        }
    }

    /// `0` and `1` both mean a single attempt.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff.max(Duration::from_millis(1));
        if self.max_backoff < self.base_backoff {
            self.max_backoff = self.base_backoff;
        }
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_backoff);
        self
    }

    /// Share of each exponential step that is randomized. The delay is drawn from
    /// `[step * (1 - ratio), step]`; `0.5` is equal jitter and the preset default.
    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Status and service error code pairs retried regardless of the status set.
    pub fn retryable_service_errors<C>(mut self, errors: impl IntoIterator<Item = (u16, C)>) -> Self
    where
        C: Into<String>,
    {
        self.retryable_service_errors = errors
            .into_iter()
            .map(|(status, code)| (status, code.into()))
            .collect();
        self
    }

    pub fn retryable_transport_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_transport_error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn retryable_timeout_phases(
        mut self,
        phases: impl IntoIterator<Item = TimeoutPhase>,
    ) -> Self {
        self.retryable_timeout_phases = phases.into_iter().collect();
        self
    }

    pub fn retry_on_response_body_read_error(mut self, retry: bool) -> Self {
        self.retry_on_response_body_read_error = retry;
        self
    }

    pub fn retry_classifier(mut self, retry_classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retry_classifier = Some(retry_classifier);
        self
    }

    pub fn configured_max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn configured_base_backoff(&self) -> Duration {
        self.base_backoff
    }

    pub fn configured_max_backoff(&self) -> Duration {
        self.max_backoff
    }

    pub(crate) fn should_retry_decision(&self, decision: &RetryDecision) -> bool {
        if let Some(retry_classifier) = &self.retry_classifier {
            return retry_classifier.should_retry(decision);
        }
        if let Some(status) = decision.status {
            if let Some(code) = &decision.service_code
                && self
                    .retryable_service_errors
                    .contains(&(status.as_u16(), code.clone()))
            {
                return true;
            }
            return self.retryable_status_codes.contains(&status.as_u16());
        }
        if let Some(kind) = decision.transport_error_kind {
            return self.retryable_transport_error_kinds.contains(&kind);
        }
        if let Some(phase) = decision.timeout_phase {
            return self.retryable_timeout_phases.contains(&phase);
        }
        if decision.response_body_read_error {
            return self.retry_on_response_body_read_error;
        }
        false
    }

    /// Delay before retry number `retry_index` (1-based).
    pub(crate) fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        let capped_exponent = retry_index.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base_backoff.as_millis().max(1);
        let max_ms = self.max_backoff.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round() as u64;
        let low = backoff_ms.saturating_sub(jitter_span.min(backoff_ms));
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(low..=backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [408_u16, 429, 500, 502, 503, 504].into_iter().collect()
}

fn default_retryable_service_errors() -> BTreeSet<(u16, String)> {
    [(409_u16, INCORRECT_STATE_CODE.to_owned())]
        .into_iter()
        .collect()
}

fn default_retryable_transport_error_kinds() -> BTreeSet<TransportErrorKind> {
    [
        TransportErrorKind::Dns,
        TransportErrorKind::Connect,
        TransportErrorKind::Read,
    ]
    .into_iter()
    .collect()
}

fn default_retryable_timeout_phases() -> BTreeSet<TimeoutPhase> {
    [TimeoutPhase::Transport, TimeoutPhase::ResponseBody]
        .into_iter()
        .collect()
}
