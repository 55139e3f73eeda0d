use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::Error;
use crate::util::lock_unpoisoned;

/// Point-in-time counters of one [`ServiceClient`](crate::ServiceClient) and its clones.
#[derive(Clone, Debug, Default)]
pub struct ClientMetricsSnapshot {
    pub calls_started: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub attempts: u64,
    pub retries: u64,
    pub circuit_open_rejections: u64,
    pub in_flight: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    /// Final HTTP status of completed calls.
    pub status_counts: BTreeMap<u16, u64>,
    /// Keyed by [`ErrorCode::as_str`](crate::ErrorCode::as_str).
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ClientMetrics {
    inner: Arc<ClientMetricsInner>,
}

#[derive(Debug, Default)]
struct ClientMetricsInner {
    calls_started: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    circuit_open_rejections: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: ClientMetrics,
}

impl ClientMetrics {
    pub(crate) fn record_call_started(&self) -> InFlightGuard {
        self.inner.calls_started.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_call_succeeded(&self, status: u16, latency: Duration) {
        self.inner.calls_succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_status_count(status);
        self.record_latency(latency);
    }

    pub(crate) fn record_call_failed(&self, error: &Error, latency: Duration) {
        self.inner.calls_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        if let Error::CircuitOpen { .. } = error {
            self.inner
                .circuit_open_rejections
                .fetch_add(1, Ordering::Relaxed);
        }
        if let Some(status) = error.status() {
            self.add_status_count(status.as_u16());
        }
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts
            .entry(error.code().as_str().to_owned())
            .or_insert(0) += 1;
    }

    pub(crate) fn snapshot(&self) -> ClientMetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        ClientMetricsSnapshot {
            calls_started: self.inner.calls_started.load(Ordering::Relaxed),
            calls_succeeded: self.inner.calls_succeeded.load(Ordering::Relaxed),
            calls_failed: self.inner.calls_failed.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            circuit_open_rejections: self.inner.circuit_open_rejections.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }

    fn record_latency(&self, latency: Duration) {
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.inner.latency_total_ms.fetch_add(
            latency.as_millis().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );
    }

    fn add_status_count(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientMetrics;
    use crate::error::Error;

    #[test]
    fn snapshot_tracks_calls_attempts_and_error_codes() {
        let metrics = ClientMetrics::default();
        {
            let _guard = metrics.record_call_started();
            assert_eq!(metrics.snapshot().in_flight, 1);
            metrics.record_attempt();
            metrics.record_retry();
            metrics.record_attempt();
            metrics.record_call_succeeded(200, Duration::from_millis(10));
        }
        let _guard = metrics.record_call_started();
        metrics.record_call_failed(
            &Error::CircuitOpen {
                service: "Blockstorage".to_owned(),
                operation: "GetVolume".to_owned(),
                retry_after_ms: Some(100),
            },
            Duration::from_millis(30),
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls_started, 2);
        assert_eq!(snapshot.calls_succeeded, 1);
        assert_eq!(snapshot.calls_failed, 1);
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.circuit_open_rejections, 1);
        assert_eq!(snapshot.in_flight, 1);
        assert_eq!(snapshot.status_counts.get(&200), Some(&1));
        assert_eq!(snapshot.error_counts.get("circuit_open"), Some(&1));
        assert!((snapshot.latency_avg_ms - 20.0).abs() < f64::EPSILON);
    }
}
