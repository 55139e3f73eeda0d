use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};

use crate::error::{Error, TransportErrorKind};

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn read_unpoisoned<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn write_unpoisoned<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    if error.is_connect() {
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    let text = error.to_string().to_ascii_lowercase();
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("connection closed")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("incomplete message")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

pub(crate) fn parse_header_name(operation: &str, name: &str) -> Result<HeaderName, Error> {
    name.parse().map_err(|source: http::header::InvalidHeaderName| Error::RequestBinding {
        operation: operation.to_owned(),
        message: format!("invalid header name {name}: {source}"),
    })
}

pub(crate) fn parse_header_value(
    operation: &str,
    name: &str,
    value: &str,
) -> Result<HeaderValue, Error> {
    value
        .parse()
        .map_err(|source: http::header::InvalidHeaderValue| Error::RequestBinding {
            operation: operation.to_owned(),
            message: format!("invalid value for header {name}: {source}"),
        })
}

/// Time left for one attempt, bounded by the overall deadline.
pub(crate) fn phase_timeout(
    per_attempt_timeout: Duration,
    deadline: Option<Instant>,
) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(per_attempt_timeout);
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return None;
    }
    Some(per_attempt_timeout.min(remaining))
}

/// Returns `None` when sleeping for `retry_delay` would run past the deadline.
pub(crate) fn bounded_retry_delay(
    retry_delay: Duration,
    deadline: Option<Instant>,
) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(retry_delay);
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    if retry_delay >= remaining {
        return None;
    }
    Some(retry_delay)
}

pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let raw_value = value.to_str().ok()?.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    match date.duration_since(now) {
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}

pub(crate) fn rfc3339_millis_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant, SystemTime};

    use http::HeaderMap;
    use http::header::{HeaderValue, RETRY_AFTER};

    use super::{bounded_retry_delay, parse_retry_after, phase_timeout, redact_uri_for_logs, truncate_body};

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(
            parse_retry_after(&headers, SystemTime::now()),
            Some(Duration::from_secs(3))
        );

        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let later = httpdate::fmt_http_date(now + Duration::from_secs(7));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_str(&later).expect("valid header value"),
        );
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::from_secs(7)));
    }

    #[test]
    fn phase_timeout_is_capped_by_remaining_deadline() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let timeout = phase_timeout(Duration::from_secs(10), Some(deadline))
            .expect("deadline not yet reached");
        assert!(timeout <= Duration::from_millis(50));
        assert_eq!(phase_timeout(Duration::from_secs(1), Some(Instant::now())), None);
        assert_eq!(
            phase_timeout(Duration::from_secs(1), None),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn retry_delay_longer_than_remaining_budget_is_refused() {
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(bounded_retry_delay(Duration::from_secs(5), Some(deadline)), None);
        assert_eq!(
            bounded_retry_delay(Duration::from_millis(5), None),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn redaction_strips_query_and_credentials() {
        assert_eq!(
            redact_uri_for_logs("https://user:pw@iaas.example.com/20160918/volumes?page=abc"),
            "https://iaas.example.com/20160918/volumes"
        );
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = vec![b'a'; 4096];
        assert!(truncate_body(&body).ends_with("...(truncated)"));
    }
}
