//! Process-level defaults: environment variables and the global retry override.
//!
//! Nothing here is read implicitly at call time except the global retry
//! override, which callers set and clear explicitly.

use std::sync::RwLock;
use std::time::Duration;

use tracing::warn;

use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::retry::RetryPolicy;
use crate::util::{read_unpoisoned, write_unpoisoned};

pub const CIRCUIT_BREAKER_ENABLED_ENV: &str = "OCI_SDK_DEFAULT_CIRCUITBREAKER_ENABLED";
pub const CIRCUIT_BREAKER_SETTINGS_ENV: &str = "OCI_SDK_CIRCUITBREAKER_SETTINGS";
pub const RETRY_ENABLED_ENV: &str = "OCI_SDK_DEFAULT_RETRY_ENABLED";
pub const RETRY_POLICY_ENV: &str = "OCI_SDK_DEFAULT_RETRY_POLICY";

static GLOBAL_RETRY_POLICY: RwLock<Option<RetryPolicy>> = RwLock::new(None);

/// Installs a retry policy used by every client that has none of its own.
pub fn set_global_retry_policy(policy: RetryPolicy) {
    *write_unpoisoned(&GLOBAL_RETRY_POLICY) = Some(policy);
}

pub fn clear_global_retry_policy() {
    *write_unpoisoned(&GLOBAL_RETRY_POLICY) = None;
}

pub fn global_retry_policy() -> Option<RetryPolicy> {
    read_unpoisoned(&GLOBAL_RETRY_POLICY).clone()
}

#[derive(Clone, Debug, Default)]
pub struct SdkEnvironment {
    circuit_breaker_enabled: Option<bool>,
    circuit_breaker_settings: Vec<(String, String)>,
    default_retry: Option<RetryPolicy>,
}

impl SdkEnvironment {
    /// An environment with no overrides at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let circuit_breaker_enabled = lookup(CIRCUIT_BREAKER_ENABLED_ENV)
            .and_then(|raw| parse_bool(CIRCUIT_BREAKER_ENABLED_ENV, &raw));
        let circuit_breaker_settings = lookup(CIRCUIT_BREAKER_SETTINGS_ENV)
            .map(|raw| parse_settings(&raw))
            .unwrap_or_default();
        let retry_enabled = lookup(RETRY_ENABLED_ENV)
            .and_then(|raw| parse_bool(RETRY_ENABLED_ENV, &raw));
        let retry_settings = lookup(RETRY_POLICY_ENV).map(|raw| parse_settings(&raw));
        // An explicit `false` wins; otherwise either variable turns the default on.
        let default_retry = match (retry_enabled, retry_settings) {
            (Some(false), _) | (None, None) => None,
            (_, settings) => Some(apply_retry_settings(
                RetryPolicy::sdk_default(),
                &settings.unwrap_or_default(),
            )),
        };

        Self {
            circuit_breaker_enabled,
            circuit_breaker_settings,
            default_retry,
        }
    }

    pub fn circuit_breaker_enabled(&self) -> Option<bool> {
        self.circuit_breaker_enabled
    }

    /// Retry policy used when neither the request, the client nor the global override set one.
    pub fn default_retry_policy(&self) -> Option<&RetryPolicy> {
        self.default_retry.as_ref()
    }

    pub(crate) fn apply_circuit_breaker(&self, mut policy: CircuitBreakerPolicy) -> CircuitBreakerPolicy {
        for (key, value) in &self.circuit_breaker_settings {
            policy = match key.as_str() {
                "failure_rate" => match value.parse::<f64>() {
                    Ok(rate) => policy.failure_rate_threshold(rate),
                    Err(_) => ignore_setting(CIRCUIT_BREAKER_SETTINGS_ENV, key, value, policy),
                },
                "minimum_calls" => match value.parse::<usize>() {
                    Ok(calls) => policy.minimum_calls(calls),
                    Err(_) => ignore_setting(CIRCUIT_BREAKER_SETTINGS_ENV, key, value, policy),
                },
                "window_secs" => match value.parse::<u64>() {
                    Ok(secs) => policy.window(Duration::from_secs(secs)),
                    Err(_) => ignore_setting(CIRCUIT_BREAKER_SETTINGS_ENV, key, value, policy),
                },
                "reset_timeout_secs" => match value.parse::<u64>() {
                    Ok(secs) => policy.reset_timeout(Duration::from_secs(secs)),
                    Err(_) => ignore_setting(CIRCUIT_BREAKER_SETTINGS_ENV, key, value, policy),
                },
                _ => ignore_setting(CIRCUIT_BREAKER_SETTINGS_ENV, key, value, policy),
            };
        }
        policy
    }
}

fn apply_retry_settings(mut policy: RetryPolicy, settings: &[(String, String)]) -> RetryPolicy {
    for (key, value) in settings {
        policy = match key.as_str() {
            "max_attempts" => match value.parse::<usize>() {
                Ok(attempts) => policy.max_attempts(attempts),
                Err(_) => ignore_setting(RETRY_POLICY_ENV, key, value, policy),
            },
            "base_ms" => match value.parse::<u64>() {
                Ok(ms) => policy.base_backoff(Duration::from_millis(ms)),
                Err(_) => ignore_setting(RETRY_POLICY_ENV, key, value, policy),
            },
            "max_ms" => match value.parse::<u64>() {
                Ok(ms) => policy.max_backoff(Duration::from_millis(ms)),
                Err(_) => ignore_setting(RETRY_POLICY_ENV, key, value, policy),
            },
            _ => ignore_setting(RETRY_POLICY_ENV, key, value, policy),
        };
    }
    policy
}

fn ignore_setting<T>(variable: &str, key: &str, value: &str, unchanged: T) -> T {
    warn!(variable, key, value, "ignoring unrecognized environment setting");
    unchanged
}

fn parse_bool(variable: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => {
            warn!(variable, value = raw, "ignoring non-boolean environment value");
            None
        }
    }
}

fn parse_settings(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_ascii_lowercase(), value.trim().to_owned()))
        })
        .collect()
}
