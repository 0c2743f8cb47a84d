use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::{ErrorKind, Result};

/// Default URL requested through every endpoint
pub const DEFAULT_TARGET_URL: &str = "https://httpbin.org/ip";

/// Default timeout of a single probe request
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default latency above which a healthy endpoint counts as slow
const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(2000);

/// Upper bound for the number of attempts per endpoint
pub const MAX_ATTEMPTS: u32 = 5;

/// How to decide whether an endpoint is usable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckOptions {
    /// URL requested through the endpoint
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Timeout of each request
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Requests per endpoint before giving up (1 to 5)
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Response codes which count as healthy
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,

    /// Healthy endpoints slower than this are marked `slow`
    #[serde(default = "default_slow_threshold", with = "humantime_serde")]
    pub slow_threshold: Duration,

    /// Whether to follow redirects from the target
    #[serde(default = "default_allow_redirects")]
    pub allow_redirects: bool,

    /// Extra headers sent with every probe request
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    #[serde(serialize_with = "serialize_headers")]
    pub headers: HeaderMap,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            timeout: DEFAULT_TIMEOUT,
            attempts: default_attempts(),
            expected_status_codes: default_expected_status_codes(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            allow_redirects: default_allow_redirects(),
            headers: HeaderMap::new(),
        }
    }
}

fn default_target_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_attempts() -> u32 {
    1
}

fn default_expected_status_codes() -> Vec<u16> {
    vec![200]
}

const fn default_slow_threshold() -> Duration {
    DEFAULT_SLOW_THRESHOLD
}

const fn default_allow_redirects() -> bool {
    true
}

impl HealthCheckOptions {
    /// Check that the options can be used
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidHealthCheckOptions`] if the target is not
    /// an HTTP(S) URL, the timeout is zero, the attempts are out of range or
    /// no status code is accepted.
    pub fn validate(&self) -> Result<()> {
        let target = Url::parse(&self.target_url).map_err(|e| {
            ErrorKind::InvalidHealthCheckOptions(format!(
                "invalid target URL `{}`: {e}",
                self.target_url
            ))
        })?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ErrorKind::InvalidHealthCheckOptions(format!(
                "target URL must use http or https, got `{}`",
                target.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(ErrorKind::InvalidHealthCheckOptions(
                "timeout must be greater than zero".into(),
            ));
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.attempts) {
            return Err(ErrorKind::InvalidHealthCheckOptions(format!(
                "attempts must be between 1 and {MAX_ATTEMPTS}, got {}",
                self.attempts
            )));
        }
        if self.expected_status_codes.is_empty() {
            return Err(ErrorKind::InvalidHealthCheckOptions(
                "at least one expected status code is required".into(),
            ));
        }
        Ok(())
    }

    /// Whether a response code counts as healthy
    #[must_use]
    pub fn is_expected(&self, status: u16) -> bool {
        self.expected_status_codes.contains(&status)
    }
}

/// Custom deserializer for headers from TOML config format
fn deserialize_headers<'de, D>(deserializer: D) -> std::result::Result<HeaderMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    let mut header_map = HeaderMap::new();

    for (name, value) in map {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("Invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(&value).map_err(|e| {
            serde::de::Error::custom(format!("Invalid header value '{value}': {e}"))
        })?;
        header_map.insert(header_name, header_value);
    }

    Ok(header_map)
}

/// Custom serializer for headers to TOML config format
fn serialize_headers<S>(headers: &HeaderMap, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let map: HashMap<String, String> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
        .collect();
    map.serialize(serializer)
}
