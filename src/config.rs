//! Session configuration parsed from environment variables.

use crate::error::SessionError;
use crate::paths::{DEFAULT_PUBLIC_PATHS, PublicPathMatcher};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Paths of the authentication API, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub me: String,
    pub refresh: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".into(),
            register: "/api/auth/register".into(),
            logout: "/api/auth/logout".into(),
            me: "/api/auth/me".into(),
            refresh: "/api/auth/refresh".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Scheme + host (+ optional prefix), without a trailing slash.
    pub base_url: String,
    pub endpoints: AuthEndpoints,
    pub public_paths: Vec<String>,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Default endpoints, public paths and timeouts against `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            endpoints: AuthEndpoints::default(),
            public_paths: default_public_paths(),
            timeouts: Timeouts::default(),
        }
    }

    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `AUTH_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `AUTH_PUBLIC_PATHS`: comma-separated substrings, default login/register/refresh paths
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30, unparsable or zero uses the default
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10, same fallback
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the base URL is not http(s) or the public path
    /// list is set but contains no usable entries.
    pub fn from_env() -> Result<Self, SessionError> {
        let base_url = parse_base_url(std::env::var("AUTH_BASE_URL").ok().as_deref())?;
        let public_paths = parse_public_paths(std::env::var("AUTH_PUBLIC_PATHS").ok().as_deref())?;
        let timeouts = Timeouts {
            request_secs: env_parse_timeout("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_timeout("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, endpoints: AuthEndpoints::default(), public_paths, timeouts })
    }

    /// Replace the base URL, e.g. from a CLI flag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the URL is not http(s).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, SessionError> {
        self.base_url = parse_base_url(Some(base_url))?;
        Ok(self)
    }

    #[must_use]
    pub fn matcher(&self) -> PublicPathMatcher {
        PublicPathMatcher::new(self.public_paths.iter().cloned())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn default_public_paths() -> Vec<String> {
    DEFAULT_PUBLIC_PATHS.iter().map(|p| (*p).to_owned()).collect()
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn parse_base_url(raw: Option<&str>) -> Result<String, SessionError> {
    let url = normalize_base_url(raw.unwrap_or(DEFAULT_BASE_URL));
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(SessionError::ConfigParse(format!("AUTH_BASE_URL must be http(s): {url}")))
    }
}

fn parse_public_paths(raw: Option<&str>) -> Result<Vec<String>, SessionError> {
    let Some(raw) = raw else {
        return Ok(default_public_paths());
    };
    let paths: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();
    if paths.is_empty() {
        return Err(SessionError::ConfigParse("AUTH_PUBLIC_PATHS has no entries".into()));
    }
    Ok(paths)
}

/// Unparsable and zero values fall back to `default`; a zero timeout would
/// fail every request immediately.
fn env_parse_timeout(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
