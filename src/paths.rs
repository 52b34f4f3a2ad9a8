//! Public-path matching.
//!
//! A 401 from a public endpoint (login, registration, the refresh call
//! itself) must never start a refresh: those endpoints do not expect a valid
//! session, and refreshing on a failed refresh would recurse.

/// Default substrings identifying endpoints that bypass refresh handling.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/register", "/login", "/auth/register", "/auth/login", "/auth/refresh"];

/// Substring predicate over request paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicPathMatcher {
    patterns: Vec<String>,
}

impl PublicPathMatcher {
    /// Build a matcher from substrings. Empty patterns are dropped, since an
    /// empty substring would match every path.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    /// True when the path portion of `path` (query string excluded) contains
    /// any configured pattern.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PublicPathMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_PATHS.iter().copied())
    }
}

#[cfg(test)]
#[path = "paths_test.rs"]
mod tests;
