//! # Origin Policy
//!
//! Browser clients send an `Origin` header with the WebSocket upgrade. The
//! policy accepts an upgrade when:
//! 1. there is no `Origin` header (non-browser clients), or
//! 2. the origin authority equals the request's `Host`, or
//! 3. the origin authority (`host[:port]`) matches one of the configured glob
//!    patterns, compared case-insensitively (`"*"` allows everything).
//!
//! Opaque origins such as `null` (sandboxed iframes, `file://` pages) have no
//! authority and are matched as the empty string.

use crate::error::AppError;
use actix_web::http::Uri;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

#[derive(Debug, Clone)]
pub struct OriginPolicy {
    patterns: GlobSet,
}

impl OriginPolicy {
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
        }
        Ok(Self {
            patterns: builder.build()?,
        })
    }

    /// Decide whether an upgrade with this `Origin` / `Host` pair may proceed.
    pub fn check(&self, origin: Option<&str>, host: Option<&str>) -> Result<(), AppError> {
        let Some(origin) = origin.filter(|o| !o.is_empty()) else {
            return Ok(());
        };

        let uri: Uri = origin
            .parse()
            .map_err(|_| AppError::BadRequest(format!("invalid Origin header: {}", origin)))?;
        let authority = match (uri.scheme(), uri.authority()) {
            (Some(_), Some(authority)) => authority.as_str(),
            _ => "",
        };

        if host.is_some_and(|h| h.eq_ignore_ascii_case(authority)) {
            return Ok(());
        }

        if self.patterns.is_match(authority) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "origin {} is not in the allowed origin patterns",
            origin
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str]) -> OriginPolicy {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        OriginPolicy::new(&patterns).unwrap()
    }

    #[test]
    fn test_wildcard_allows_any_origin() {
        let policy = policy(&["*"]);
        assert!(policy.check(Some("https://anything.example"), Some("api.local")).is_ok());
    }

    #[test]
    fn test_missing_origin_and_same_host_are_allowed() {
        let policy = policy(&[]);
        assert!(policy.check(None, Some("api.local")).is_ok());
        assert!(policy.check(Some("http://API.local:9000"), Some("api.local:9000")).is_ok());
    }

    #[test]
    fn test_patterns_match_origin_authority() {
        let policy = policy(&["*.example.com", "localhost:*"]);

        assert!(policy.check(Some("https://app.Example.com"), None).is_ok());
        assert!(policy.check(Some("http://localhost:5173"), None).is_ok());
        assert!(matches!(
            policy.check(Some("https://evil.test"), Some("api.local")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_opaque_origin_matches_as_empty_authority() {
        let open = policy(&["*"]);
        assert!(open.check(Some("null"), Some("api.local")).is_ok());

        let strict = policy(&["*.example.com"]);
        assert!(matches!(
            strict.check(Some("null"), Some("api.local")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_unparseable_origin_is_a_bad_request() {
        let policy = policy(&["*"]);
        assert!(matches!(
            policy.check(Some("http://exa mple.com"), None),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        assert!(OriginPolicy::new(&["[unclosed".to_string()]).is_err());
    }
}
