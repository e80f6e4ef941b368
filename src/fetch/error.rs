//! Error types for the fetch module.
//!
//! Every acquisition path (primary feed, mirror fan-out, instance-list
//! resolution) reports through [`FetchError`] so the orchestrator can
//! collect, compare and aggregate branch failures uniformly.

use thiserror::Error;

/// Errors that can occur while acquiring the announcement feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded or has an unexpected shape.
    #[error("invalid body from {url}: {reason}")]
    InvalidBody {
        /// The URL that produced the body.
        url: String,
        /// What made the body unusable.
        reason: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("HTTP client construction failed: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The mirror source is disabled by configuration.
    #[error("mirror source is disabled by configuration")]
    MirrorDisabled,

    /// The mirror instance list document is too old to trust.
    #[error("mirror instance list is outdated (updated: {updated:?})")]
    OutdatedInstanceList {
        /// The document's `updated` field as received.
        updated: String,
    },

    /// The operation was cancelled before completion.
    #[error("fetch cancelled")]
    Cancelled,

    /// Several branches failed with distinct errors.
    #[error("{} fetch branches failed: {}", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<FetchError>),
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid-body error.
    pub fn invalid_body(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBody {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an outdated-instance-list error.
    pub fn outdated_instance_list(updated: impl Into<String>) -> Self {
        Self::OutdatedInstanceList {
            updated: updated.into(),
        }
    }

    /// Folds collected branch errors into a single error: one error stays
    /// itself, several become [`FetchError::Aggregate`]. `None` when the
    /// collection is empty.
    #[must_use]
    pub fn from_collected(mut errors: Vec<FetchError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }
}

fn format_aggregate(errors: &[FetchError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// Note on From trait implementations:
// No `From<reqwest::Error>` on purpose: every variant carries the URL it
// failed on, which the source error does not reliably provide. The helper
// constructors keep that context mandatory at the call site.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = FetchError::http_status("https://example.com/user/x.json", 429);
        let msg = error.to_string();
        assert!(msg.contains("429"), "Expected '429' in: {msg}");
        assert!(msg.contains("user/x.json"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_invalid_body_display() {
        let error = FetchError::invalid_body("https://example.com/feed", "not a Listing");
        let msg = error.to_string();
        assert!(msg.contains("not a Listing"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_outdated_instance_list_display() {
        let error = FetchError::outdated_instance_list("2019-01-01");
        assert!(error.to_string().contains("2019-01-01"));
    }

    #[test]
    fn test_from_collected_empty() {
        assert!(FetchError::from_collected(Vec::new()).is_none());
    }

    #[test]
    fn test_from_collected_single_stays_itself() {
        let folded =
            FetchError::from_collected(vec![FetchError::http_status("https://a", 500)]).unwrap();
        assert!(matches!(folded, FetchError::HttpStatus { status: 500, .. }));
    }

    #[test]
    fn test_from_collected_several_aggregate() {
        let folded = FetchError::from_collected(vec![
            FetchError::http_status("https://a", 500),
            FetchError::Cancelled,
        ])
        .unwrap();
        match folded {
            FetchError::Aggregate(inner) => assert_eq!(inner.len(), 2),
            other => panic!("expected aggregate, got {other}"),
        }
        let msg = FetchError::Aggregate(vec![
            FetchError::http_status("https://a", 500),
            FetchError::Cancelled,
        ])
        .to_string();
        assert!(msg.contains("2 fetch branches failed"), "got: {msg}");
        assert!(msg.contains("cancelled"), "got: {msg}");
    }
}
