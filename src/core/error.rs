//! Error kinds shared by the fetchers and the configuration loaders.

use thiserror::Error;

/// A per-item failure from one of the upstream fetchers.
///
/// These never abort a refresh cycle; the affected tile shows the error
/// while every other tile updates normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error for {target}: {message}")]
    Network { target: String, message: String },

    #[error("HTTP error {status} for {target}")]
    Http { target: String, status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response for {target}: {message}")]
    Malformed { target: String, message: String },
}

impl FetchError {
    pub fn network(target: &str, err: impl std::fmt::Display) -> Self {
        FetchError::Network {
            target: target.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(target: &str, err: impl std::fmt::Display) -> Self {
        FetchError::Malformed {
            target: target.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::NotFound(_) | FetchError::Malformed { .. } => false,
        }
    }
}

/// A configuration entry that was rejected at load time and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Skipping alert rule '{id}': {reason}")]
    InvalidAlertRule { id: String, reason: String },

    #[error("Skipping portfolio entry #{index}: {reason}")]
    InvalidPosition { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::network("AAPL", "connection reset").is_transient());
        assert!(
            FetchError::Http {
                target: "AAPL".into(),
                status: 503
            }
            .is_transient()
        );
        assert!(
            !FetchError::Http {
                target: "AAPL".into(),
                status: 404
            }
            .is_transient()
        );
        assert!(!FetchError::NotFound("XYZ".into()).is_transient());
        assert!(!FetchError::malformed("AAPL", "missing field").is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = FetchError::Http {
            target: "USDEUR".into(),
            status: 500,
        };
        assert_eq!(err.to_string(), "HTTP error 500 for USDEUR");

        let err = ConfigError::InvalidAlertRule {
            id: "btc-high".into(),
            reason: "threshold must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "Skipping alert rule 'btc-high': threshold must be positive"
        );
    }
}
