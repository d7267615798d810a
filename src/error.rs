//! Error types for upstream fetch tiers.

use thiserror::Error;

/// Why a single fetch tier failed.
///
/// These never escape a handler: the tier runner moves on to the next tier and
/// the last error only survives as the diagnostic string of a failure result.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("upstream timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid upstream response: {0}")]
    Decode(String),

    #[error("upstream response is missing {0}")]
    Missing(&'static str),

    #[error("{0}")]
    Upstream(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result alias for fetch tiers.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_diagnostic() {
        assert_eq!(
            FetchError::Status { status: 503 }.to_string(),
            "upstream returned HTTP 503"
        );
        assert_eq!(
            FetchError::Missing("video id").to_string(),
            "upstream response is missing video id"
        );
        assert_eq!(FetchError::Upstream("tombstone".into()).to_string(), "tombstone");
    }

    #[test]
    fn json_errors_become_decode() {
        let err: FetchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
