use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `moex-data`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum MoexError {
    #[error("ticker is required")]
    MissingTicker,

    #[error("authorization failed with HTTP {status} for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to decode ISS response: {0}")]
    Decode(String),

    #[error("no active futures contract found for underlying: {0}")]
    UnknownUnderlying(String),
}

impl MoexError {
    /// Determine if the error was caused by rejected credentials (HTTP 401 / 403).
    pub fn is_auth(&self) -> bool {
        matches!(self, MoexError::Unauthorized { .. })
    }

    /// Determine if the error was raised at the page-fetch boundary, in which case a paginated
    /// run terminates with partial data rather than propagating it.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transport(&self) -> bool {
        match self {
            MoexError::Unauthorized { .. }
            | MoexError::Status { .. }
            | MoexError::Request(_)
            | MoexError::Decode(_) => true,
            _ => false,
        }
    }

    /// HTTP status code associated with the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            MoexError::Unauthorized { status, .. } | MoexError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// URL of the request that produced the error, when known.
    pub fn url(&self) -> Option<&str> {
        match self {
            MoexError::Unauthorized { url, .. } | MoexError::Status { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Classify a non-2xx HTTP status received from `url`.
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            401 | 403 => MoexError::Unauthorized { status, url },
            _ => MoexError::Status { status, url },
        }
    }
}

impl From<reqwest::Error> for MoexError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::from_status(
                status.as_u16(),
                value.url().map(|url| url.to_string()).unwrap_or_default(),
            ),
            None if value.is_decode() => Self::Decode(value.to_string()),
            None => Self::Request(value.to_string()),
        }
    }
}

impl From<url::ParseError> for MoexError {
    fn from(value: url::ParseError) -> Self {
        Self::Request(format!("invalid ISS url: {value}"))
    }
}

impl From<serde_json::Error> for MoexError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moex_error_from_status() {
        struct TestCase {
            status: u16,
            expected_auth: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: 401 is an auth failure
                status: 401,
                expected_auth: true,
            },
            TestCase {
                // TC1: 403 is an auth failure
                status: 403,
                expected_auth: true,
            },
            TestCase {
                // TC2: 500 is a plain status error
                status: 500,
                expected_auth: false,
            },
            TestCase {
                // TC3: 429 is a plain status error
                status: 429,
                expected_auth: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = MoexError::from_status(test.status, "https://iss.moex.com/iss");
            assert_eq!(actual.is_auth(), test.expected_auth, "TC{} failed", index);
            assert_eq!(actual.status(), Some(test.status), "TC{} failed", index);
            assert!(actual.is_transport(), "TC{} failed", index);
        }
    }

    #[test]
    fn test_moex_error_is_transport() {
        struct TestCase {
            input: MoexError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: input validation is raised to the caller, not folded into partial data
                input: MoexError::MissingTicker,
                expected: false,
            },
            TestCase {
                // TC1: connection failure
                input: MoexError::Request("connection refused".to_string()),
                expected: true,
            },
            TestCase {
                // TC2: body that is not JSON
                input: MoexError::Decode("expected value at line 1 column 1".to_string()),
                expected: true,
            },
            TestCase {
                // TC3: unresolvable underlying is a lookup failure
                input: MoexError::UnknownUnderlying("ZZ".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_transport(), test.expected, "TC{} failed", index);
        }
    }
}
