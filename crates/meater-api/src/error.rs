use thiserror::Error;

/// Top-level error type for the `meater-api` crate.
///
/// Only covers failures where no usable API envelope came back. A well-formed
/// envelope carrying a non-200 `statusCode` is NOT an error at this layer --
/// it is returned as an [`ApiResponse`](crate::ApiResponse) and classified by
/// `meater-core`.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or client construction failure.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success HTTP status whose body was not an API envelope.
    #[error("HTTP {status} from cloud API")]
    Http { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient network error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the response arrived but could not be decoded.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }

    /// The raw response body, when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } | Self::Deserialization { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_parse());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Http {
            status: 403,
            body: "forbidden".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.body(), Some("forbidden"));
    }

    #[test]
    fn deserialization_is_parse_error() {
        let err = Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        };
        assert!(err.is_parse());
        assert_eq!(err.body(), Some("<html>"));
    }
}
