// ── Core error types ──
//
// The taxonomy the loop reasons about. `From<meater_api::Error>` folds
// transport-layer failures into Transport or Parse; API status codes only
// become errors where a caller needs a `Result` (one-shot commands).

use thiserror::Error;

use crate::tree::TreeError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or unusable configuration. Not retried.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network, DNS, timeout or unexpected HTTP failure.
    #[error("Cannot reach MEATER cloud: {reason}")]
    Transport { reason: String },

    /// The cloud answered with a non-success status code.
    #[error("MEATER cloud returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Malformed response from MEATER cloud: {message}")]
    Parse { message: String },

    /// A write hit a node that was never provisioned.
    #[error("State tree error: {0}")]
    Tree(#[from] TreeError),

    /// A poll was requested before any login succeeded.
    #[error("Not logged in")]
    Disconnected,
}

impl CoreError {
    /// Failures the loop answers with the fixed backoff.
    pub fn is_backoff(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Parse { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<meater_api::Error> for CoreError {
    fn from(err: meater_api::Error) -> Self {
        match err {
            meater_api::Error::Deserialization { message, .. } => CoreError::Parse { message },
            meater_api::Error::Http { status, .. } => CoreError::Transport {
                reason: format!("HTTP {status}"),
            },
            meater_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            meater_api::Error::Tls(message) => CoreError::Config { message },
            meater_api::Error::Transport(e) => CoreError::Transport {
                reason: e.to_string(),
            },
        }
    }
}
