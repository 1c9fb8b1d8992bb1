//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use meater_config::ConfigError;
use meater_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the MEATER cloud")]
    #[diagnostic(
        code(meater::connection_failed),
        help(
            "Check your network connection and the api_url setting.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Login to the MEATER cloud was rejected: {message}")]
    #[diagnostic(
        code(meater::auth_failed),
        help("Verify the username and password of your MEATER account.")
    )]
    AuthFailed { message: String },

    #[error("No MEATER credentials configured")]
    #[diagnostic(
        code(meater::no_credentials),
        help(
            "Set username and password in {path}\n\
             or export MEATER_USERNAME and MEATER_PASSWORD."
        )
    )]
    NoCredentials { path: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("MEATER cloud returned status {status}: {message}")]
    #[diagnostic(code(meater::api_error))]
    ApiError { status: u16, message: String },

    #[error("Unexpected response from the MEATER cloud: {message}")]
    #[diagnostic(code(meater::malformed_response))]
    Malformed { message: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid configuration in {path}")]
    #[diagnostic(
        code(meater::config),
        help("Fix the file or recreate it with: meater config init --force")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(meater::validation))]
    Validation { field: String, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(meater::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(meater::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(meater::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Config { .. } | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { reason } => CliError::ConnectionFailed { reason },

            CoreError::Api { status: 401, message } => CliError::AuthFailed { message },

            CoreError::Disconnected => CliError::AuthFailed {
                message: "not logged in".into(),
            },

            CoreError::Api { status, message } => CliError::ApiError { status, message },

            CoreError::Parse { message } => CliError::Malformed { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Tree(e) => CliError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let auth: CliError = CoreError::Api {
            status: 401,
            message: "Unauthorized".into(),
        }
        .into();
        let conn: CliError = CoreError::Transport {
            reason: "connection refused".into(),
        }
        .into();
        let limited: CliError = CoreError::Api {
            status: 429,
            message: "Too Many Requests".into(),
        }
        .into();

        assert_eq!(auth.exit_code(), exit_code::AUTH);
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);
        assert_eq!(limited.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = CliError::Config {
            path: "/tmp/config.toml".into(),
            source: ConfigError::Validation {
                field: "update_idle".into(),
                reason: "must be at least 1 second".into(),
            },
        };
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
