// ── API status classification ──
//
// Pure mapping from the envelope `statusCode` to what the loop should do
// next. The caller applies the decision; nothing here touches state.

use strum::Display;
use tracing::{debug, error, info, warn};

/// Fixed retry delay after a recognised failure class.
pub const BACKOFF_SECS: u64 = 600;

/// What the loop does after a classified response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Treat the response as usable.
    Proceed,
    /// Token rejected: log in again before the next poll.
    Relogin,
    /// Widen the retry interval to [`BACKOFF_SECS`].
    Backoff,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status_code: u16,
    /// New value for the connection flag; `None` leaves it unchanged.
    pub connected: Option<bool>,
    pub action: Action,
    /// A 401 that escalated to backoff because the relogin was spent.
    pub relogin_suppressed: bool,
}

/// Map an API status code to a loop decision.
///
/// `relogin_spent` is true when the last login failed or an earlier 401
/// was already answered with a relogin. Such a 401 backs off instead of
/// re-entering login.
pub fn classify(status_code: u16, relogin_spent: bool) -> Classification {
    let (connected, action) = match status_code {
        200 => (Some(true), Action::Proceed),
        401 if relogin_spent => (Some(false), Action::Backoff),
        401 => (Some(false), Action::Relogin),
        400 | 404 | 500 => (Some(false), Action::Backoff),
        429 => (None, Action::Backoff),
        _ => (None, Action::Proceed),
    };

    Classification {
        status_code,
        connected,
        action,
        relogin_suppressed: status_code == 401 && relogin_spent,
    }
}

impl Classification {
    /// Emit the operator-facing log line for this status.
    pub fn log(&self) {
        let code = self.status_code;
        if self.relogin_suppressed {
            error!(
                status_code = code,
                retry_secs = BACKOFF_SECS,
                "statuscode 401 again after login, retrying in {BACKOFF_SECS} seconds"
            );
            return;
        }
        match (code, self.action) {
            (200, _) => debug!(status_code = code, "statuscode 200 --> OK"),
            (401, _) => {
                info!(status_code = code, "statuscode 401 --> unauthorized --> login");
            }
            (_, Action::Backoff) => warn!(
                status_code = code,
                retry_secs = BACKOFF_SECS,
                "statuscode {code} --> {}. Try again in {BACKOFF_SECS} seconds",
                reason(code)
            ),
            _ => debug!(status_code = code, "unhandled statuscode, treated as success"),
        }
    }
}

fn reason(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
