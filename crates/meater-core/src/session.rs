// ── Cloud session ──
//
// Credentials in, bearer token out. The poller owns exactly one `Session`
// and consults it whenever a 401 arrives.

use secrecy::{ExposeSecret, SecretString};

/// Account credentials for the cloud login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Both fields present. Login is never attempted otherwise.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.expose_secret().is_empty()
    }
}

/// Authentication state of the loop.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer token from the last successful login; empty before that.
    pub token: SecretString,
    pub user_id: String,
    /// Last login attempt failed. Suppresses relogin on the next 401.
    pub login_failed: bool,
    /// A poll already answered a 401 with a relogin and no poll has
    /// succeeded since.
    pub relogin_used: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: SecretString::from(String::new()),
            user_id: String::new(),
            login_failed: false,
            relogin_used: false,
        }
    }
}

impl Session {
    /// Record a successful login.
    pub fn established(&mut self, token: String, user_id: String) {
        self.token = SecretString::from(token);
        self.user_id = user_id;
        self.login_failed = false;
    }

    /// Record a failed login. The old token is kept: the cloud decides
    /// whether it is still valid.
    pub fn failed(&mut self) {
        self.login_failed = true;
    }

    /// Whether a 401 may still be answered with a relogin.
    pub fn relogin_spent(&self) -> bool {
        self.login_failed || self.relogin_used
    }

    /// Record a poll that came back 200.
    pub fn poll_succeeded(&mut self) {
        self.relogin_used = false;
    }

    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().is_empty()
    }
}
