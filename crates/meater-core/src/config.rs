// ── Runtime poller configuration ──
//
// Describes *what* to poll and how often. Carries credentials but never
// touches disk: meater-config builds a `PollerConfig` and hands it in.

use std::time::Duration;

use url::Url;

use crate::session::Credentials;

/// Configuration for one poller instance.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Cloud endpoint root.
    pub api_url: Url,
    pub credentials: Credentials,
    /// Sent as `Accept-Language`.
    pub language: String,
    /// Unit label attached to temperature nodes. Display only.
    pub temp_unit: String,
    /// Writes expire after twice the poll interval when set.
    pub clear_stale_values: bool,
    /// Poll interval while no probe is cooking (seconds).
    pub idle_interval_secs: u64,
    /// Poll interval while at least one probe is cooking (seconds).
    pub cook_interval_secs: u64,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            credentials: Credentials::new("", ""),
            language: "en".into(),
            temp_unit: "°C".into(),
            clear_stale_values: false,
            idle_interval_secs: 60,
            cook_interval_secs: 30,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PollerConfig {
    /// Builder-style credential setter.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Builder-style endpoint override.
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }
}

fn default_api_url() -> Url {
    match Url::parse(meater_api::DEFAULT_BASE_URL) {
        Ok(url) => url,
        Err(e) => unreachable!("DEFAULT_BASE_URL is a valid URL: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cloud_and_intervals() {
        let cfg = PollerConfig::default();
        assert_eq!(cfg.api_url.as_str(), meater_api::DEFAULT_BASE_URL);
        assert_eq!(cfg.idle_interval_secs, 60);
        assert_eq!(cfg.cook_interval_secs, 30);
        assert!(!cfg.clear_stale_values);
        assert!(!cfg.credentials.is_complete());
    }

    #[test]
    fn with_credentials_completes_config() {
        let cfg = PollerConfig::default().with_credentials("me@example.com", "pw");
        assert!(cfg.credentials.is_complete());
    }
}
