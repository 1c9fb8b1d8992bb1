//! Configuration for the MEATER cloud poller.
//!
//! A flat TOML file plus `MEATER_*` environment overrides, credential
//! resolution (env, keyring, plaintext), and translation to
//! `meater_core::PollerConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Dict,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use meater_core::{Credentials, PollerConfig};

/// Keyring service name. Entries are keyed by account username.
pub const KEYRING_SERVICE: &str = "meater";

/// Prefix for environment overrides (`MEATER_UPDATE_IDLE=30`, ...).
pub const ENV_PREFIX: &str = "MEATER_";

/// Camel-case file keys and the field each one stands for.
const KEY_ALIASES: [(&str, &str); 4] = [
    ("tempUnit", "temp_unit"),
    ("clearOldValues", "clear_old_values"),
    ("updateIdle", "update_idle"),
    ("updateCook", "update_cook"),
];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// On-disk configuration. Camel-case aliases accept the key names used
/// by existing adapter setups (`updateIdle`, `tempUnit`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Cloud account e-mail.
    #[serde(default)]
    pub username: String,

    /// Plaintext password. Prefer the keyring or `password_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Sent as `Accept-Language` on device requests.
    #[serde(default = "default_language")]
    pub language: String,

    /// Unit label for temperature states.
    #[serde(default = "default_temp_unit", alias = "tempUnit")]
    pub temp_unit: String,

    /// Let written values expire after two poll intervals.
    #[serde(default, alias = "clearOldValues")]
    pub clear_old_values: bool,

    /// Poll interval in seconds while nothing is cooking.
    #[serde(default = "default_update_idle", alias = "updateIdle")]
    pub update_idle: u64,

    /// Poll interval in seconds while a cook is running.
    #[serde(default = "default_update_cook", alias = "updateCook")]
    pub update_cook: u64,

    /// Cloud API root.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: None,
            password_env: None,
            language: default_language(),
            temp_unit: default_temp_unit(),
            clear_old_values: false,
            update_idle: default_update_idle(),
            update_cook: default_update_cook(),
            api_url: default_api_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_language() -> String {
    "en".into()
}
fn default_temp_unit() -> String {
    "°C".into()
}
fn default_update_idle() -> u64 {
    60
}
fn default_update_cook() -> u64 {
    30
}
fn default_api_url() -> String {
    meater_core::PollerConfig::default().api_url.into()
}
fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Copy safe to print: the plaintext password is masked.
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "********".into()),
            ..self.clone()
        }
    }

    /// Check ranges and formats. Missing credentials are not an error
    /// here: the poller reports them and idles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("update_idle", self.update_idle),
            ("update_cook", self.update_cook),
            ("timeout", self.timeout),
        ] {
            if value < 1 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be at least 1 second".into(),
                });
            }
        }

        parse_api_url(&self.api_url)?;
        Ok(())
    }

    /// Build the runtime configuration, resolving the password.
    pub fn to_poller_config(&self) -> Result<PollerConfig, ConfigError> {
        self.validate()?;
        let api_url = parse_api_url(&self.api_url)?;
        let password = resolve_password(self).unwrap_or_else(|| SecretString::from(String::new()));

        Ok(PollerConfig {
            api_url,
            credentials: Credentials {
                username: self.username.trim().to_owned(),
                password,
            },
            language: self.language.clone(),
            temp_unit: self.temp_unit.clone(),
            clear_stale_values: self.clear_old_values,
            idle_interval_secs: self.update_idle,
            cook_interval_secs: self.update_cook,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

fn parse_api_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "meater", "meater").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("meater");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");

    // Env keys are always snake-case, so file keys are normalised first or
    // `updateIdle` plus `MEATER_UPDATE_IDLE` would reach serde as two fields.
    let file: Dict = Figment::from(Toml::file(path)).extract()?;
    let figment = Figment::new()
        .merge(Serialized::defaults(normalize_keys(file)))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["password", "config"]));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Rewrite camel-case keys to their field names. The snake-case spelling
/// wins when a file carries both.
fn normalize_keys(mut dict: Dict) -> Dict {
    for (alias, field) in KEY_ALIASES {
        if let Some(value) = dict.remove(alias) {
            dict.entry(field.to_owned()).or_insert(value);
        }
    }
    dict
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write a starter file at `path`. Refuses to overwrite unless `force`.
pub fn init_config(path: &Path, force: bool) -> Result<Config, ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let cfg = Config::default();
    save_config_to(path, &cfg)?;
    Ok(cfg)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password.
///
/// Order: the variable named by `password_env`, `MEATER_PASSWORD`, the
/// system keyring entry for the username, then the plaintext value.
pub fn resolve_password(cfg: &Config) -> Option<SecretString> {
    // 1. Configured env var
    if let Some(ref env_name) = cfg.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. Well-known env var
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}PASSWORD")) {
        return Some(SecretString::from(val));
    }

    // 3. System keyring
    let username = cfg.username.trim();
    if !username.is_empty() {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, username) {
            if let Ok(secret) = entry.get_password() {
                return Some(SecretString::from(secret));
            }
        }
    }

    // 4. Plaintext in config
    cfg.password.clone().map(SecretString::from)
}
