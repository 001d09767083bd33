//! Shared configuration for clustersync hosts.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `clustersync_core::SyncConfig`. The CLI layers its flag
//! overrides on top of what this crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use clustersync_core::{ReconnectConfig, SyncConfig, TlsVerification};

const KEYRING_SERVICE: &str = "clustersync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

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

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named cluster profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named cluster profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Aggregator snapshot endpoint (e.g., "https://dash.example/api/cluster/snapshot").
    pub aggregator: String,

    /// Live alert channel (e.g., "wss://dash.example/ws/alerts").
    pub live: Option<String>,

    /// Cluster API address the aggregator should snapshot.
    pub cluster: String,

    /// Cluster account forwarded to the aggregator.
    pub username: Option<String>,

    /// Session token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the session token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override HTTP timeout (seconds).
    pub timeout: Option<u64>,

    /// Snapshot lifetime (seconds).
    pub cache_ttl: Option<u64>,

    /// Deadline for one refresh (seconds).
    pub refresh_timeout: Option<u64>,

    /// Poll interval for hosts that refresh periodically (seconds).
    pub poll_interval: Option<u64>,

    /// Live channel backoff: first delay (seconds).
    pub reconnect_base_delay: Option<u64>,

    /// Live channel backoff: delay ceiling (seconds).
    pub reconnect_max_delay: Option<u64>,

    /// Live channel backoff: attempts before giving up.
    pub reconnect_max_attempts: Option<u32>,

    /// Drop a silent live channel after this many seconds. 0 disables.
    pub idle_timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "clustersync", "clustersync").map_or_else(
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
    p.push("clustersync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if present), then `CLUSTERSYNC_*` variables.
///
/// Nested keys use a double underscore, e.g.
/// `CLUSTERSYNC_PROFILES__LAB__TOKEN`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CLUSTERSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve the session token: env var named by the profile, then the
/// system keyring, then plaintext in the config.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store `token` in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?
        .set_password(token.expose_secret())
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to SyncConfig ───────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `SyncConfig` from a profile and the global defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let aggregator_url = parse_url("aggregator", &profile.aggregator)?;
    let live_url = profile
        .live
        .as_deref()
        .map(|raw| parse_url("live", raw))
        .transpose()?;

    if profile.cluster.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "cluster".into(),
            reason: "cluster address must not be empty".into(),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = SyncConfig::new(aggregator_url, profile.cluster.clone());
    config.live_url = live_url;
    config.username.clone_from(&profile.username);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    if let Some(secs) = profile.cache_ttl {
        config.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.refresh_timeout {
        config.refresh_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_interval {
        config.poll_interval = Duration::from_secs(secs);
    }

    let base = ReconnectConfig::default();
    config.reconnect = ReconnectConfig {
        base_delay: profile
            .reconnect_base_delay
            .map_or(base.base_delay, Duration::from_secs),
        max_delay: profile
            .reconnect_max_delay
            .map_or(base.max_delay, Duration::from_secs),
        max_attempts: profile.reconnect_max_attempts.unwrap_or(base.max_attempts),
    };
    if config.reconnect.base_delay > config.reconnect.max_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_base_delay".into(),
            reason: "must not exceed reconnect_max_delay".into(),
        });
    }

    match profile.idle_timeout {
        Some(0) => config.idle_timeout = None,
        Some(secs) => config.idle_timeout = Some(Duration::from_secs(secs)),
        None => {}
    }

    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────
