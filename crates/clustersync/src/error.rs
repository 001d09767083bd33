//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use clustersync_config::ConfigError;
use clustersync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {url}")]
    #[diagnostic(
        code(clustersync::connection_failed),
        help(
            "Check that the dashboard aggregator is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Live channel gave up after {attempts} attempts")]
    #[diagnostic(
        code(clustersync::reconnect_exhausted),
        help("Last error: {last_error}\nRe-run with --keep-going to stay attached.")
    )]
    ReconnectExhausted { attempts: u32, last_error: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(clustersync::auth_failed),
        help(
            "The session token was rejected. Obtain a new token and store it with:\n\
             clustersync config init --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No session token configured for profile '{profile}'")]
    #[diagnostic(
        code(clustersync::no_credentials),
        help(
            "Configure a token with: clustersync config init\n\
             Or set the CLUSTERSYNC_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Aggregator ───────────────────────────────────────────────────
    #[error("Aggregator reported failure: {message}")]
    #[diagnostic(code(clustersync::backend))]
    Backend { message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(code(clustersync::invalid_response))]
    InvalidResponse { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(clustersync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(clustersync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: clustersync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No configuration found")]
    #[diagnostic(
        code(clustersync::no_config),
        help(
            "Create one with: clustersync config init\n\
             Expected at: {path}\n\
             Or pass --aggregator and --cluster."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(clustersync::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(clustersync::timeout),
        help("Increase the refresh_timeout in your profile or check aggregator responsiveness.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Internal / IO / Serialization ────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ReconnectExhausted { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::NotAuthenticated => CliError::NoCredentials {
                profile: "current".into(),
            },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CoreError::Backend { message } => CliError::Backend { message },
            CoreError::InvalidResponse { message } => CliError::InvalidResponse { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            other => CliError::Config(Box::new(other)),
        }
    }
}
