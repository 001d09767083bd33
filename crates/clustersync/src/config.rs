//! Profile resolution with CLI flag overrides.
//!
//! `clustersync-config` turns a stored profile into a `SyncConfig`; this
//! module layers `--aggregator`, `--cluster`, `--live`, `--token`, `-k`, and
//! `--timeout` on top, or builds everything from flags when no profile exists.

use std::time::Duration;

use secrecy::SecretString;

use clustersync_config::{self as cfg, Config, Profile};
use clustersync_core::{SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to talk to one cluster.
pub struct Resolved {
    pub profile: String,
    pub sync: SyncConfig,
    pub token: SecretString,
}

/// Name of the profile selected by `--profile`, the config default, or "default".
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve the sync config and session token for this invocation.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let config = cfg::load_config_or_default();
    let profile_name = active_profile_name(global, &config);

    let (mut sync, token) = if let Some(profile) = config.profiles.get(&profile_name) {
        let merged = apply_overrides(profile, global);
        let sync = cfg::profile_to_sync_config(&merged, &config.defaults)?;
        let token = match &global.token {
            Some(token) => SecretString::from(token.clone()),
            None => cfg::resolve_token(&merged, &profile_name)?,
        };
        (sync, token)
    } else if global.profile.is_some() {
        let mut available: Vec<_> = config.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    } else {
        from_flags(global, &profile_name, &config)?
    };

    if global.insecure {
        sync.tls = TlsVerification::DangerAcceptInvalid;
    }

    Ok(Resolved {
        profile: profile_name,
        sync,
        token,
    })
}

fn apply_overrides(profile: &Profile, global: &GlobalOpts) -> Profile {
    let mut merged = profile.clone();
    if let Some(ref aggregator) = global.aggregator {
        merged.aggregator.clone_from(aggregator);
    }
    if let Some(ref cluster) = global.cluster {
        merged.cluster.clone_from(cluster);
    }
    if global.live.is_some() {
        merged.live.clone_from(&global.live);
    }
    if global.timeout.is_some() {
        merged.timeout = global.timeout;
    }
    merged
}

/// No profile on disk: require `--aggregator`, `--cluster`, and `--token`.
fn from_flags(
    global: &GlobalOpts,
    profile_name: &str,
    config: &Config,
) -> Result<(SyncConfig, SecretString), CliError> {
    let (Some(aggregator), Some(cluster)) = (&global.aggregator, &global.cluster) else {
        return Err(CliError::NoConfig {
            path: cfg::config_path().display().to_string(),
        });
    };

    let profile = Profile {
        aggregator: aggregator.clone(),
        cluster: cluster.clone(),
        live: global.live.clone(),
        timeout: global.timeout,
        ..Profile::default()
    };
    let mut sync = cfg::profile_to_sync_config(&profile, &config.defaults)?;
    sync.timeout = Duration::from_secs(global.timeout.unwrap_or(config.defaults.timeout));

    let token = global
        .token
        .clone()
        .map(SecretString::from)
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;

    Ok((sync, token))
}
