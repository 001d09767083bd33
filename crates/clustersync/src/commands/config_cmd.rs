//! Config subcommand handlers.

use dialoguer::{Input, Password, Select};
use secrecy::SecretString;

use clustersync_config::{self as cfg, Config, Defaults, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `config` with stored tokens masked.
fn redacted(config: &Config) -> Config {
    let profiles = config
        .profiles
        .iter()
        .map(|(name, profile)| {
            let mut profile = profile.clone();
            if profile.token.is_some() {
                profile.token = Some(REDACTED.into());
            }
            (name.clone(), profile)
        })
        .collect();
    Config {
        default_profile: config.default_profile.clone(),
        defaults: Defaults {
            output: config.defaults.output.clone(),
            color: config.defaults.color.clone(),
            insecure: config.defaults.insecure,
            timeout: config.defaults.timeout,
        },
        profiles,
    }
}

/// TOML-like listing of a (redacted) config.
fn format_config(config: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = config.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", config.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", config.defaults.color);
    let _ = writeln!(out, "insecure = {}", config.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", config.defaults.timeout);

    let mut names: Vec<_> = config.profiles.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, p) in names {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "aggregator = \"{}\"", p.aggregator);
        let _ = writeln!(out, "cluster = \"{}\"", p.cluster);
        if let Some(ref live) = p.live {
            let _ = writeln!(out, "live = \"{live}\"");
        }
        if let Some(ref user) = p.username {
            let _ = writeln!(out, "username = \"{user}\"");
        }
        if let Some(ref token) = p.token {
            let _ = writeln!(out, "token = \"{token}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        let numbers = [
            ("timeout", p.timeout),
            ("cache_ttl", p.cache_ttl),
            ("refresh_timeout", p.refresh_timeout),
            ("poll_interval", p.poll_interval),
            ("reconnect_base_delay", p.reconnect_base_delay),
            ("reconnect_max_delay", p.reconnect_max_delay),
            ("reconnect_max_attempts", p.reconnect_max_attempts.map(u64::from)),
            ("idle_timeout", p.idle_timeout),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
    }

    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Offer to store the token in the system keyring.
///
/// Returns `Some(token)` when the user chose plaintext config storage.
fn prompt_token_storage(profile_name: &str, token: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the session token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        cfg::store_token(profile_name, &SecretString::from(token.to_owned()))?;
        eprintln!("   ✓ token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token.to_owned()))
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = cfg::config_path();
    eprintln!("clustersync configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut config = cfg::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default(active_profile_name(global, &config))
        .interact_text()
        .map_err(prompt_err)?;

    let aggregator: String = Input::new()
        .with_prompt("Aggregator snapshot URL")
        .default("http://localhost:3000/api/cluster/snapshot".into())
        .interact_text()
        .map_err(prompt_err)?;

    let cluster: String = Input::new()
        .with_prompt("Cluster API address")
        .default("https://pve-01:8006".into())
        .interact_text()
        .map_err(prompt_err)?;

    let live: String = Input::new()
        .with_prompt("Live alert channel URL (blank to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let username: String = Input::new()
        .with_prompt("Username (blank to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let token = Password::new()
        .with_prompt("Session token")
        .interact()
        .map_err(prompt_err)?;
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "session token cannot be empty".into(),
        });
    }

    let profile = Profile {
        aggregator,
        cluster,
        live: optional(&live),
        username: optional(&username),
        ..Profile::default()
    };
    // Reject bad URLs before anything is written.
    cfg::profile_to_sync_config(&profile, &config.defaults)?;

    let profile = Profile {
        token: prompt_token_storage(&profile_name, &token)?,
        ..profile
    };

    config.profiles.insert(profile_name.clone(), profile);
    if config.default_profile.is_none() {
        config.default_profile = Some(profile_name.clone());
    }
    cfg::save_config(&config)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: clustersync snapshot --profile {profile_name}");
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let config = redacted(&cfg::load_config()?);
            let out = output::render_single(&global.output, &config, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&cfg::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let config = cfg::load_config_or_default();
            let default = config.default_profile.as_deref().unwrap_or("default");
            if config.profiles.is_empty() {
                eprintln!("No profiles configured. Run: clustersync config init");
            } else {
                let mut names: Vec<_> = config.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }
    }
}
