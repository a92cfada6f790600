//! Flag-aware configuration: profile lookup plus `GlobalOpts` overrides,
//! producing the `ClientConfig` handed to core.

use std::time::Duration;

use secrecy::SecretString;

use depotsync_config::{Config, config_path, profile_to_client_config};
use depotsync_core::{ClientConfig, TlsMode};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--profile`, else the file's default profile, else "default".
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn parse_url(field: &str, value: &str) -> Result<url::Url, CliError> {
    value.parse().map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{value}': {e}"),
    })
}

/// Build a `ClientConfig` from the config file, profile, and CLI overrides.
pub fn build_client_config(global: &GlobalOpts, cfg: &Config) -> Result<ClientConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut config = if let Some(profile) = cfg.profiles.get(&profile_name) {
        profile_to_client_config(profile, &profile_name, &cfg.defaults)?
    } else if let (Some(socket_url), Some(api_url)) = (&global.socket_url, &global.api_url) {
        // No profile: flags and env vars alone.
        let mut config = ClientConfig::new(
            parse_url("socket_url", socket_url)?,
            parse_url("api_url", api_url)?,
        );
        config.http_timeout = Duration::from_secs(cfg.defaults.timeout);
        config
    } else if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    } else {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };

    apply_overrides(&mut config, global)?;
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref url) = global.socket_url {
        config.socket_url = parse_url("socket_url", url)?;
    }
    if let Some(ref url) = global.api_url {
        config.api_url = parse_url("api_url", url)?;
    }
    if let Some(ref token) = global.token {
        config.token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        config.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.http_timeout = Duration::from_secs(secs);
    }
    Ok(())
}
