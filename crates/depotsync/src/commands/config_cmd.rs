//! Config subcommand handlers.

use std::io::BufRead;

use serde::Serialize;

use depotsync_config::{self as config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::active_profile_name;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

fn required_flag(value: Option<&String>, flag: &str) -> Result<String, CliError> {
    value.cloned().ok_or_else(|| CliError::Validation {
        field: flag.trim_start_matches('-').replace('-', "_"),
        reason: format!("{flag} is required"),
    })
}

/// The config as a TOML value with plaintext tokens masked.
fn redacted(cfg: &Config) -> Result<toml::Value, CliError> {
    let mut value = toml::Value::try_from(cfg).map_err(|e| CliError::Validation {
        field: "config".into(),
        reason: format!("failed to serialize config: {e}"),
    })?;
    if let Some(profiles) = value.get_mut("profiles").and_then(toml::Value::as_table_mut) {
        for profile in profiles.iter_mut().map(|(_, v)| v).filter_map(toml::Value::as_table_mut) {
            if let Some(token) = profile.get_mut("token") {
                *token = toml::Value::String(REDACTED.into());
            }
        }
    }
    Ok(value)
}

#[derive(Serialize)]
struct ProfileRow<'a> {
    name: &'a str,
    socket_url: &'a str,
    api_url: &'a str,
    default: bool,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: profile from flags ────────────────────────────────
        ConfigCommand::Init {
            name,
            token_env,
            force,
        } => {
            let mut cfg = config::load_config()?;
            if cfg.profiles.contains_key(&name) && !force {
                return Err(CliError::Validation {
                    field: "name".into(),
                    reason: format!("profile '{name}' already exists (use --force to replace it)"),
                });
            }

            let profile = Profile {
                socket_url: required_flag(global.socket_url.as_ref(), "--socket-url")?,
                api_url: required_flag(global.api_url.as_ref(), "--api-url")?,
                token_env,
                insecure: global.insecure.then_some(true),
                timeout: global.timeout,
                ..Profile::default()
            };
            // Reject bad URLs before anything is written.
            for (field, value) in [("socket_url", &profile.socket_url), ("api_url", &profile.api_url)] {
                url::Url::parse(value).map_err(|e| CliError::Validation {
                    field: field.into(),
                    reason: format!("invalid URL '{value}': {e}"),
                })?;
            }

            cfg.profiles.insert(name.clone(), profile);
            if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("Profile '{name}' written to {}", config::config_path().display());
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let value = redacted(&cfg)?;
            match global.output {
                OutputFormat::Pretty => {
                    let text = toml::to_string_pretty(&value).map_err(|e| {
                        CliError::Validation {
                            field: "config".into(),
                            reason: format!("failed to serialize config: {e}"),
                        }
                    })?;
                    if !global.quiet {
                        print!("{text}");
                    }
                    Ok(())
                }
                OutputFormat::Json => output::print(&value, global),
            }
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let active = active_profile_name(global, &cfg);
            let mut rows: Vec<ProfileRow<'_>> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name,
                    socket_url: &p.socket_url,
                    api_url: &p.api_url,
                    default: *name == active,
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(b.name));
            output::print(&rows, global)
        }

        // ── Use ─────────────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
                available.sort_unstable();
                return Err(CliError::ProfileNotFound {
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available.join(", ")
                    },
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken => {
            let cfg = config::load_config()?;
            let name = active_profile_name(global, &cfg);

            let token = match global.token {
                Some(ref token) => token.clone(),
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line.trim().to_owned()
                }
            };
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }

            config::store_token(&name, &token)?;
            if !global.quiet {
                eprintln!("Token stored in the system keyring for profile '{name}'");
            }
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "prod".into(),
            Profile {
                socket_url: "wss://api.example.com/ws".into(),
                api_url: "https://api.example.com/".into(),
                token: Some("hunter2".into()),
                ..Profile::default()
            },
        );

        let value = redacted(&cfg).unwrap();
        let text = toml::to_string(&value).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains(REDACTED));
    }
}
