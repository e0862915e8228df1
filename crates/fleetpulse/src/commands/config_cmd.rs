//! Config subcommand handlers.

use std::time::Duration;

use dialoguer::{Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, MonitorSettings, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "backend = \"{}\"", p.backend);
        if p.api_key.is_some() {
            let _ = writeln!(out, "api_key = \"****\"");
        }
        if let Some(ref env) = p.api_key_env {
            let _ = writeln!(out, "api_key_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if p.monitor != MonitorSettings::default() {
            let m = &p.monitor;
            let _ = writeln!(out, "monitor.probe_interval_secs = {}", m.probe_interval_secs);
            let _ = writeln!(out, "monitor.reconcile_interval_secs = {}", m.reconcile_interval_secs);
            let _ = writeln!(out, "monitor.resolve_interval_secs = {}", m.resolve_interval_secs);
            let _ = writeln!(out, "monitor.probe_timeout_ms = {}", m.probe_timeout_ms);
            let _ = writeln!(out, "monitor.probe_ports = {:?}", m.probe_ports);
            let _ = writeln!(out, "monitor.follow_up_secs = {:?}", m.follow_up_secs);
            let _ = writeln!(out, "monitor.control_release_secs = {}", m.control_release_secs);
            let th = &m.thresholds;
            let _ = writeln!(
                out,
                "monitor.thresholds = {{ min_downtime = {}, max_visual_time = {}, stall_timeout = {} }}",
                th.min_downtime.as_secs(),
                th.max_visual_time.as_secs(),
                th.stall_timeout.as_secs()
            );
            let mut techs: Vec<_> = m.tech_thresholds.keys().collect();
            techs.sort();
            for tech in techs {
                let th = &m.tech_thresholds[tech];
                let _ = writeln!(
                    out,
                    "monitor.tech_thresholds.{tech} = {{ min_downtime = {}, max_visual_time = {}, stall_timeout = {} }}",
                    th.min_downtime.as_secs(),
                    th.max_visual_time.as_secs(),
                    th.stall_timeout.as_secs()
                );
            }
        }
    }

    out
}

/// Delegate to the shared config crate's save function.
fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn profile_not_found(name: String, cfg: &Config) -> CliError {
    CliError::ProfileNotFound {
        name,
        available: config::available_profiles(cfg),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.trim().parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

fn parse_list<T: std::str::FromStr>(field: &str, value: &str) -> Result<Vec<T>, CliError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse_field(field, v, "a comma-separated list of numbers"))
        .collect()
}

/// Apply `key = value` to a profile.
fn set_profile_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    let m = &mut profile.monitor;
    let secs = |v: &str| parse_field::<u64>(key, v, "a number (seconds)");
    match key.replace('-', "_").as_str() {
        "backend" => {
            config::parse_backend_url(&value)?;
            profile.backend = value;
        }
        "api_key" => profile.api_key = Some(value),
        "api_key_env" => profile.api_key_env = Some(value),
        "insecure" => profile.insecure = Some(parse_field(key, &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(secs(&value)?),
        "ca_cert" => profile.ca_cert = Some(value.into()),
        "monitor.probe_interval_secs" => m.probe_interval_secs = secs(&value)?,
        "monitor.reconcile_interval_secs" => m.reconcile_interval_secs = secs(&value)?,
        "monitor.resolve_interval_secs" => m.resolve_interval_secs = secs(&value)?,
        "monitor.probe_timeout_ms" => {
            m.probe_timeout_ms = parse_field(key, &value, "a number (milliseconds)")?;
        }
        "monitor.probe_connect_timeout_ms" => {
            m.probe_connect_timeout_ms = parse_field(key, &value, "a number (milliseconds)")?;
        }
        "monitor.probe_ports" => m.probe_ports = parse_list(key, &value)?,
        "monitor.follow_up_secs" => m.follow_up_secs = parse_list(key, &value)?,
        "monitor.control_release_secs" => m.control_release_secs = secs(&value)?,
        "monitor.thresholds.min_downtime" => {
            m.thresholds.min_downtime = Duration::from_secs(secs(&value)?);
        }
        "monitor.thresholds.max_visual_time" => {
            m.thresholds.max_visual_time = Duration::from_secs(secs(&value)?);
        }
        "monitor.thresholds.stall_timeout" => {
            m.thresholds.stall_timeout = Duration::from_secs(secs(&value)?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: backend, api_key, api_key_env, \
                     insecure, timeout, ca_cert, monitor.probe_interval_secs, \
                     monitor.reconcile_interval_secs, monitor.resolve_interval_secs, \
                     monitor.probe_timeout_ms, monitor.probe_connect_timeout_ms, \
                     monitor.probe_ports, monitor.follow_up_secs, monitor.control_release_secs, \
                     monitor.thresholds.{{min_downtime,max_visual_time,stall_timeout}}"
                ),
            });
        }
    }
    profile.monitor.threshold_policy().validate()?;
    Ok(())
}

/// Ask where the API key lives. Returns the `(api_key, api_key_env)` pair
/// to record in the profile.
fn prompt_api_key(profile_name: &str) -> Result<(Option<String>, Option<String>), CliError> {
    let choices = &[
        "No API key (open backend)",
        "Store in system keyring (recommended)",
        "Read from an environment variable",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Backend API key")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    match selection {
        0 => Ok((None, None)),
        2 => {
            let var: String = Input::new()
                .with_prompt("Environment variable name")
                .default("FLEETPULSE_API_KEY".into())
                .interact_text()
                .map_err(prompt_err)?;
            Ok((None, Some(var)))
        }
        choice => {
            let key = rpassword::prompt_password("API key: ").map_err(prompt_err)?;
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            if choice == 1 {
                config::store_api_key(profile_name, &key)?;
                eprintln!("   ✓ API key stored in system keyring");
                Ok((None, None))
            } else {
                Ok((Some(key), None))
            }
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("fleetpulse configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let backend: String = Input::new()
                .with_prompt("Backend URL")
                .default(fleetpulse_core::DEFAULT_BACKEND_URL.into())
                .validate_with(|input: &String| {
                    config::parse_backend_url(input)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .interact_text()
                .map_err(prompt_err)?;

            let (api_key, api_key_env) = prompt_api_key(&profile_name)?;

            let profile = Profile {
                backend,
                api_key,
                api_key_env,
                ..Profile::default()
            };

            let mut cfg = config::load_config_or_default();
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());
            save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Test it: fleetpulse devices list");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                config::config_path().display().to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            set_profile_key(profile, &key, value)?;

            save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: fleetpulse config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(name, &cfg));
            }
            cfg.default_profile = Some(name.clone());
            save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetKey ──────────────────────────────────────────────────
        ConfigCommand::SetKey { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(profile_name, &cfg));
            }

            let secret = rpassword::prompt_password("API key: ").map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            config::store_api_key(&profile_name, &secret)?;
            eprintln!("✓ API key stored in system keyring for profile '{profile_name}'");
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
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_monitor_settings() {
        let mut p = Profile::default();
        set_profile_key(&mut p, "monitor.probe-ports", "22, 80".into()).unwrap();
        set_profile_key(&mut p, "monitor.thresholds.max_visual_time", "120".into()).unwrap();
        assert_eq!(p.monitor.probe_ports, vec![22, 80]);
        assert_eq!(
            p.monitor.thresholds.max_visual_time,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn set_rejects_inconsistent_thresholds() {
        let mut p = Profile::default();
        let err = set_profile_key(&mut p, "monitor.thresholds.min_downtime", "999".into());
        assert!(matches!(err, Err(CliError::Validation { .. })));
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_urls() {
        let mut p = Profile::default();
        assert!(set_profile_key(&mut p, "site", "x".into()).is_err());
        assert!(set_profile_key(&mut p, "backend", "not a url".into()).is_err());
    }

    #[test]
    fn redacted_output_masks_api_key() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                api_key: Some("secret-value".into()),
                ..Profile::default()
            },
        );
        let text = format_config_redacted(&cfg);
        assert!(text.contains("api_key = \"****\""));
        assert!(!text.contains("secret-value"));
        assert!(!text.contains("monitor."));
    }
}
