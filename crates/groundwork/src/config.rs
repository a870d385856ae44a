//! CLI-owned user configuration.
//!
//! Personal preferences that never belong in a shared project tree:
//! display defaults and the operator's passphrase file. Lives at the
//! platform config path (`~/.config/groundwork/config.toml` on Linux)
//! and is merged under CLI flags, so a flag always wins.

use std::path::PathBuf;

use clap::ValueEnum;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cli::{GlobalOpts, OutputFormat};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserConfig {
    pub defaults: Defaults,

    /// Operator's bundle passphrase file. A project may also name one
    /// in its settings; the flag outranks this, this outranks the
    /// project's.
    pub passphrase_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    /// "table", "json", or "yaml".
    pub output: String,

    /// "auto", "always", or "never".
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: "table".into(),
            color: "auto".into(),
        }
    }
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "groundwork")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("groundwork");
            p.push("config.toml");
            p
        })
}

/// Load the user config, falling back to defaults on any problem. A
/// broken preferences file must never block an operational command.
pub fn load_or_default() -> UserConfig {
    let figment = Figment::new()
        .merge(Serialized::defaults(UserConfig::default()))
        .merge(Toml::file(config_path()));
    match figment.extract() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable user config");
            UserConfig::default()
        }
    }
}

/// Fold user-config defaults into the parsed global options, without
/// overriding anything the flags or their env vars already set.
pub fn apply(global: &mut GlobalOpts, cfg: &UserConfig) {
    if global.output.is_none() {
        global.output = OutputFormat::from_str(&cfg.defaults.output, true).ok();
    }
    if global.passphrase_file.is_none() {
        global.passphrase_file.clone_from(&cfg.passphrase_file);
    }

    match cfg.defaults.color.as_str() {
        "always" => owo_colors::set_override(true),
        "never" => owo_colors::set_override(false),
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn bare_global() -> GlobalOpts {
        GlobalOpts {
            env: None,
            project_dir: None,
            passphrase_file: None,
            output: None,
            verbose: 0,
            quiet: false,
        }
    }

    #[test]
    fn config_defaults_fill_unset_flags() {
        let cfg = UserConfig {
            defaults: Defaults {
                output: "json".into(),
                color: "auto".into(),
            },
            passphrase_file: Some(PathBuf::from("/keys/groundwork")),
        };
        let mut global = bare_global();
        apply(&mut global, &cfg);
        assert_eq!(global.output, Some(OutputFormat::Json));
        assert_eq!(
            global.passphrase_file,
            Some(PathBuf::from("/keys/groundwork"))
        );
    }

    #[test]
    fn flags_outrank_config_defaults() {
        let cfg = UserConfig {
            defaults: Defaults {
                output: "json".into(),
                color: "auto".into(),
            },
            passphrase_file: Some(PathBuf::from("/keys/groundwork")),
        };
        let mut global = GlobalOpts {
            output: Some(OutputFormat::Yaml),
            passphrase_file: Some(PathBuf::from("/elsewhere")),
            ..bare_global()
        };
        apply(&mut global, &cfg);
        assert_eq!(global.output, Some(OutputFormat::Yaml));
        assert_eq!(global.passphrase_file, Some(PathBuf::from("/elsewhere")));
    }

    #[test]
    fn unknown_output_string_is_ignored() {
        let cfg = UserConfig {
            defaults: Defaults {
                output: "xml".into(),
                color: "auto".into(),
            },
            passphrase_file: None,
        };
        let mut global = bare_global();
        apply(&mut global, &cfg);
        assert_eq!(global.output, None);
        assert_eq!(global.output_format(), OutputFormat::Table);
    }
}
