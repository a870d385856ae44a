//! Variable layering.
//!
//! Five layers, merged in increasing precedence with figment:
//!
//! 1. global `defaults.toml` at the project root
//! 2. `environments/<env>/vars.toml`
//! 3. `group_vars/<role>.toml`, one per host role in declared order
//! 4. `host_vars/<host>.toml`
//! 5. run-time `--set key.path=value` overrides
//!
//! Conflicting keys resolve to the highest layer; overriding is never
//! an error. Any layer file may be absent. The merged document extracts
//! into one typed [`HostConfig`].

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};

use groundwork_core::{HostConfig, HostEntry};

use crate::{ConfigError, Project};

/// Merge the variable layers for one host and extract its desired
/// state. App proxy-template references are resolved into inline
/// template source here, so planning never touches the filesystem.
pub fn resolve_host_config(
    project: &Project,
    env: &str,
    host: &HostEntry,
    overrides: &[String],
) -> Result<HostConfig, ConfigError> {
    let env_dir = project.environment_dir(env);

    let mut figment = Figment::new()
        .merge(Serialized::defaults(HostConfig::default()))
        .merge(Toml::file(project.root.join("defaults.toml")))
        .merge(Toml::file(env_dir.join("vars.toml")));
    for role in &host.roles {
        figment = figment.merge(Toml::file(
            env_dir.join("group_vars").join(format!("{role}.toml")),
        ));
    }
    figment = figment.merge(Toml::file(
        env_dir.join("host_vars").join(format!("{}.toml", host.name)),
    ));
    if !overrides.is_empty() {
        figment = figment.merge(Serialized::defaults(overrides_table(overrides)?));
    }

    let mut cfg: HostConfig = figment.extract()?;
    resolve_proxy_templates(project, &mut cfg)?;
    Ok(cfg)
}

/// Build a nested TOML table from `key.path=value` pairs. A value that
/// parses as a TOML scalar or array keeps that type; anything else is
/// taken as a string, so `--set base.timezone=Europe/Berlin` needs no
/// quoting.
fn overrides_table(pairs: &[String]) -> Result<toml::Table, ConfigError> {
    let mut root = toml::Table::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(ConfigError::Validation {
                field: "set".into(),
                reason: format!("`{pair}` is not of the form key.path=value"),
            });
        };
        let key = key.trim();
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(ConfigError::Validation {
                field: "set".into(),
                reason: format!("`{key}` is not a dotted key path"),
            });
        }
        insert_dotted(&mut root, key, parse_value(raw));
    }
    Ok(root)
}

fn parse_value(raw: &str) -> toml::Value {
    match format!("v = {raw}").parse::<toml::Table>() {
        Ok(mut table) => match table.remove("v") {
            Some(value) => value,
            None => toml::Value::String(raw.to_owned()),
        },
        Err(_) => toml::Value::String(raw.to_owned()),
    }
}

fn insert_dotted(table: &mut toml::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        None => {
            table.insert(key.to_owned(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_owned())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(nested) = entry {
                insert_dotted(nested, rest, value);
            }
        }
    }
}

/// Replace each app's `proxy_template` file reference with the file's
/// contents, read from the project's `templates/` directory.
fn resolve_proxy_templates(project: &Project, cfg: &mut HostConfig) -> Result<(), ConfigError> {
    for app in &mut cfg.apps {
        if let Some(reference) = app.proxy_template.take() {
            let path = project.templates_dir().join(&reference);
            if !path.is_file() {
                return Err(ConfigError::MissingFile { path });
            }
            app.proxy_template = Some(std::fs::read_to_string(&path)?);
        }
    }
    Ok(())
}
