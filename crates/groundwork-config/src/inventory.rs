//! Declared host inventory, one file per environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use groundwork_core::{HostEntry, Role};

use crate::ConfigError;

pub const INVENTORY_FILE: &str = "inventory.toml";

/// The hosts of one environment. Hosts are declared manually; nothing
/// is ever discovered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

impl Inventory {
    /// Load `inventory.toml` from an environment directory.
    pub fn load(env_dir: &Path) -> Result<Self, ConfigError> {
        let path = env_dir.join(INVENTORY_FILE);
        if !path.is_file() {
            return Err(ConfigError::MissingFile { path });
        }
        let raw = std::fs::read_to_string(&path)?;
        let inventory: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path,
            source: Box::new(source),
        })?;
        Ok(inventory)
    }

    pub fn host(&self, name: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Hosts matched by a `--limit` selector: a host name or a role
    /// name. `None` selects the whole inventory. A selector that
    /// matches nothing is a validation error, not an empty run.
    pub fn select(&self, limit: Option<&str>) -> Result<Vec<HostEntry>, ConfigError> {
        let Some(selector) = limit else {
            return Ok(self.hosts.clone());
        };
        if let Some(host) = self.host(selector) {
            return Ok(vec![host.clone()]);
        }
        if let Ok(role) = selector.parse::<Role>() {
            let matched: Vec<HostEntry> = self
                .hosts
                .iter()
                .filter(|h| h.has_role(role))
                .cloned()
                .collect();
            if !matched.is_empty() {
                return Ok(matched);
            }
        }
        Err(ConfigError::Validation {
            field: "limit".into(),
            reason: format!("`{selector}` matches no host or role in the inventory"),
        })
    }
}
