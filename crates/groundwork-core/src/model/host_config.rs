use serde::{Deserialize, Serialize};

use super::app::AppDescriptor;
use super::base::BaseConfig;
use super::database::DatabaseConfig;
use super::firewall::{Fail2banConfig, FirewallConfig};

/// The fully merged desired state for one host.
///
/// Produced by the config layer from the five variable layers (global
/// defaults, environment, role groups, host, run-time overrides) and
/// extracted as one typed document. Every field defaults, so any layer
/// may state any subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub base: BaseConfig,
    pub firewall: FirewallConfig,
    pub fail2ban: Fail2banConfig,
    pub database: DatabaseConfig,
    pub apps: Vec<AppDescriptor>,
}
