use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role-group membership. Roles decide which convergence stages a host
/// receives: every host gets base/firewall/intrusion, database hosts add
/// the db stages, application hosts add the app and proxy stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    Database,
    Application,
}

/// One inventory entry. Hosts are declared manually, never discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Inventory name, also the `host_vars/<name>.toml` key.
    pub name: String,
    /// Network address the SSH transport connects to.
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl HostEntry {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
