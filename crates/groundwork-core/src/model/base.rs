use serde::{Deserialize, Serialize};

use super::identity::{Elevation, IdentitySpec};

/// Base-stage declaration: package baseline, clock, the two fixed
/// identities, and unattended security updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Packages every host carries regardless of role.
    pub packages: Vec<String>,
    pub timezone: String,
    /// Whether the unattended-upgrades periodic config is written.
    pub unattended_upgrades: bool,
    /// Non-interactive account all convergence runs connect as.
    pub automation: IdentitySpec,
    /// Interactive account for humans, sudo gated on its password.
    pub admin: IdentitySpec,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            packages: vec![
                "sudo".into(),
                "ca-certificates".into(),
                "curl".into(),
                "unattended-upgrades".into(),
            ],
            timezone: "Etc/UTC".into(),
            unattended_upgrades: true,
            automation: IdentitySpec {
                name: "groundwork".into(),
                keys: Vec::new(),
                shell: "/bin/bash".into(),
                elevation: Elevation::Passwordless,
            },
            admin: IdentitySpec {
                name: "admin".into(),
                keys: Vec::new(),
                shell: "/bin/bash".into(),
                elevation: Elevation::PasswordRequired,
            },
        }
    }
}
