use serde::{Deserialize, Serialize};

/// Elevation policy for a system account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Elevation {
    /// Sudo without a password. Reserved for the automation identity;
    /// an unattended run must never hit an interactive prompt.
    Passwordless,
    /// Sudo gated on the account password. The administration identity.
    PasswordRequired,
}

/// A fixed system account the base stage converges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySpec {
    pub name: String,
    /// SSH public keys, one per authorized_keys line.
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
    pub elevation: Elevation,
}

fn default_shell() -> String {
    "/bin/bash".into()
}

impl IdentitySpec {
    /// The sudoers drop-in line granting this identity its elevation.
    pub fn sudoers_line(&self) -> String {
        match self.elevation {
            Elevation::Passwordless => format!("{} ALL=(ALL) NOPASSWD:ALL", self.name),
            Elevation::PasswordRequired => format!("{} ALL=(ALL:ALL) ALL", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sudoers_line_reflects_elevation() {
        let auto = IdentitySpec {
            name: "ops".into(),
            keys: vec![],
            shell: "/bin/bash".into(),
            elevation: Elevation::Passwordless,
        };
        assert_eq!(auto.sudoers_line(), "ops ALL=(ALL) NOPASSWD:ALL");

        let admin = IdentitySpec {
            elevation: Elevation::PasswordRequired,
            ..auto
        };
        assert_eq!(admin.sudoers_line(), "ops ALL=(ALL:ALL) ALL");
    }
}
