// ── Packet filter and intrusion-protection declarations ──

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Proto {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// One inbound allow rule. Everything not allowed is denied by the
/// default-deny policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowRule {
    pub port: u16,
    #[serde(default)]
    pub proto: Proto,
    /// Shown in rule listings on the host.
    #[serde(default)]
    pub comment: Option<String>,
}

impl AllowRule {
    pub fn spec(&self) -> String {
        format!("{}/{}", self.port, self.proto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub allow: Vec<AllowRule>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        // SSH must stay open or the firewall stage locks everyone out.
        Self {
            allow: vec![AllowRule {
                port: 22,
                proto: Proto::Tcp,
                comment: Some("ssh".into()),
            }],
        }
    }
}

/// Log-scanning ban service settings, rendered into the sshd jail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fail2banConfig {
    pub bantime: String,
    pub findtime: String,
    pub maxretry: u32,
}

impl Default for Fail2banConfig {
    fn default() -> Self {
        Self {
            bantime: "1h".into(),
            findtime: "10m".into(),
            maxretry: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn allow_rule_spec_formats_port_and_proto() {
        let rule = AllowRule {
            port: 443,
            proto: Proto::Tcp,
            comment: None,
        };
        assert_eq!(rule.spec(), "443/tcp");
    }

    #[test]
    fn default_firewall_keeps_ssh_open() {
        let cfg = FirewallConfig::default();
        assert!(cfg.allow.iter().any(|r| r.port == 22));
    }
}
