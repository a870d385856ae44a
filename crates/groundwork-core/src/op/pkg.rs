// ── Package baseline, clock, unattended updates ──

use std::collections::HashSet;

use async_trait::async_trait;

use super::Converge;
use super::file;
use crate::error::OpError;
use crate::remote::{Remote, ensure_success};

/// Declared packages present in installed state.
#[derive(Debug, Clone)]
pub struct AptInstall {
    pub packages: Vec<String>,
}

#[async_trait]
impl Converge for AptInstall {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let missing = self.missing(remote).await?;
        if missing.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("install {}", missing.join(", "))))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let update = remote
            .run(&["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "update", "-q"])
            .await?;
        ensure_success("apt-get update", &update)?;

        let mut argv = vec![
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            "-q",
            "--no-install-recommends",
        ];
        argv.extend(self.packages.iter().map(String::as_str));
        let out = remote.run(&argv).await?;
        ensure_success("apt-get install", &out)
    }
}

impl AptInstall {
    async fn missing(&self, remote: &Remote) -> Result<Vec<String>, OpError> {
        if self.packages.is_empty() {
            return Ok(Vec::new());
        }
        let mut argv = vec!["dpkg-query", "-W", "-f", "${Package} ${db:Status-Status}\n"];
        argv.extend(self.packages.iter().map(String::as_str));
        // Exits non-zero when any name is unknown to dpkg; the known
        // ones are still listed on stdout, so ignore the status.
        let out = remote.run(&argv).await?;
        let installed: HashSet<&str> = out
            .stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(name), Some("installed")) => Some(name),
                    _ => None,
                }
            })
            .collect();
        Ok(self
            .packages
            .iter()
            .filter(|p| !installed.contains(p.as_str()))
            .cloned()
            .collect())
    }
}

/// System timezone, converged via timedatectl.
#[derive(Debug, Clone)]
pub struct Timezone {
    pub zone: String,
}

#[async_trait]
impl Converge for Timezone {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["cat", "/etc/timezone"]).await?;
        if out.success() && out.stdout_trimmed() == self.zone {
            Ok(None)
        } else {
            Ok(Some(format!("set timezone {}", self.zone)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let out = remote.run(&["timedatectl", "set-timezone", &self.zone]).await?;
        ensure_success("timedatectl set-timezone", &out)
    }
}

/// Periodic apt config turning unattended security upgrades on.
/// The package itself is part of the base package list.
#[derive(Debug, Clone, Default)]
pub struct UnattendedUpgrades {}

const AUTO_UPGRADES_PATH: &str = "/etc/apt/apt.conf.d/20auto-upgrades";
const AUTO_UPGRADES_CONTENT: &str = "APT::Periodic::Update-Package-Lists \"1\";\nAPT::Periodic::Unattended-Upgrade \"1\";\n";

#[async_trait]
impl Converge for UnattendedUpgrades {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let current = file::remote_sha256(remote, AUTO_UPGRADES_PATH).await?;
        if current.as_deref() == Some(file::local_sha256(AUTO_UPGRADES_CONTENT.as_bytes()).as_str()) {
            Ok(None)
        } else {
            Ok(Some(format!("write {AUTO_UPGRADES_PATH}")))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        file::upload(
            remote,
            AUTO_UPGRADES_PATH,
            AUTO_UPGRADES_CONTENT.as_bytes(),
            "root",
            "root",
            "644",
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use groundwork_exec::{CmdOutput, ScriptedTransport};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::remote::Escalation;

    fn remote(script: ScriptedTransport) -> Remote {
        Remote::new(Arc::new(script), Escalation::Sudo, "test")
    }

    #[tokio::test]
    async fn apt_check_reports_only_missing_packages() {
        let script = ScriptedTransport::new();
        script.on_prefix(
            "sudo -n -- dpkg-query",
            CmdOutput {
                status: 1,
                stdout: "sudo installed\ncurl installed\n".into(),
                stderr: "dpkg-query: no packages found matching ufw\n".into(),
            },
        );
        let op = AptInstall {
            packages: vec!["sudo".into(), "curl".into(), "ufw".into()],
        };
        let delta = op.check(&remote(script)).await.unwrap();
        assert_eq!(delta, Some("install ufw".into()));
    }

    #[tokio::test]
    async fn apt_check_is_none_when_everything_installed() {
        let script = ScriptedTransport::new();
        script.on_prefix(
            "sudo -n -- dpkg-query",
            CmdOutput::ok("sudo installed\ncurl installed\n"),
        );
        let op = AptInstall {
            packages: vec!["sudo".into(), "curl".into()],
        };
        assert_eq!(op.check(&remote(script)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn apt_check_treats_deinstalled_as_missing() {
        let script = ScriptedTransport::new();
        script.on_prefix(
            "sudo -n -- dpkg-query",
            CmdOutput::ok("ufw config-files\n"),
        );
        let op = AptInstall {
            packages: vec!["ufw".into()],
        };
        assert_eq!(op.check(&remote(script)).await.unwrap(), Some("install ufw".into()));
    }

    #[tokio::test]
    async fn timezone_check_compares_etc_timezone() {
        let script = ScriptedTransport::new();
        script.on("sudo -n -- cat /etc/timezone", CmdOutput::ok("Etc/UTC\n"));
        let op = Timezone { zone: "Etc/UTC".into() };
        assert_eq!(op.check(&remote(script)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn timezone_missing_file_is_a_delta() {
        let script = ScriptedTransport::new();
        script.on(
            "sudo -n -- cat /etc/timezone",
            CmdOutput::err(1, "cat: /etc/timezone: No such file or directory"),
        );
        let op = Timezone { zone: "Europe/Berlin".into() };
        assert_eq!(
            op.check(&remote(script)).await.unwrap(),
            Some("set timezone Europe/Berlin".into())
        );
    }
}
