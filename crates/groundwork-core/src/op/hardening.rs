// ── SSH lockdown ──
//
// The one op that can cut off access to a host, so it carries its own
// safety interlock: before the lockdown drop-in is written, the
// automation identity must already have a non-empty authorized_keys on
// the host. The planner additionally orders this op after the key
// install inside the base stage; the apply-time guard covers the case
// where that earlier op failed or a previous run was interrupted.

use async_trait::async_trait;

use super::Converge;
use super::file;
use super::user::home_dir;
use crate::error::OpError;
use crate::remote::{Remote, ensure_success};

use groundwork_exec::quote::quote;

const DROP_IN_PATH: &str = "/etc/ssh/sshd_config.d/50-groundwork.conf";

/// Lockdown drop-in: no root login, no password auth.
#[derive(Debug, Clone)]
pub struct SshdHardening {
    pub content: String,
    /// Identity whose key must be installed before the lockdown lands.
    pub automation_user: String,
}

impl SshdHardening {
    /// The standard lockdown content the base plan declares.
    pub fn default_content() -> String {
        "PermitRootLogin no\n\
         PasswordAuthentication no\n\
         KbdInteractiveAuthentication no\n\
         X11Forwarding no\n"
            .to_owned()
    }

    async fn guard_automation_access(&self, remote: &Remote) -> Result<(), OpError> {
        let reason = format!(
            "automation identity `{}` has no authorized key on this host; applying the SSH lockdown now would make it unreachable",
            self.automation_user
        );
        let Some(home) = home_dir(remote, &self.automation_user).await? else {
            return Err(OpError::Guard { reason });
        };
        let keyfile = format!("{home}/.ssh/authorized_keys");
        let out = remote.sh(&format!("test -s {}", quote(&keyfile))).await?;
        if out.success() {
            Ok(())
        } else {
            Err(OpError::Guard { reason })
        }
    }
}

#[async_trait]
impl Converge for SshdHardening {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let desired = file::local_sha256(self.content.as_bytes());
        if file::remote_sha256(remote, DROP_IN_PATH).await?.as_deref() == Some(desired.as_str()) {
            Ok(None)
        } else {
            Ok(Some(format!("write {DROP_IN_PATH} and reload sshd")))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        self.guard_automation_access(remote).await?;

        file::upload(remote, DROP_IN_PATH, self.content.as_bytes(), "root", "root", "644").await?;

        let validate = remote.run(&["sshd", "-t"]).await?;
        if !validate.success() {
            // Back the broken drop-in out so the daemon keeps reloading
            // cleanly; the validation error is the one worth reporting.
            let _ = remote.run(&["rm", "-f", "--", DROP_IN_PATH]).await;
            return ensure_success("sshd -t", &validate);
        }

        let reload = remote.run(&["systemctl", "reload", "ssh"]).await?;
        ensure_success("systemctl reload ssh", &reload)
    }
}
