// ── systemd unit state and the reload handler ──

use async_trait::async_trait;

use super::{ChangeTag, Converge, Outcome, RunCtx};
use crate::error::OpError;
use crate::remote::{Remote, ensure_success};

/// A unit that must be enabled and running.
#[derive(Debug, Clone)]
pub struct ServiceEnabled {
    pub unit: String,
}

#[async_trait]
impl Converge for ServiceEnabled {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let enabled = remote.run(&["systemctl", "is-enabled", "--", &self.unit]).await?;
        let active = remote.run(&["systemctl", "is-active", "--", &self.unit]).await?;
        let enabled_ok = enabled.success() && enabled.stdout_trimmed() == "enabled";
        let active_ok = active.success() && active.stdout_trimmed() == "active";
        if enabled_ok && active_ok {
            Ok(None)
        } else {
            Ok(Some(format!("enable and start {}", self.unit)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let out = remote
            .run(&["systemctl", "enable", "--now", "--", &self.unit])
            .await?;
        ensure_success(&format!("systemctl enable --now {}", self.unit), &out)
    }
}

/// Handler: reload a unit only when an op carrying the tag changed (or
/// would change) earlier in this host run. Consults the run context
/// instead of remote state, so it bypasses the plain check/apply flow.
#[derive(Debug, Clone)]
pub struct ServiceReload {
    pub unit: String,
    pub if_changed: ChangeTag,
    /// Config validation run before the reload (e.g. `nginx -t`); a
    /// failure aborts the reload and fails the op.
    pub validate: Option<Vec<String>>,
}

impl ServiceReload {
    pub(crate) async fn run_handler(
        &self,
        remote: &Remote,
        ctx: &RunCtx,
    ) -> Result<Outcome, OpError> {
        if !ctx.is_changed(&self.if_changed) {
            return Ok(Outcome::Unchanged);
        }
        let detail = format!("reload {}", self.unit);
        if ctx.check_mode {
            return Ok(Outcome::WouldChange { detail });
        }
        if let Some(validate) = &self.validate {
            let argv: Vec<&str> = validate.iter().map(String::as_str).collect();
            let out = remote.run(&argv).await?;
            ensure_success(&validate.join(" "), &out)?;
        }
        let out = remote
            .run(&["systemctl", "reload-or-restart", "--", &self.unit])
            .await?;
        ensure_success(&format!("systemctl reload-or-restart {}", self.unit), &out)?;
        Ok(Outcome::Changed { detail })
    }
}

// The enum dispatch requires the trait, but the handler path never
// reaches these.
#[async_trait]
impl Converge for ServiceReload {
    async fn check(&self, _remote: &Remote) -> Result<Option<String>, OpError> {
        Ok(None)
    }

    async fn apply(&self, _remote: &Remote) -> Result<(), OpError> {
        Ok(())
    }
}
