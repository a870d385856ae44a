// ── Packet filter (ufw) ──
//
// Probe order matters for safety: the plan declares defaults, then the
// allow rules, then enablement, so the filter never goes active before
// SSH is allowed. Rules are probed via `ufw show added` because
// `ufw status` hides rules while the firewall is still inactive.

use async_trait::async_trait;

use super::Converge;
use crate::error::OpError;
use crate::model::AllowRule;
use crate::remote::{Remote, ensure_success};

/// Default-deny inbound, allow outbound.
#[derive(Debug, Clone, Default)]
pub struct UfwDefaultDeny {}

#[async_trait]
impl Converge for UfwDefaultDeny {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote
            .run(&["grep", "-E", "^DEFAULT_(INPUT|OUTPUT)_POLICY", "/etc/default/ufw"])
            .await?;
        if !out.success() {
            return Ok(Some("set default policies".into()));
        }
        let mut input_drop = false;
        let mut output_accept = false;
        for line in out.stdout.lines() {
            let value = line.split('=').nth(1).unwrap_or("").trim_matches('"');
            if line.starts_with("DEFAULT_INPUT_POLICY") {
                input_drop = value == "DROP";
            } else if line.starts_with("DEFAULT_OUTPUT_POLICY") {
                output_accept = value == "ACCEPT";
            }
        }
        if input_drop && output_accept {
            Ok(None)
        } else {
            Ok(Some("default deny incoming, allow outgoing".into()))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let out = remote.run(&["ufw", "default", "deny", "incoming"]).await?;
        ensure_success("ufw default deny incoming", &out)?;
        let out = remote.run(&["ufw", "default", "allow", "outgoing"]).await?;
        ensure_success("ufw default allow outgoing", &out)
    }
}

/// One inbound allow rule present in the rule set.
#[derive(Debug, Clone)]
pub struct UfwAllow {
    pub rule: AllowRule,
}

#[async_trait]
impl Converge for UfwAllow {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["ufw", "show", "added"]).await?;
        ensure_success("ufw show added", &out)?;
        let spec = self.rule.spec();
        let present = out.stdout.lines().any(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            tokens.contains(&"allow") && tokens.contains(&spec.as_str())
        });
        if present {
            Ok(None)
        } else {
            Ok(Some(format!("allow {spec}")))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let spec = self.rule.spec();
        let mut argv = vec!["ufw", "allow", &spec];
        if let Some(comment) = &self.rule.comment {
            argv.push("comment");
            argv.push(comment);
        }
        let out = remote.run(&argv).await?;
        ensure_success(&format!("ufw allow {spec}"), &out)
    }
}

/// The firewall is active.
#[derive(Debug, Clone, Default)]
pub struct UfwEnabled {}

#[async_trait]
impl Converge for UfwEnabled {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["ufw", "status"]).await?;
        ensure_success("ufw status", &out)?;
        if out.stdout.lines().next() == Some("Status: active") {
            Ok(None)
        } else {
            Ok(Some("enable firewall".into()))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        // --force skips the "may disrupt existing ssh connections"
        // prompt, which would hang an unattended run.
        let out = remote.run(&["ufw", "--force", "enable"]).await?;
        ensure_success("ufw --force enable", &out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use groundwork_exec::{CmdOutput, ScriptedTransport};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::Proto;
    use crate::remote::Escalation;

    fn remote(script: ScriptedTransport) -> Remote {
        Remote::new(Arc::new(script), Escalation::Sudo, "test")
    }

    fn allow(port: u16) -> UfwAllow {
        UfwAllow {
            rule: AllowRule {
                port,
                proto: Proto::Tcp,
                comment: None,
            },
        }
    }

    #[tokio::test]
    async fn default_policies_already_set_is_unchanged() {
        let script = ScriptedTransport::new();
        script.on_prefix(
            "sudo -n -- grep -E",
            CmdOutput::ok("DEFAULT_INPUT_POLICY=\"DROP\"\nDEFAULT_OUTPUT_POLICY=\"ACCEPT\"\n"),
        );
        let op = UfwDefaultDeny::default();
        assert_eq!(op.check(&remote(script)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn accept_input_policy_is_a_delta() {
        let script = ScriptedTransport::new();
        script.on_prefix(
            "sudo -n -- grep -E",
            CmdOutput::ok("DEFAULT_INPUT_POLICY=\"ACCEPT\"\nDEFAULT_OUTPUT_POLICY=\"ACCEPT\"\n"),
        );
        let op = UfwDefaultDeny::default();
        assert!(op.check(&remote(script)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn added_rule_is_unchanged_even_while_inactive() {
        let script = ScriptedTransport::new();
        script.on(
            "sudo -n -- ufw show added",
            CmdOutput::ok("Added user rules (see 'ufw status' for running firewall):\nufw allow 22/tcp\n"),
        );
        assert_eq!(allow(22).check(&remote(script)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_rule_is_a_delta() {
        let script = ScriptedTransport::new();
        script.on(
            "sudo -n -- ufw show added",
            CmdOutput::ok("Added user rules (see 'ufw status' for running firewall):\nufw allow 22/tcp\n"),
        );
        assert_eq!(
            allow(443).check(&remote(script)).await.unwrap(),
            Some("allow 443/tcp".into())
        );
    }

    #[tokio::test]
    async fn port_substring_does_not_false_match() {
        // 22/tcp present must not satisfy a 2/tcp or 222/tcp rule.
        let script = ScriptedTransport::new();
        script.on(
            "sudo -n -- ufw show added",
            CmdOutput::ok("ufw allow 222/tcp\n"),
        );
        assert!(allow(22).check(&remote(script)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn inactive_firewall_is_a_delta() {
        let script = ScriptedTransport::new();
        script.on("sudo -n -- ufw status", CmdOutput::ok("Status: inactive\n"));
        let op = UfwEnabled::default();
        assert_eq!(
            op.check(&remote(script)).await.unwrap(),
            Some("enable firewall".into())
        );
    }

    #[tokio::test]
    async fn enable_uses_force_to_stay_noninteractive() {
        let script = Arc::new(ScriptedTransport::new());
        script.on("sudo -n -- ufw --force enable", CmdOutput::ok("Firewall is active\n"));
        let remote = Remote::new(script.clone(), Escalation::Sudo, "test");

        UfwEnabled::default().apply(&remote).await.unwrap();
        assert!(script.saw("--force enable"));
    }
}
