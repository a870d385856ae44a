//! Escalation-aware command helpers over a transport.
//!
//! Ops talk to hosts exclusively through [`Remote`], which prepends the
//! privilege-escalation prefix the connection identity requires. A
//! bootstrap run connects as root and needs none; every later run
//! connects as the automation identity and elevates with `sudo -n`
//! (non-interactive: a sudo password prompt in an unattended run is a
//! bug, so `-n` turns it into a visible failure instead).

use std::sync::Arc;

use groundwork_exec::{CmdOutput, Transport};

use crate::error::OpError;

/// How commands gain root on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Connection identity already is root (bootstrap runs).
    None,
    /// Prefix every command with `sudo -n --`.
    Sudo,
}

/// One host, one connection identity, one escalation policy.
#[derive(Clone)]
pub struct Remote {
    transport: Arc<dyn Transport>,
    escalation: Escalation,
    host: String,
}

impl Remote {
    pub fn new(transport: Arc<dyn Transport>, escalation: Escalation, host: impl Into<String>) -> Self {
        Self {
            transport,
            escalation,
            host: host.into(),
        }
    }

    /// Inventory name of the host, for logs and reports.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn escalate(&self, argv: &[String]) -> Vec<String> {
        match self.escalation {
            Escalation::None => argv.to_vec(),
            Escalation::Sudo => {
                let mut full = vec!["sudo".to_owned(), "-n".to_owned(), "--".to_owned()];
                full.extend_from_slice(argv);
                full
            }
        }
    }

    fn escalate_as(&self, user: &str, argv: &[String]) -> Vec<String> {
        let mut full = match self.escalation {
            // Already root; runuser drops to the target account.
            Escalation::None => vec![
                "runuser".to_owned(),
                "-u".to_owned(),
                user.to_owned(),
                "--".to_owned(),
            ],
            Escalation::Sudo => vec![
                "sudo".to_owned(),
                "-n".to_owned(),
                "-u".to_owned(),
                user.to_owned(),
                "--".to_owned(),
            ],
        };
        full.extend_from_slice(argv);
        full
    }

    /// Run a command as root.
    pub async fn run(&self, argv: &[&str]) -> Result<CmdOutput, OpError> {
        let owned = to_owned(argv);
        Ok(self.transport.exec(&self.escalate(&owned)).await?)
    }

    /// Run a command as root with bytes piped to stdin.
    pub async fn run_with_stdin(&self, argv: &[&str], stdin: &[u8]) -> Result<CmdOutput, OpError> {
        let owned = to_owned(argv);
        Ok(self
            .transport
            .exec_with_stdin(&self.escalate(&owned), stdin)
            .await?)
    }

    /// Run a shell script fragment as root (`sh -c <script>`).
    pub async fn sh(&self, script: &str) -> Result<CmdOutput, OpError> {
        self.run(&["sh", "-c", script]).await
    }

    /// Run a shell script fragment as root with piped stdin.
    pub async fn sh_with_stdin(&self, script: &str, stdin: &[u8]) -> Result<CmdOutput, OpError> {
        self.run_with_stdin(&["sh", "-c", script], stdin).await
    }

    /// Run a command as another account (e.g. `postgres`).
    pub async fn run_as(&self, user: &str, argv: &[&str]) -> Result<CmdOutput, OpError> {
        let owned = to_owned(argv);
        Ok(self.transport.exec(&self.escalate_as(user, &owned)).await?)
    }

    /// Run a command as another account with piped stdin.
    pub async fn run_as_with_stdin(
        &self,
        user: &str,
        argv: &[&str],
        stdin: &[u8],
    ) -> Result<CmdOutput, OpError> {
        let owned = to_owned(argv);
        Ok(self
            .transport
            .exec_with_stdin(&self.escalate_as(user, &owned), stdin)
            .await?)
    }
}

fn to_owned(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|a| (*a).to_owned()).collect()
}

/// Require success from a command whose failure is an op failure.
pub fn ensure_success(command: &str, out: &CmdOutput) -> Result<(), OpError> {
    if out.success() {
        Ok(())
    } else {
        Err(OpError::CommandFailed {
            command: command.to_owned(),
            status: out.status,
            stderr: out.stderr.trim().to_owned(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use groundwork_exec::{CmdOutput, ScriptedTransport};
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn sudo_escalation_prefixes_commands() {
        let script = ScriptedTransport::new();
        script.on("sudo -n -- id -u", CmdOutput::ok("0\n"));
        let remote = Remote::new(Arc::new(script), Escalation::Sudo, "web1");

        let out = remote.run(&["id", "-u"]).await.unwrap();
        assert_eq!(out.stdout_trimmed(), "0");
    }

    #[tokio::test]
    async fn root_connection_runs_bare_commands() {
        let script = ScriptedTransport::new();
        script.on("id -u", CmdOutput::ok("0\n"));
        let remote = Remote::new(Arc::new(script), Escalation::None, "web1");

        assert!(remote.run(&["id", "-u"]).await.is_ok());
    }

    #[tokio::test]
    async fn run_as_uses_runuser_when_root() {
        let script = ScriptedTransport::new();
        script.on_prefix("runuser -u postgres -- psql", CmdOutput::ok("1\n"));
        let remote = Remote::new(Arc::new(script), Escalation::None, "db1");

        let out = remote.run_as("postgres", &["psql", "-tAc", "SELECT 1"]).await.unwrap();
        assert_eq!(out.stdout_trimmed(), "1");
    }

    #[tokio::test]
    async fn run_as_uses_sudo_user_flag_otherwise() {
        let script = ScriptedTransport::new();
        script.on_prefix("sudo -n -u postgres -- psql", CmdOutput::ok("1\n"));
        let remote = Remote::new(Arc::new(script), Escalation::Sudo, "db1");

        assert!(remote.run_as("postgres", &["psql", "-tAc", "SELECT 1"]).await.is_ok());
    }

    #[test]
    fn ensure_success_reports_command_and_stderr() {
        let out = CmdOutput::err(1, "visudo: parse error\n");
        let err = ensure_success("visudo -c", &out).unwrap_err();
        match err {
            OpError::CommandFailed { command, status, stderr } => {
                assert_eq!(command, "visudo -c");
                assert_eq!(status, 1);
                assert_eq!(stderr, "visudo: parse error");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
