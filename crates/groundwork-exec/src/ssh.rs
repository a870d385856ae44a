//! OpenSSH client backend.
//!
//! Drives the system `ssh` binary rather than an in-process SSH stack:
//! operators get their existing agents, jump hosts, and `~/.ssh/config`
//! for free, and host key handling stays in one well-audited place.
//! Each call shells out once; ControlMaster multiplexing makes the
//! per-command overhead a socket round-trip after the first connection.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::error::ExecError;
use crate::quote;
use crate::transport::{CmdOutput, Transport};

/// Host key verification policy, in decreasing order of paranoia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictHostKey {
    /// Refuse unknown or changed host keys (`StrictHostKeyChecking=yes`).
    Strict,
    /// Trust-on-first-use (`StrictHostKeyChecking=accept-new`). Default:
    /// fresh servers are by definition not in known_hosts yet.
    AcceptNew,
    /// No verification. Lab use only.
    Off,
}

impl StrictHostKey {
    fn as_option(self) -> &'static str {
        match self {
            Self::Strict => "StrictHostKeyChecking=yes",
            Self::AcceptNew => "StrictHostKeyChecking=accept-new",
            Self::Off => "StrictHostKeyChecking=no",
        }
    }
}

/// Options applied to every SSH connection in a run.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Login user on the target.
    pub user: String,
    pub port: u16,
    /// Explicit private key. `None` lets ssh use its agent/config chain.
    pub identity_file: Option<PathBuf>,
    pub strict_host_key: StrictHostKey,
    pub connect_timeout: Duration,
    /// Upper bound for a single remote command.
    pub command_timeout: Duration,
    /// Connection multiplexing socket directory. `None` disables
    /// ControlMaster.
    pub control_dir: Option<PathBuf>,
    /// Raw `-o` options appended last (operator escape hatch).
    pub extra_options: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: "root".into(),
            port: 22,
            identity_file: None,
            strict_host_key: StrictHostKey::AcceptNew,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(300),
            control_dir: None,
            extra_options: Vec::new(),
        }
    }
}

impl SshOptions {
    /// Same options with a different login user. The runner uses this to
    /// switch between the bootstrap identity and the automation identity
    /// without rebuilding the rest of the option set.
    pub fn with_user(&self, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..self.clone()
        }
    }
}

/// Transport that executes commands on one host via the `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshTransport {
    address: String,
    options: SshOptions,
    endpoint: String,
}

impl SshTransport {
    pub fn new(address: impl Into<String>, options: SshOptions) -> Self {
        let address = address.into();
        let endpoint = format!("{}@{}:{}", options.user, address, options.port);
        Self {
            address,
            options,
            endpoint,
        }
    }

    /// Build the full local argv: `ssh -o ... user@host -- <command>`.
    fn build_argv(&self, remote_argv: &[String]) -> Vec<String> {
        let o = &self.options;
        let mut argv: Vec<String> = vec!["ssh".into()];

        // Never fall back to interactive prompts: an unattended fleet run
        // that stops to ask for a password is worse than one that fails.
        argv.push("-o".into());
        argv.push("BatchMode=yes".into());
        argv.push("-o".into());
        argv.push(o.strict_host_key.as_option().into());
        argv.push("-o".into());
        argv.push(format!("ConnectTimeout={}", o.connect_timeout.as_secs()));

        if let Some(ref dir) = o.control_dir {
            argv.push("-o".into());
            argv.push("ControlMaster=auto".into());
            argv.push("-o".into());
            argv.push(format!("ControlPath={}", dir.join("%C.sock").display()));
            argv.push("-o".into());
            argv.push("ControlPersist=60".into());
        }

        if let Some(ref key) = o.identity_file {
            argv.push("-i".into());
            argv.push(key.display().to_string());
            // With an explicit key, do not let the agent offer others
            // first and burn through MaxAuthTries.
            argv.push("-o".into());
            argv.push("IdentitiesOnly=yes".into());
        }

        for opt in &o.extra_options {
            argv.push("-o".into());
            argv.push(opt.clone());
        }

        argv.push("-p".into());
        argv.push(o.port.to_string());
        argv.push(format!("{}@{}", o.user, self.address));
        argv.push("--".into());
        argv.push(quote::join(remote_argv));
        argv
    }

    async fn run(&self, remote_argv: &[String], stdin: Option<&[u8]>) -> Result<CmdOutput, ExecError> {
        if remote_argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let argv = self.build_argv(remote_argv);
        trace!(endpoint = %self.endpoint, command = %quote::join(remote_argv), "ssh exec");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: "ssh".into(),
            source,
        })?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
        }

        let output = tokio::time::timeout(self.options.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout_secs: self.options.command_timeout.as_secs(),
            })??;

        let out = CmdOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        // ssh reserves 255 for its own failures; remote commands exiting
        // 255 are indistinguishable, which in practice does not happen
        // for the probe/mutate commands we issue.
        if out.status == 255 {
            return Err(self.classify_client_failure(&out));
        }
        Ok(out)
    }

    fn classify_client_failure(&self, out: &CmdOutput) -> ExecError {
        let stderr = out.stderr.trim();
        let lowered = stderr.to_ascii_lowercase();
        if lowered.contains("permission denied")
            || lowered.contains("authentication")
            || lowered.contains("host key verification failed")
        {
            ExecError::Auth {
                endpoint: self.endpoint.clone(),
                detail: stderr.into(),
            }
        } else {
            ExecError::Connection {
                endpoint: self.endpoint.clone(),
                detail: stderr.into(),
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    async fn exec(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
        self.run(argv, None).await
    }

    async fn exec_with_stdin(&self, argv: &[String], stdin: &[u8]) -> Result<CmdOutput, ExecError> {
        self.run(argv, Some(stdin)).await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_owned()).collect()
    }

    #[test]
    fn argv_contains_batch_mode_and_target() {
        let t = SshTransport::new("10.0.0.5", SshOptions::default());
        let built = t.build_argv(&argv(&["uname", "-r"]));
        assert!(built.contains(&"BatchMode=yes".to_owned()));
        assert!(built.contains(&"root@10.0.0.5".to_owned()));
        assert_eq!(built.last().unwrap(), "uname -r");
    }

    #[test]
    fn remote_command_is_quoted_as_one_word() {
        let t = SshTransport::new("10.0.0.5", SshOptions::default());
        let built = t.build_argv(&argv(&["sh", "-c", "echo a b"]));
        assert_eq!(built.last().unwrap(), "sh -c 'echo a b'");
    }

    #[test]
    fn identity_file_pins_identities_only() {
        let opts = SshOptions {
            identity_file: Some(PathBuf::from("/keys/ops_ed25519")),
            ..SshOptions::default()
        };
        let t = SshTransport::new("db1.internal", opts);
        let built = t.build_argv(&argv(&["true"]));
        let joined = built.join(" ");
        assert!(joined.contains("-i /keys/ops_ed25519"));
        assert!(joined.contains("IdentitiesOnly=yes"));
    }

    #[test]
    fn with_user_switches_login_identity() {
        let opts = SshOptions::default().with_user("deploy");
        let t = SshTransport::new("10.0.0.5", opts);
        assert_eq!(t.endpoint(), "deploy@10.0.0.5:22");
    }

    #[test]
    fn auth_failures_are_classified() {
        let t = SshTransport::new("10.0.0.5", SshOptions::default());
        let out = CmdOutput::err(255, "root@10.0.0.5: Permission denied (publickey).");
        assert!(matches!(
            t.classify_client_failure(&out),
            ExecError::Auth { .. }
        ));

        let out = CmdOutput::err(255, "ssh: connect to host 10.0.0.5 port 22: Connection refused");
        assert!(matches!(
            t.classify_client_failure(&out),
            ExecError::Connection { .. }
        ));
    }
}
