//! Local process backend.
//!
//! Runs argv directly on the control machine. Development and test
//! backend only -- the fleet runner always goes through SSH.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::error::ExecError;
use crate::transport::{CmdOutput, Transport};

/// Transport that executes commands on the local machine.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    timeout: Duration,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn spawn(&self, argv: &[String], stdin: Option<&[u8]>) -> Result<CmdOutput, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        trace!(command = %crate::quote::join(argv), "local exec");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                endpoint: "local".into(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        Ok(CmdOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn exec(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
        self.spawn(argv, None).await
    }

    async fn exec_with_stdin(&self, argv: &[String], stdin: &[u8]) -> Result<CmdOutput, ExecError> {
        self.spawn(argv, Some(stdin)).await
    }

    fn endpoint(&self) -> &str {
        "local"
    }
}
