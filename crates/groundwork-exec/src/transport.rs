// ── Transport abstraction ──
//
// A transport runs one command on one target and captures its output.
// Implementations: SshTransport (production), LocalTransport (dev/tests),
// ScriptedTransport (tests, behind `test-util`).
//
// A non-zero exit status is NOT a transport error. Convergence checks
// routinely probe with commands that are expected to fail ("does this
// user exist?"), so the exit code travels back inside `CmdOutput` and
// the caller decides what it means.

use async_trait::async_trait;

use crate::error::ExecError;

/// Captured result of a remote (or local) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    /// Process exit code. `-1` when the process died without one.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// Successful output with the given stdout. Test/builder convenience.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn err(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True when the command exited 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout with trailing whitespace removed -- virtually every probe
    /// command we parse emits a single line plus newline.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end()
    }
}

/// Command execution against a single convergence target.
///
/// Object-safe so higher layers can hold `Arc<dyn Transport>` and swap
/// backends freely (SSH in production, scripted fakes in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `argv` on the target and capture its output.
    async fn exec(&self, argv: &[String]) -> Result<CmdOutput, ExecError>;

    /// Run `argv` with `stdin` piped to the process. Used for content
    /// uploads and for anything secret-bearing that must stay out of
    /// argv (password hashes, SQL with credentials).
    async fn exec_with_stdin(&self, argv: &[String], stdin: &[u8]) -> Result<CmdOutput, ExecError>;

    /// Human-readable endpoint for logs and error messages
    /// (e.g. `deploy@10.0.0.10:22`, `local`).
    fn endpoint(&self) -> &str;
}
