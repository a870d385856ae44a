// ── Execution-layer error types ──
//
// Errors at this layer mean "we could not talk to the host", never
// "the remote command exited non-zero" — a non-zero exit is a normal
// `CmdOutput` and its meaning belongs to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot reach {endpoint}: {detail}")]
    Connection { endpoint: String, detail: String },

    #[error("authentication failed for {endpoint}: {detail}")]
    Auth { endpoint: String, detail: String },

    #[error("command on {endpoint} timed out after {timeout_secs}s")]
    Timeout {
        endpoint: String,
        timeout_secs: u64,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command line")]
    EmptyCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by the scripted test transport when a command has no
    /// matching rule. Never produced by production backends.
    #[error("unexpected command dispatched: {command}")]
    UnexpectedCommand { command: String },
}

impl ExecError {
    /// True when the failure is about reaching or authenticating to the
    /// host rather than running a particular command.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Auth { .. } | Self::Timeout { .. }
        )
    }
}
