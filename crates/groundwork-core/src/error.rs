// ── Core error types ──
//
// Reconciliation errors carry enough context to identify which declared
// entity failed on which host; the CLI maps them onto its exit-code
// classes. Transport failures pass through untranslated so the runner
// can distinguish "host unreachable" from "delta could not be applied".

use thiserror::Error;

use groundwork_exec::ExecError;

/// Failure of a single unit operation against one host.
#[derive(Debug, Error)]
pub enum OpError {
    /// A remote command exited non-zero where success was required.
    #[error("`{command}` exited {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// A probe produced output the op cannot interpret.
    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    /// A safety precondition refused the apply. The op made no change.
    #[error("refusing to apply: {reason}")]
    Guard { reason: String },

    #[error(transparent)]
    Transport(#[from] ExecError),
}

impl OpError {
    /// Whether the failure means the host itself is unreachable rather
    /// than a reconciliation problem on a reachable host.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_unreachable())
    }
}

/// Failure while building a plan. Raised before any connection is made.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("stage dependency cycle involving `{stage}`")]
    Cycle { stage: String },

    #[error("proxy template for app `{app}` failed to render")]
    Template {
        app: String,
        #[source]
        source: Box<minijinja::Error>,
    },

    #[error("secret reference `{reference}` is not present in the bundle")]
    MissingSecret { reference: String },

    #[error("administration identity `{name}` has no password hash in the bundle")]
    MissingAdminHash { name: String },
}

/// Failure of one host's run, locating the failing stage and op.
#[derive(Debug, Error)]
#[error("host `{host}` failed in stage `{stage}` at {op}: {source}")]
pub struct RunError {
    pub host: String,
    pub stage: String,
    /// Short description of the failing op, e.g. `user groundwork`.
    pub op: String,
    #[source]
    pub source: OpError,
}
