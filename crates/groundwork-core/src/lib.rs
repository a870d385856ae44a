//! Convergence engine between the config layer and the CLI.
//!
//! This crate owns the desired-state model, the idempotent operation
//! vocabulary, and the machinery that drives a fleet toward its
//! declaration:
//!
//! - **[`Plan`]** — Per-host execution plan: stage selection from the
//!   workflow scope and the host's roles, dependency ordering over the
//!   explicit stage graph, then op synthesis. Built offline; planning
//!   errors surface before any connection is opened.
//!
//! - **[`Op`]** — Closed vocabulary of unit operations, each honoring
//!   the same contract: probe live state, compute the minimal delta,
//!   apply only that delta, report [`Outcome`]. Check mode stops after
//!   the probe and never mutates.
//!
//! - **[`Remote`]** — Escalation-aware command helpers over a
//!   `groundwork_exec` transport. Bootstrap runs connect as root;
//!   steady-state runs connect as the automation identity and elevate
//!   with `sudo -n`.
//!
//! - **[`Runner`]** — Concurrent driver: at most `forks` hosts in
//!   flight, each strictly sequential through its plan, fail-fast
//!   cancellation of unstarted hosts, progress over a [`RunEvent`]
//!   channel, and a serializable [`RunReport`] at the end.

pub mod error;
pub mod model;
pub mod op;
pub mod plan;
pub mod remote;
pub mod report;
pub mod runner;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::{OpError, PlanError, RunError};
pub use op::{ChangeTag, Op, Outcome, RunCtx};
pub use plan::{Plan, Stage, StageName, StageScope};
pub use remote::{Escalation, Remote};
pub use report::{
    FailureClass, HostOutcome, HostReport, OpReport, OpStatus, RunReport, StageReport,
};
pub use runner::{FailurePolicy, HostTarget, RunEvent, RunOptions, Runner};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AllowRule,
    AppDescriptor,
    AppPaths,
    BaseConfig,
    DatabaseConfig,
    DatabaseSpec,
    DbUserSpec,
    Elevation,
    Fail2banConfig,
    FirewallConfig,
    GrantScope,
    GrantSpec,
    HostConfig,
    HostEntry,
    IdentitySpec,
    Proto,
    Role,
    RunSecrets,
};
