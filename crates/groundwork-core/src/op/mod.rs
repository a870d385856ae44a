//! The idempotent operation vocabulary.
//!
//! An [`Op`] is one unit of convergence with a fixed contract: inspect
//! the remote state relevant to its concern, compute the minimal delta
//! to the declared state, apply only that delta, and report whether a
//! change occurred. Check mode runs the inspection and reports what
//! would change without dispatching a single mutating command.
//!
//! Re-running an unchanged declaration must report [`Outcome::Unchanged`]
//! for every op and mutate nothing. That invariant is what the
//! integration tests pin down with a scripted transport.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;

use crate::error::OpError;
use crate::remote::Remote;

pub mod file;
pub mod hardening;
pub mod pkg;
pub mod postgres;
pub mod service;
pub mod ufw;
pub mod user;

pub use file::{Directory, FileAbsent, FileContent, Symlink};
pub use hardening::SshdHardening;
pub use pkg::{AptInstall, Timezone, UnattendedUpgrades};
pub use postgres::{PgDatabase, PgGrant, PgRole};
pub use service::{ServiceEnabled, ServiceReload};
pub use ufw::{UfwAllow, UfwDefaultDeny, UfwEnabled};
pub use user::{AuthorizedKeys, EnsureUser, PasswordHash, SudoersPolicy};

/// Label connecting change-producing ops to the handlers that react to
/// them. A [`ServiceReload`] fires only when some op carrying its tag
/// changed (or would change) earlier in the same host run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeTag(String);

impl ChangeTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChangeTag {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-host run state threaded through every op in order.
#[derive(Debug)]
pub struct RunCtx {
    /// Preview mode: inspect and report, never mutate.
    pub check_mode: bool,
    changed: HashSet<ChangeTag>,
}

impl RunCtx {
    pub fn new(check_mode: bool) -> Self {
        Self {
            check_mode,
            changed: HashSet::new(),
        }
    }

    pub fn mark(&mut self, tag: &ChangeTag) {
        self.changed.insert(tag.clone());
    }

    pub fn is_changed(&self, tag: &ChangeTag) -> bool {
        self.changed.contains(tag)
    }
}

/// What executing one op against one host produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A delta existed and was applied.
    Changed { detail: String },
    /// Live state already matched the declaration.
    Unchanged,
    /// Check mode: a delta exists but nothing was dispatched.
    WouldChange { detail: String },
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. } | Self::WouldChange { .. })
    }
}

/// Check/apply contract every plain op implements. `check` returns
/// `None` when live state matches, or a short delta description.
/// `apply` must be invoked only after `check` reported a delta and must
/// dispatch the minimal mutation; it re-probes where it needs facts the
/// check discovered (ops hold no state between the two calls).
#[async_trait]
pub(crate) trait Converge: Send + Sync {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError>;
    async fn apply(&self, remote: &Remote) -> Result<(), OpError>;
}

/// Closed vocabulary of unit operations the planner emits.
#[derive(Debug, Clone)]
pub enum Op {
    AptInstall(AptInstall),
    Timezone(Timezone),
    UnattendedUpgrades(UnattendedUpgrades),
    EnsureUser(EnsureUser),
    AuthorizedKeys(AuthorizedKeys),
    PasswordHash(PasswordHash),
    SudoersPolicy(SudoersPolicy),
    SshdHardening(SshdHardening),
    FileContent(FileContent),
    FileAbsent(FileAbsent),
    Directory(Directory),
    Symlink(Symlink),
    ServiceEnabled(ServiceEnabled),
    ServiceReload(ServiceReload),
    UfwDefaultDeny(UfwDefaultDeny),
    UfwAllow(UfwAllow),
    UfwEnabled(UfwEnabled),
    PgDatabase(PgDatabase),
    PgRole(PgRole),
    PgGrant(PgGrant),
}

impl Op {
    /// Short identifier for reports and logs, e.g. `user groundwork`.
    /// Never contains secret material.
    pub fn describe(&self) -> String {
        match self {
            Self::AptInstall(op) => format!("apt {}", op.packages.join(" ")),
            Self::Timezone(op) => format!("timezone {}", op.zone),
            Self::UnattendedUpgrades(_) => "unattended-upgrades config".into(),
            Self::EnsureUser(op) => format!("user {}", op.name),
            Self::AuthorizedKeys(op) => format!("authorized_keys {}", op.user),
            Self::PasswordHash(op) => format!("password {}", op.user),
            Self::SudoersPolicy(op) => format!("sudoers {}", op.file),
            Self::SshdHardening(_) => "sshd hardening".into(),
            Self::FileContent(op) => format!("file {}", op.path),
            Self::FileAbsent(op) => format!("absent {}", op.path),
            Self::Directory(op) => format!("directory {}", op.path),
            Self::Symlink(op) => format!("symlink {}", op.path),
            Self::ServiceEnabled(op) => format!("service {} enabled", op.unit),
            Self::ServiceReload(op) => format!("reload {}", op.unit),
            Self::UfwDefaultDeny(_) => "ufw default deny".into(),
            Self::UfwAllow(op) => format!("ufw allow {}", op.rule.spec()),
            Self::UfwEnabled(_) => "ufw enabled".into(),
            Self::PgDatabase(op) => format!("database {}", op.name),
            Self::PgRole(op) => format!("role {}", op.name),
            Self::PgGrant(op) => format!("grant {} to {}", op.database, op.role),
        }
    }

    fn as_converge(&self) -> &dyn Converge {
        match self {
            Self::AptInstall(op) => op,
            Self::Timezone(op) => op,
            Self::UnattendedUpgrades(op) => op,
            Self::EnsureUser(op) => op,
            Self::AuthorizedKeys(op) => op,
            Self::PasswordHash(op) => op,
            Self::SudoersPolicy(op) => op,
            Self::SshdHardening(op) => op,
            Self::FileContent(op) => op,
            Self::FileAbsent(op) => op,
            Self::Directory(op) => op,
            Self::Symlink(op) => op,
            Self::ServiceEnabled(op) => op,
            Self::ServiceReload(op) => op,
            Self::UfwDefaultDeny(op) => op,
            Self::UfwAllow(op) => op,
            Self::UfwEnabled(op) => op,
            Self::PgDatabase(op) => op,
            Self::PgRole(op) => op,
            Self::PgGrant(op) => op,
        }
    }

    /// Tag this op marks when it changes, if any.
    fn change_tag(&self) -> Option<&ChangeTag> {
        match self {
            Self::FileContent(op) => op.tag.as_ref(),
            Self::FileAbsent(op) => op.tag.as_ref(),
            Self::Symlink(op) => op.tag.as_ref(),
            _ => None,
        }
    }

    /// Run the check/apply cycle for this op.
    pub async fn execute(&self, remote: &Remote, ctx: &mut RunCtx) -> Result<Outcome, OpError> {
        // The reload handler consults the tag set instead of remote
        // state, so it bypasses the plain check/apply flow.
        if let Self::ServiceReload(op) = self {
            return op.run_handler(remote, ctx).await;
        }

        let delta = self.as_converge().check(remote).await?;
        let Some(detail) = delta else {
            return Ok(Outcome::Unchanged);
        };

        if let Some(tag) = self.change_tag() {
            ctx.mark(tag);
        }
        if ctx.check_mode {
            return Ok(Outcome::WouldChange { detail });
        }
        self.as_converge().apply(remote).await?;
        Ok(Outcome::Changed { detail })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn describe_never_leaks_credentials() {
        let op = Op::PasswordHash(PasswordHash {
            user: "admin".into(),
            hash: "$6$salt$secret".into(),
        });
        assert_eq!(op.describe(), "password admin");

        let op = Op::PgRole(PgRole {
            name: "app".into(),
            digest: "md5d0e4c2420b2f2ab1e3f90a2b3c4d5e6f".into(),
        });
        assert_eq!(op.describe(), "role app");
    }

    #[test]
    fn run_ctx_tracks_tags() {
        let mut ctx = RunCtx::new(false);
        let tag = ChangeTag::from("proxy");
        assert!(!ctx.is_changed(&tag));
        ctx.mark(&tag);
        assert!(ctx.is_changed(&tag));
    }
}
