//! groundwork-exec: command execution against convergence targets.
//!
//! Everything groundwork does to a host goes through the [`Transport`]
//! trait: one command in, captured output out. The production backend
//! drives the OpenSSH client binary ([`ssh::SshTransport`]); a local
//! backend ([`local::LocalTransport`]) runs commands on the control
//! machine itself for development and tests.
//!
//! Transports are deliberately dumb. They know nothing about sudo,
//! idempotency, or Debian; that lives in `groundwork-core`, which
//! layers typed helpers on top of a boxed transport.

pub mod error;
pub mod local;
pub mod quote;
pub mod ssh;
pub mod transport;

#[cfg(feature = "test-util")]
pub mod script;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::ExecError;
pub use local::LocalTransport;
pub use ssh::{SshOptions, SshTransport, StrictHostKey};
pub use transport::{CmdOutput, Transport};

#[cfg(feature = "test-util")]
pub use script::ScriptedTransport;
