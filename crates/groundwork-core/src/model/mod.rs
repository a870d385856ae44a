// ── Desired-state model ──
//
// Every type in this module is a declarative record: it describes what a
// host should look like, never what it currently looks like. Live state
// is only ever observed inside op checks, immediately before a delta is
// computed. The planner consumes these records; nothing here talks to a
// transport.

pub mod app;
pub mod base;
pub mod database;
pub mod firewall;
pub mod host;
pub mod host_config;
pub mod identity;
pub mod secrets;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use groundwork_core::model::*` gives you everything.

pub use app::{AppDescriptor, AppPaths};
pub use base::BaseConfig;
pub use database::{DatabaseConfig, DatabaseSpec, DbUserSpec, GrantScope, GrantSpec};
pub use firewall::{AllowRule, Fail2banConfig, FirewallConfig, Proto};
pub use host::{HostEntry, Role};
pub use host_config::HostConfig;
pub use identity::{Elevation, IdentitySpec};
pub use secrets::RunSecrets;
