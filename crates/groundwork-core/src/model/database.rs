use serde::{Deserialize, Serialize};

/// A database that must exist. Creation is additive: an existing
/// database is never dropped, recreated, or re-owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub name: String,
    /// Owning role, created by a [`DbUserSpec`] in the same declaration.
    pub owner: String,
}

/// Privilege scope of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantScope {
    /// ALL PRIVILEGES on the database.
    #[default]
    All,
    /// CONNECT only.
    Connect,
}

/// One grant of a scope on a database to a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSpec {
    pub database: String,
    #[serde(default)]
    pub scope: GrantScope,
}

/// A login role that must exist with a declared credential.
///
/// The credential itself never appears here; `password_ref` names an
/// entry in the environment's secret bundle, resolved at plan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbUserSpec {
    pub name: String,
    pub password_ref: String,
    #[serde(default)]
    pub grants: Vec<GrantSpec>,
}

/// Everything the database stages reconcile on a database host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub databases: Vec<DatabaseSpec>,
    pub users: Vec<DbUserSpec>,
}
