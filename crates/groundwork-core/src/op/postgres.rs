// ── PostgreSQL catalog reconciliation ──
//
// All probes and mutations run as the `postgres` system account via
// psql. Reads go through `-tAc`; mutations travel on stdin with
// ON_ERROR_STOP so a credential digest never appears in an argv.
// Database and role names come from validated declarations
// (`[a-z_][a-z0-9_]*`), so embedding them in SQL is safe.
//
// Reconciliation is additive: an existing database is never dropped,
// recreated, or re-owned, and an existing role's credential is touched
// only when the declared one differs.

use async_trait::async_trait;
use md5::{Digest, Md5};

use super::Converge;
use crate::error::OpError;
use crate::model::GrantScope;
use crate::remote::{Remote, ensure_success};

/// The digest form PostgreSQL stores for md5 auth:
/// `"md5" + md5(password + username)`.
///
/// Computed at plan-build time so ops carry the digest, never the
/// cleartext. A role stored in SCRAM form cannot be compared against
/// this and converges once to the md5 form, after which it is stable.
pub fn md5_password_digest(username: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(username.as_bytes());
    format!("md5{:x}", hasher.finalize())
}

async fn query(remote: &Remote, sql: &str) -> Result<String, OpError> {
    let out = remote
        .run_as("postgres", &["psql", "-X", "-tA", "-c", sql])
        .await?;
    // Probe queries carry no secret material, so the SQL can appear in
    // the error.
    ensure_success(&format!("psql -c \"{sql}\""), &out)?;
    Ok(out.stdout_trimmed().to_owned())
}

async fn execute(remote: &Remote, sql: &str) -> Result<(), OpError> {
    let out = remote
        .run_as_with_stdin(
            "postgres",
            &["psql", "-X", "-q", "-v", "ON_ERROR_STOP=1", "-f", "-"],
            sql.as_bytes(),
        )
        .await?;
    ensure_success("psql -f -", &out)
}

/// A database that must exist. Existing databases are left exactly as
/// they are, owner included.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pub name: String,
    pub owner: String,
}

#[async_trait]
impl Converge for PgDatabase {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let sql = format!("SELECT 1 FROM pg_database WHERE datname = '{}'", self.name);
        if query(remote, &sql).await? == "1" {
            Ok(None)
        } else {
            Ok(Some(format!("create database {}", self.name)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let sql = format!("CREATE DATABASE \"{}\" OWNER \"{}\";\n", self.name, self.owner);
        execute(remote, &sql).await
    }
}

/// A login role with a declared credential digest.
#[derive(Debug, Clone)]
pub struct PgRole {
    pub name: String,
    /// md5 digest form, from [`md5_password_digest`].
    pub digest: String,
}

impl PgRole {
    async fn exists(&self, remote: &Remote) -> Result<bool, OpError> {
        let sql = format!("SELECT 1 FROM pg_roles WHERE rolname = '{}'", self.name);
        Ok(query(remote, &sql).await? == "1")
    }
}

#[async_trait]
impl Converge for PgRole {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        if !self.exists(remote).await? {
            return Ok(Some(format!("create role {}", self.name)));
        }
        let sql = format!(
            "SELECT rolpassword FROM pg_authid WHERE rolname = '{}'",
            self.name
        );
        if query(remote, &sql).await? == self.digest {
            Ok(None)
        } else {
            Ok(Some(format!("update credential for {}", self.name)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let sql = if self.exists(remote).await? {
            format!(
                "ALTER ROLE \"{}\" WITH LOGIN PASSWORD '{}';\n",
                self.name, self.digest
            )
        } else {
            format!(
                "CREATE ROLE \"{}\" LOGIN PASSWORD '{}';\n",
                self.name, self.digest
            )
        };
        execute(remote, &sql).await
    }
}

/// A grant of a privilege scope on a database to a role.
#[derive(Debug, Clone)]
pub struct PgGrant {
    pub role: String,
    pub database: String,
    pub scope: GrantScope,
}

impl PgGrant {
    fn privileges(&self) -> &'static [&'static str] {
        match self.scope {
            GrantScope::All => &["CREATE", "CONNECT", "TEMPORARY"],
            GrantScope::Connect => &["CONNECT"],
        }
    }
}

#[async_trait]
impl Converge for PgGrant {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let checks: Vec<String> = self
            .privileges()
            .iter()
            .map(|p| {
                format!(
                    "has_database_privilege('{}', '{}', '{p}')",
                    self.role, self.database
                )
            })
            .collect();
        let sql = format!("SELECT {}", checks.join(" AND "));
        if query(remote, &sql).await? == "t" {
            Ok(None)
        } else {
            Ok(Some(format!("grant {} to {}", self.database, self.role)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let privileges = match self.scope {
            GrantScope::All => "ALL PRIVILEGES",
            GrantScope::Connect => "CONNECT",
        };
        let sql = format!(
            "GRANT {privileges} ON DATABASE \"{}\" TO \"{}\";\n",
            self.database, self.role
        );
        execute(remote, &sql).await
    }
}
