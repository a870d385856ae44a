//! Pre-flight validation.
//!
//! Everything here runs before a connection is attempted and fails
//! fast: the first problem aborts the run with nothing touched. Checks
//! that need the decrypted bundle are split out so inventory rendering
//! and linting work without a passphrase.

use std::collections::BTreeSet;

use groundwork_core::{HostConfig, IdentitySpec};

use crate::inventory::Inventory;
use crate::secrets::SecretBundle;
use crate::ConfigError;

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Unix account names: lowercase, may carry digits, `_`, `-`.
fn is_account_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// PostgreSQL identifiers as the ops embed them in SQL.
fn is_pg_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_identity(identity: &IdentitySpec, field: &str) -> Result<(), ConfigError> {
    if !is_account_name(&identity.name) {
        return Err(invalid(
            format!("{field}.name"),
            format!("`{}` is not a valid account name", identity.name),
        ));
    }
    if identity.keys.is_empty() {
        return Err(invalid(
            format!("{field}.keys"),
            "at least one SSH public key is required",
        ));
    }
    if identity.keys.iter().any(|k| k.trim().is_empty()) {
        return Err(invalid(format!("{field}.keys"), "empty key entry"));
    }
    Ok(())
}

/// Structural validation of one host's merged desired state.
pub fn validate_host_config(cfg: &HostConfig) -> Result<(), ConfigError> {
    check_identity(&cfg.base.automation, "base.automation")?;
    check_identity(&cfg.base.admin, "base.admin")?;
    if cfg.base.automation.name == cfg.base.admin.name {
        return Err(invalid(
            "base.admin.name",
            "automation and administration identities must be distinct accounts",
        ));
    }
    if cfg.base.timezone.trim().is_empty() {
        return Err(invalid("base.timezone", "must not be empty"));
    }

    for rule in &cfg.firewall.allow {
        if rule.port == 0 {
            return Err(invalid("firewall.allow", "port 0 is not a real port"));
        }
    }
    if cfg.fail2ban.maxretry == 0 {
        return Err(invalid("fail2ban.maxretry", "must be at least 1"));
    }

    validate_apps(cfg)?;
    validate_database(cfg)
}

fn validate_apps(cfg: &HostConfig) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for app in &cfg.apps {
        if !is_account_name(&app.name) {
            return Err(invalid(
                "apps.name",
                format!("`{}` is not usable as a path segment and account name", app.name),
            ));
        }
        if !seen.insert(app.name.as_str()) {
            return Err(invalid(
                "apps.name",
                format!("`{}` is declared twice", app.name),
            ));
        }
        if app.domain.trim().is_empty() {
            return Err(invalid(
                format!("apps.{}.domain", app.name),
                "must not be empty",
            ));
        }
        if app.port == 0 {
            return Err(invalid(
                format!("apps.{}.port", app.name),
                "port 0 is not a real port",
            ));
        }
        let run_user = app.runtime_user();
        if !is_account_name(run_user) {
            return Err(invalid(
                format!("apps.{}.run_user", app.name),
                format!("`{run_user}` is not a valid account name"),
            ));
        }
        // The runtime identity is nologin; colliding with a login
        // identity would lock that identity out.
        if run_user == cfg.base.automation.name || run_user == cfg.base.admin.name {
            return Err(invalid(
                format!("apps.{}.run_user", app.name),
                format!("`{run_user}` collides with a base identity"),
            ));
        }
    }
    Ok(())
}

fn validate_database(cfg: &HostConfig) -> Result<(), ConfigError> {
    let mut users = BTreeSet::new();
    for user in &cfg.database.users {
        if !is_pg_identifier(&user.name) {
            return Err(invalid(
                "database.users.name",
                format!("`{}` is not a valid role name", user.name),
            ));
        }
        if !users.insert(user.name.as_str()) {
            return Err(invalid(
                "database.users.name",
                format!("`{}` is declared twice", user.name),
            ));
        }
        if user.password_ref.trim().is_empty() {
            return Err(invalid(
                format!("database.users.{}.password_ref", user.name),
                "must not be empty",
            ));
        }
    }

    let mut databases = BTreeSet::new();
    for db in &cfg.database.databases {
        if !is_pg_identifier(&db.name) {
            return Err(invalid(
                "database.databases.name",
                format!("`{}` is not a valid database name", db.name),
            ));
        }
        if !databases.insert(db.name.as_str()) {
            return Err(invalid(
                "database.databases.name",
                format!("`{}` is declared twice", db.name),
            ));
        }
        if !users.contains(db.owner.as_str()) {
            return Err(invalid(
                format!("database.databases.{}.owner", db.name),
                format!("`{}` is not a declared database user", db.owner),
            ));
        }
    }
    Ok(())
}

/// Check that every secret the config references exists in the bundle.
/// Runs after decryption, still before any connection.
pub fn validate_secret_references(
    cfg: &HostConfig,
    bundle: &SecretBundle,
) -> Result<(), ConfigError> {
    if bundle
        .admin
        .password_hash
        .as_deref()
        .is_none_or(|hash| hash.trim().is_empty())
    {
        return Err(invalid(
            "secrets.admin.password_hash",
            "the bundle has no password hash for the administration identity",
        ));
    }
    validate_database_references(cfg, bundle)
}

/// The database-side subset of [`validate_secret_references`], for runs
/// that never touch the base stage and so never need the admin hash.
pub fn validate_database_references(
    cfg: &HostConfig,
    bundle: &SecretBundle,
) -> Result<(), ConfigError> {
    for user in &cfg.database.users {
        if !bundle.has_reference(&user.password_ref) {
            return Err(invalid(
                format!("database.users.{}.password_ref", user.name),
                format!("`{}` is not present in the bundle", user.password_ref),
            ));
        }
    }
    Ok(())
}

/// Environments must not share target hosts. Names may repeat across
/// environments (web-1 in staging and prod); addresses must not.
pub fn check_host_isolation(environments: &[(String, Inventory)]) -> Result<(), ConfigError> {
    let mut owners: std::collections::BTreeMap<&str, &str> = std::collections::BTreeMap::new();
    for (env, inventory) in environments {
        for host in &inventory.hosts {
            if let Some(other) = owners.insert(host.address.as_str(), env.as_str()) {
                if other != env {
                    return Err(invalid(
                        "inventory",
                        format!(
                            "host address `{}` appears in both `{other}` and `{env}`",
                            host.address
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use groundwork_core::{AppDescriptor, DatabaseSpec, DbUserSpec, HostEntry};

    use super::*;

    fn valid_config() -> HostConfig {
        let mut cfg = HostConfig::default();
        cfg.base.automation.keys = vec!["ssh-ed25519 AAAAC3Nza auto@control".into()];
        cfg.base.admin.keys = vec!["ssh-ed25519 AAAAC3Nzb admin@laptop".into()];
        cfg
    }

    fn app(name: &str) -> AppDescriptor {
        AppDescriptor {
            name: name.into(),
            run_user: None,
            domain: format!("{name}.example.org"),
            port: 3000,
            proxy_template: None,
        }
    }

    fn field_of(err: &ConfigError) -> String {
        match err {
            ConfigError::Validation { field, .. } => field.clone(),
            other => panic!("expected a validation error, got {other}"),
        }
    }

    #[test]
    fn default_config_with_keys_passes() {
        validate_host_config(&valid_config()).unwrap();
    }

    #[test]
    fn empty_key_list_fails_fast() {
        let mut cfg = valid_config();
        cfg.base.automation.keys.clear();
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "base.automation.keys");
    }

    #[test]
    fn identity_names_must_differ() {
        let mut cfg = valid_config();
        cfg.base.admin.name = cfg.base.automation.name.clone();
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "base.admin.name");
    }

    #[test]
    fn app_runtime_identity_must_not_shadow_base_identities() {
        let mut cfg = valid_config();
        let mut bad = app("billing");
        bad.run_user = Some("admin".into());
        cfg.apps.push(bad);
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "apps.billing.run_user");
    }

    #[test]
    fn app_names_reject_path_hostile_characters() {
        let mut cfg = valid_config();
        cfg.apps.push(app("My App"));
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "apps.name");
    }

    #[test]
    fn duplicate_app_names_are_rejected() {
        let mut cfg = valid_config();
        cfg.apps.push(app("billing"));
        cfg.apps.push(app("billing"));
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "apps.name");
    }

    #[test]
    fn missing_app_domain_fails() {
        let mut cfg = valid_config();
        let mut bad = app("billing");
        bad.domain = "  ".into();
        cfg.apps.push(bad);
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "apps.billing.domain");
    }

    #[test]
    fn database_owner_must_be_a_declared_user() {
        let mut cfg = valid_config();
        cfg.database.databases.push(DatabaseSpec {
            name: "appdb".into(),
            owner: "ghost".into(),
        });
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "database.databases.appdb.owner");
    }

    #[test]
    fn database_names_must_be_pg_identifiers() {
        let mut cfg = valid_config();
        cfg.database.users.push(DbUserSpec {
            name: "app;drop".into(),
            password_ref: "app_db".into(),
            grants: vec![],
        });
        let err = validate_host_config(&cfg).unwrap_err();
        assert_eq!(field_of(&err), "database.users.name");
    }

    #[test]
    fn secret_references_must_resolve_in_the_bundle() {
        let mut cfg = valid_config();
        cfg.database.users.push(DbUserSpec {
            name: "app".into(),
            password_ref: "app_db".into(),
            grants: vec![],
        });

        let mut bundle = SecretBundle::default();
        bundle.admin.password_hash = Some("$6$gw$abcdef".into());
        let err = validate_secret_references(&cfg, &bundle).unwrap_err();
        assert_eq!(field_of(&err), "database.users.app.password_ref");

        bundle
            .database_passwords
            .insert("app_db".into(), "s3cret".into());
        validate_secret_references(&cfg, &bundle).unwrap();
    }

    #[test]
    fn bundle_without_admin_hash_is_rejected() {
        let bundle = SecretBundle::default();
        let err = validate_secret_references(&valid_config(), &bundle).unwrap_err();
        assert_eq!(field_of(&err), "secrets.admin.password_hash");
    }

    #[test]
    fn shared_host_address_across_environments_is_flagged() {
        let host = |name: &str, address: &str| HostEntry {
            name: name.into(),
            address: address.into(),
            port: None,
            roles: vec![],
        };
        let staging = Inventory {
            hosts: vec![host("web-1", "203.0.113.10")],
        };
        let prod = Inventory {
            hosts: vec![host("web-1", "203.0.113.10")],
        };

        let err = check_host_isolation(&[
            ("staging".to_owned(), staging),
            ("prod".to_owned(), prod),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("203.0.113.10"));

        let apart = Inventory {
            hosts: vec![host("web-1", "203.0.113.20")],
        };
        check_host_isolation(&[
            (
                "staging".to_owned(),
                Inventory {
                    hosts: vec![host("web-1", "203.0.113.10")],
                },
            ),
            ("prod".to_owned(), apart),
        ])
        .unwrap();
    }
}
