use std::collections::BTreeMap;

use secrecy::SecretString;

/// Secrets a single run needs, decrypted once and held only in memory.
///
/// The config layer produces this from the environment's encrypted
/// bundle. Ops never hold raw secrets: the planner turns the admin
/// password hash and database passwords into their on-host comparison
/// forms (shadow hash, md5 role digest) at plan-build time.
#[derive(Debug, Default)]
pub struct RunSecrets {
    /// crypt(3) hash for the administration identity's password,
    /// compared against the shadow field and applied with `chpasswd -e`.
    pub admin_password_hash: Option<SecretString>,
    /// Database credentials keyed by `password_ref`.
    pub database_passwords: BTreeMap<String, SecretString>,
}

impl RunSecrets {
    pub fn database_password(&self, reference: &str) -> Option<&SecretString> {
        self.database_passwords.get(reference)
    }
}
