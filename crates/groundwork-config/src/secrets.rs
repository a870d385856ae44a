//! Encrypted secret bundles, one per environment.
//!
//! A bundle is a small TOML document encrypted with age under a scrypt
//! passphrase, stored ASCII-armored as `secrets.age` next to the
//! environment's inventory. It is decrypted transiently per run; the
//! cleartext never touches persisted state. Run-time consumers get a
//! [`groundwork_core::RunSecrets`] whose fields are `SecretString`s.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use age::armor::{ArmoredReader, ArmoredWriter, Format};
use age::scrypt;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use groundwork_core::RunSecrets;

/// Bundle file name inside an environment directory.
pub const BUNDLE_FILE: &str = "secrets.age";

/// Environment variable consulted before prompting for a passphrase.
pub const PASSPHRASE_ENV: &str = "GROUNDWORK_PASSPHRASE";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("`{path}` does not exist; create it with `groundwork secrets init`")]
    MissingBundle { path: PathBuf },

    #[error("bundle encryption failed: {reason}")]
    Encrypt { reason: String },

    #[error("bundle decryption failed: {reason}")]
    Decrypt { reason: String },

    #[error("bundle is not valid TOML: {source}")]
    Parse {
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("serializing the bundle failed: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("passphrase file `{path}` is empty")]
    EmptyPassphrase { path: PathBuf },

    #[error("passphrase confirmation did not match")]
    PassphraseMismatch,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Bundle document ─────────────────────────────────────────────────

/// The decrypted bundle contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretBundle {
    pub admin: AdminSecrets,
    /// Database credentials keyed by a user's `password_ref`.
    pub database_passwords: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSecrets {
    /// crypt(3) hash for the administration identity's password.
    pub password_hash: Option<String>,
}

impl SecretBundle {
    pub fn parse(text: &str) -> Result<Self, SecretsError> {
        toml::from_str(text).map_err(|source| SecretsError::Parse {
            source: Box::new(source),
        })
    }

    pub fn to_toml(&self) -> Result<String, SecretsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Whether a `password_ref` resolves in this bundle.
    pub fn has_reference(&self, reference: &str) -> bool {
        self.database_passwords.contains_key(reference)
    }

    /// Move the credentials into their run-time form.
    pub fn into_run_secrets(self) -> RunSecrets {
        RunSecrets {
            admin_password_hash: self.admin.password_hash.map(SecretString::from),
            database_passwords: self
                .database_passwords
                .into_iter()
                .map(|(reference, password)| (reference, SecretString::from(password)))
                .collect(),
        }
    }
}

/// Commented skeleton written by `groundwork secrets init`.
pub fn template() -> String {
    "\
# Secrets for one environment. This file is encrypted at rest; edit it
# through `groundwork secrets view` / `groundwork secrets encrypt`.

[admin]
# crypt(3) hash for the administration identity's password.
# Generate one with: openssl passwd -6
password_hash = \"\"

# Database credentials, keyed by the `password_ref` of a declared
# database user.
[database_passwords]
# app_db = \"change-me\"
"
    .to_owned()
}

// ── Encryption ──────────────────────────────────────────────────────

/// Encrypt a bundle document under a scrypt passphrase, ASCII-armored.
pub fn encrypt(plaintext: &str, passphrase: &SecretString) -> Result<String, SecretsError> {
    let recipient = scrypt::Recipient::new(passphrase.clone());
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
            .map_err(|e| SecretsError::Encrypt {
                reason: e.to_string(),
            })?;

    let mut armored = Vec::new();
    let mut writer = encryptor
        .wrap_output(ArmoredWriter::wrap_output(&mut armored, Format::AsciiArmor)?)
        .map_err(|e| SecretsError::Encrypt {
            reason: e.to_string(),
        })?;
    writer.write_all(plaintext.as_bytes())?;
    writer
        .finish()
        .and_then(ArmoredWriter::finish)
        .map_err(|e| SecretsError::Encrypt {
            reason: e.to_string(),
        })?;

    String::from_utf8(armored).map_err(|e| SecretsError::Encrypt {
        reason: e.to_string(),
    })
}

/// Decrypt an armored bundle. A wrong passphrase surfaces as
/// [`SecretsError::Decrypt`].
pub fn decrypt(armored: &str, passphrase: &SecretString) -> Result<String, SecretsError> {
    let decryptor =
        age::Decryptor::new(ArmoredReader::new(armored.as_bytes())).map_err(|e| {
            SecretsError::Decrypt {
                reason: e.to_string(),
            }
        })?;
    let identity = scrypt::Identity::new(passphrase.clone());
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(|e| SecretsError::Decrypt {
            reason: e.to_string(),
        })?;

    let mut plaintext = String::new();
    reader.read_to_string(&mut plaintext)?;
    Ok(plaintext)
}

// ── Bundle files ────────────────────────────────────────────────────

/// Decrypted text of a bundle file, comments and layout intact.
pub fn read_bundle_text(path: &Path, passphrase: &SecretString) -> Result<String, SecretsError> {
    if !path.is_file() {
        return Err(SecretsError::MissingBundle {
            path: path.to_path_buf(),
        });
    }
    let armored = std::fs::read_to_string(path)?;
    decrypt(&armored, passphrase)
}

pub fn load_bundle(path: &Path, passphrase: &SecretString) -> Result<SecretBundle, SecretsError> {
    SecretBundle::parse(&read_bundle_text(path, passphrase)?)
}

/// Encrypt `plaintext` and write it to `path`.
pub fn write_bundle_text(
    path: &Path,
    plaintext: &str,
    passphrase: &SecretString,
) -> Result<(), SecretsError> {
    let armored = encrypt(plaintext, passphrase)?;
    std::fs::write(path, armored)?;
    Ok(())
}

/// Re-encrypt a bundle under a new passphrase. The decrypted text is
/// re-armored verbatim, so operator comments survive.
pub fn rekey(
    path: &Path,
    old_passphrase: &SecretString,
    new_passphrase: &SecretString,
) -> Result<(), SecretsError> {
    let plaintext = read_bundle_text(path, old_passphrase)?;
    write_bundle_text(path, &plaintext, new_passphrase)
}

// ── Passphrase sources ──────────────────────────────────────────────

/// Resolve the bundle passphrase: an explicit file wins, then the
/// `GROUNDWORK_PASSPHRASE` environment variable, then an interactive
/// prompt.
pub fn read_passphrase(
    passphrase_file: Option<&Path>,
    prompt: &str,
) -> Result<SecretString, SecretsError> {
    if let Some(path) = passphrase_file {
        let raw = std::fs::read_to_string(path)?;
        let trimmed = raw.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(SecretsError::EmptyPassphrase {
                path: path.to_path_buf(),
            });
        }
        return Ok(SecretString::from(trimmed.to_owned()));
    }
    if let Ok(from_env) = std::env::var(PASSPHRASE_ENV) {
        if !from_env.is_empty() {
            return Ok(SecretString::from(from_env));
        }
    }
    Ok(SecretString::from(rpassword::prompt_password(prompt)?))
}

/// Prompt twice for a passphrase that will protect new content. File
/// and environment sources skip the confirmation.
pub fn read_new_passphrase(
    passphrase_file: Option<&Path>,
    prompt: &str,
) -> Result<SecretString, SecretsError> {
    if passphrase_file.is_some() || std::env::var(PASSPHRASE_ENV).is_ok_and(|v| !v.is_empty()) {
        return read_passphrase(passphrase_file, prompt);
    }
    prompt_confirmed_passphrase(prompt)
}

/// Interactive confirmed prompt, ignoring file and environment
/// sources. Rekeying uses this: those sources hold the passphrase
/// being replaced.
pub fn prompt_confirmed_passphrase(prompt: &str) -> Result<SecretString, SecretsError> {
    let first = rpassword::prompt_password(prompt)?;
    let second = rpassword::prompt_password("Confirm passphrase: ")?;
    if first != second {
        return Err(SecretsError::PassphraseMismatch);
    }
    Ok(SecretString::from(first))
}
