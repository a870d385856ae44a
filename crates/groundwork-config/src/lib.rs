//! Project discovery, tool settings, inventory, variable layering, and
//! encrypted secret bundles.
//!
//! A groundwork project is a directory tree anchored by `groundwork.toml`
//! (tool-level settings) with one subdirectory per environment:
//!
//! ```text
//! groundwork.toml
//! defaults.toml                  global variable layer
//! templates/                     proxy template sources
//! environments/<env>/
//!     inventory.toml             declared hosts and roles
//!     vars.toml                  environment variable layer
//!     group_vars/<role>.toml     role variable layer
//!     host_vars/<host>.toml      host variable layer
//!     secrets.age                encrypted secret bundle
//! ```
//!
//! Everything here runs before a single connection is opened: resolution
//! and validation failures abort the run with nothing touched.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use groundwork_exec::{SshOptions, StrictHostKey};

pub mod inventory;
pub mod secrets;
pub mod validate;
pub mod vars;

pub use inventory::Inventory;
pub use secrets::{SecretBundle, SecretsError};

/// Marker file that anchors a project root.
pub const SETTINGS_FILE: &str = "groundwork.toml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no `{SETTINGS_FILE}` found in `{start}` or any parent directory")]
    NoProject { start: PathBuf },

    #[error("`{path}` does not exist")]
    MissingFile { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to parse `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Tool settings ───────────────────────────────────────────────────

/// Contents of `groundwork.toml`: how the tool runs, never what it
/// converges. Desired state lives in the variable layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hosts converged in parallel.
    pub forks: usize,

    /// Environments directory, relative to the project root.
    pub environments_dir: PathBuf,

    /// Passphrase file for the secret bundles. Absent means prompt.
    pub passphrase_file: Option<PathBuf>,

    pub ssh: SshSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            forks: default_forks(),
            environments_dir: PathBuf::from("environments"),
            passphrase_file: None,
            ssh: SshSettings::default(),
        }
    }
}

fn default_forks() -> usize {
    8
}

/// SSH connection settings, translated into
/// [`groundwork_exec::SshOptions`] per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Steady-state login user. Bootstrap runs override this with the
    /// privileged identity via `--bootstrap`.
    pub user: String,

    pub port: u16,

    /// Explicit private key; absent lets ssh use its agent and config.
    pub identity_file: Option<PathBuf>,

    /// Host key policy: "strict", "accept-new", or "off".
    pub strict_host_key: String,

    pub connect_timeout_secs: u64,

    pub command_timeout_secs: u64,

    /// ControlMaster socket directory. Absent disables multiplexing.
    pub control_dir: Option<PathBuf>,

    /// Raw `-o` options appended last.
    pub extra_options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        let defaults = SshOptions::default();
        Self {
            user: "groundwork".into(),
            port: defaults.port,
            identity_file: None,
            strict_host_key: "accept-new".into(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            command_timeout_secs: defaults.command_timeout.as_secs(),
            control_dir: None,
            extra_options: Vec::new(),
        }
    }
}

impl SshSettings {
    pub fn to_options(&self) -> Result<SshOptions, ConfigError> {
        let strict_host_key = match self.strict_host_key.as_str() {
            "strict" => StrictHostKey::Strict,
            "accept-new" => StrictHostKey::AcceptNew,
            "off" => StrictHostKey::Off,
            other => {
                return Err(ConfigError::Validation {
                    field: "ssh.strict_host_key".into(),
                    reason: format!("expected 'strict', 'accept-new', or 'off', got '{other}'"),
                });
            }
        };
        Ok(SshOptions {
            user: self.user.clone(),
            port: self.port,
            identity_file: self.identity_file.clone(),
            strict_host_key,
            connect_timeout: std::time::Duration::from_secs(self.connect_timeout_secs),
            command_timeout: std::time::Duration::from_secs(self.command_timeout_secs),
            control_dir: self.control_dir.clone(),
            extra_options: self.extra_options.clone(),
        })
    }
}

// ── Project discovery ───────────────────────────────────────────────

/// A discovered project: its root directory and loaded settings.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub settings: Settings,
}

impl Project {
    /// Walk upward from `start` to the directory holding
    /// [`SETTINGS_FILE`], then load settings as defaults, then the
    /// file, then `GROUNDWORK_*` environment overrides (`__` nests,
    /// e.g. `GROUNDWORK_SSH__USER`).
    pub fn load(start: &Path) -> Result<Self, ConfigError> {
        let root = discover_root(start)?;
        let figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(root.join(SETTINGS_FILE)))
            .merge(Env::prefixed("GROUNDWORK_").split("__"));
        let settings: Settings = figment.extract()?;
        tracing::debug!(root = %root.display(), "project loaded");
        Ok(Self { root, settings })
    }

    pub fn environments_dir(&self) -> PathBuf {
        self.root.join(&self.settings.environments_dir)
    }

    pub fn environment_dir(&self, name: &str) -> PathBuf {
        self.environments_dir().join(name)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    /// Environment names, sorted: subdirectories of the environments
    /// dir that contain an inventory file.
    pub fn list_environments(&self) -> Result<Vec<String>, ConfigError> {
        let dir = self.environments_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().join(inventory::INVENTORY_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn discover_root(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut dir = start;
    loop {
        if dir.join(SETTINGS_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                return Err(ConfigError::NoProject {
                    start: start.to_path_buf(),
                });
            }
        }
    }
}
