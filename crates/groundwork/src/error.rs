//! CLI error type with miette diagnostics.
//!
//! Wraps the library error taxonomies into user-facing errors with
//! actionable help text and a stable exit-code map.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use groundwork_config::{ConfigError, SecretsError};
use groundwork_core::{FailureClass, PlanError};

/// Process exit codes, stable across releases.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const SECRETS: i32 = 3;
    pub const RECONCILIATION: i32 = 6;
    pub const CONNECTIVITY: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Project and environment resolution ──────────────────────────
    #[error("No project found from {}", start.display())]
    #[diagnostic(
        code(groundwork::no_project),
        help(
            "Run inside a directory tree containing groundwork.toml,\n\
             or point at one with --project-dir."
        )
    )]
    NoProject { start: PathBuf },

    #[error("No environment selected")]
    #[diagnostic(
        code(groundwork::no_environment),
        help(
            "Pick one with --env or GROUNDWORK_ENV.\n\
             Available: {available}"
        )
    )]
    NoEnvironment { available: String },

    #[error("Environment '{name}' does not exist")]
    #[diagnostic(
        code(groundwork::unknown_environment),
        help("Available: {available}")
    )]
    UnknownEnvironment { name: String, available: String },

    #[error("Missing file: {}", path.display())]
    #[diagnostic(code(groundwork::missing_file))]
    MissingFile { path: PathBuf },

    // ── Validation ──────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(groundwork::validation))]
    Validation { field: String, reason: String },

    #[error("Lint found {problems} problem(s)")]
    #[diagnostic(
        code(groundwork::lint),
        help("Each problem is listed above with its environment and host.")
    )]
    LintFailed { problems: usize },

    // ── Secrets ─────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(groundwork::secrets),
        help(
            "Bundle tooling: groundwork secrets init|encrypt|view|rekey.\n\
             The passphrase comes from --passphrase-file, GROUNDWORK_PASSPHRASE,\n\
             or an interactive prompt."
        )
    )]
    Secrets(#[from] SecretsError),

    // ── Planning and runs ───────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(groundwork::plan))]
    Plan(#[from] PlanError),

    #[error("{failed} host(s) failed")]
    #[diagnostic(
        code(groundwork::run_failed),
        help(
            "Per-host details are in the report above. Re-running is safe:\n\
             completed work is left in place and re-verified, not redone."
        )
    )]
    RunFailed { failed: usize, class: FailureClass },

    // ── Configuration plumbing ──────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(groundwork::config))]
    Config(Box<ConfigError>),

    #[error("Interactive prompt failed: {reason}")]
    #[diagnostic(
        code(groundwork::interactive),
        help("Non-interactive contexts can pass --yes or pre-set the value.")
    )]
    Interactive { reason: String },

    // ── IO / serialization ──────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(groundwork::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(groundwork::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(groundwork::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoProject { start } => Self::NoProject { start },
            ConfigError::MissingFile { path } => Self::MissingFile { path },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to a process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoProject { .. }
            | Self::NoEnvironment { .. }
            | Self::UnknownEnvironment { .. }
            | Self::MissingFile { .. }
            | Self::Validation { .. }
            | Self::LintFailed { .. } => exit_code::USAGE,

            Self::Secrets(_)
            | Self::Plan(PlanError::MissingSecret { .. } | PlanError::MissingAdminHash { .. }) => {
                exit_code::SECRETS
            }

            Self::RunFailed { class, .. } => match class {
                FailureClass::Reconciliation => exit_code::RECONCILIATION,
                FailureClass::Connectivity => exit_code::CONNECTIVITY,
            },

            Self::Plan(_)
            | Self::Config(_)
            | Self::Interactive { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::Toml(_) => exit_code::GENERAL,
        }
    }
}
