//! Command dispatch: bridges CLI args -> config resolution -> runs ->
//! output formatting.

pub mod hosts;
pub mod lint;
pub mod ping;
pub mod run;
pub mod secrets_cmd;

use std::path::{Path, PathBuf};

use groundwork_config::{Project, SecretBundle, secrets};
use groundwork_core::StageScope;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Converge(args) => run::handle(StageScope::All, args, global).await,
        Command::Base(args) => run::handle(StageScope::Base, args, global).await,
        Command::Firewall(args) => run::handle(StageScope::Firewall, args, global).await,
        Command::Database(args) => run::handle(StageScope::Database, args, global).await,
        Command::App(args) => run::handle(StageScope::Apps, args, global).await,
        Command::Ping(args) => ping::handle(args, global).await,
        Command::Hosts(args) => hosts::handle(&args, global),
        Command::Secrets(args) => secrets_cmd::handle(args.command, global),
        Command::Lint => lint::handle(global),
        // Completions are handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}

// ── Shared resolution helpers ───────────────────────────────────────

/// Discover the project from `--project-dir` or the working directory.
pub fn load_project(global: &GlobalOpts) -> Result<Project, CliError> {
    let start = match &global.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    Ok(Project::load(&start)?)
}

/// Resolve the target environment: the explicit choice, or the only
/// one the project has.
pub fn resolve_env(project: &Project, global: &GlobalOpts) -> Result<String, CliError> {
    let available = project.list_environments()?;
    if let Some(name) = &global.env {
        if available.iter().any(|e| e == name) {
            return Ok(name.clone());
        }
        return Err(CliError::UnknownEnvironment {
            name: name.clone(),
            available: name_list(&available),
        });
    }
    match available.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(CliError::NoEnvironment {
            available: name_list(&available),
        }),
    }
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Passphrase file chain: flag or env (user config already folded in),
/// then the project settings.
pub fn passphrase_file<'a>(project: &'a Project, global: &'a GlobalOpts) -> Option<&'a Path> {
    global
        .passphrase_file
        .as_deref()
        .or(project.settings.passphrase_file.as_deref())
}

pub fn bundle_path(env_dir: &Path) -> PathBuf {
    env_dir.join(secrets::BUNDLE_FILE)
}

/// Decrypt an environment's bundle, prompting for the passphrase if no
/// file or environment source provides it.
pub fn load_bundle(
    project: &Project,
    env_dir: &Path,
    global: &GlobalOpts,
) -> Result<SecretBundle, CliError> {
    let passphrase =
        secrets::read_passphrase(passphrase_file(project, global), "Bundle passphrase: ")?;
    Ok(secrets::load_bundle(&bundle_path(env_dir), &passphrase)?)
}
