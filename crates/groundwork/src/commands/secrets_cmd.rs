//! Secret-bundle tooling: init, encrypt, view, rekey.
//!
//! Plaintext exists only on stdin/stdout and in process memory; every
//! path here writes armored ciphertext or nothing. `view | edit |
//! encrypt` is the intended editing loop.

use std::io::Read;
use std::path::Path;

use dialoguer::Confirm;

use groundwork_config::{Project, SecretBundle, secrets};

use crate::cli::{GlobalOpts, SecretsCommand};
use crate::error::CliError;
use crate::output;

pub fn handle(cmd: SecretsCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let project = super::load_project(global)?;
    let env = super::resolve_env(&project, global)?;
    let bundle_path = super::bundle_path(&project.environment_dir(&env));

    match cmd {
        SecretsCommand::Init => init(&project, &env, &bundle_path, global),
        SecretsCommand::Encrypt { input, yes } => {
            encrypt(&project, &bundle_path, input.as_deref(), yes, global)
        }
        SecretsCommand::View => view(&project, &bundle_path, global),
        SecretsCommand::Rekey => rekey(&project, &bundle_path, global),
    }
}

fn init(
    project: &Project,
    env: &str,
    bundle_path: &Path,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if bundle_path.is_file() {
        return Err(CliError::Validation {
            field: "secrets".into(),
            reason: format!(
                "`{}` already exists; edit it with `secrets view` / `secrets encrypt`, \
                 or change its passphrase with `secrets rekey`",
                bundle_path.display()
            ),
        });
    }

    let passphrase = secrets::read_new_passphrase(
        super::passphrase_file(project, global),
        "New bundle passphrase: ",
    )?;
    secrets::write_bundle_text(bundle_path, &secrets::template(), &passphrase)?;

    output::print(&format!(
        "Created {} for `{env}`.\n\
         Fill it in with: groundwork -e {env} secrets view, edit, then secrets encrypt",
        bundle_path.display()
    ));
    Ok(())
}

fn encrypt(
    project: &Project,
    bundle_path: &Path,
    input: Option<&Path>,
    yes: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let plaintext = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    // Reject malformed TOML before anything is overwritten.
    let bundle = SecretBundle::parse(&plaintext)?;

    if bundle_path.is_file() && !yes {
        let replace = Confirm::new()
            .with_prompt(format!("Replace existing {}?", bundle_path.display()))
            .default(false)
            .interact()
            .map_err(|err| CliError::Interactive {
                reason: err.to_string(),
            })?;
        if !replace {
            output::print("Left the existing bundle in place.");
            return Ok(());
        }
    }

    let passphrase = secrets::read_new_passphrase(
        super::passphrase_file(project, global),
        "Bundle passphrase: ",
    )?;
    secrets::write_bundle_text(bundle_path, &plaintext, &passphrase)?;

    output::print(&format!(
        "Encrypted {} ({} database credential(s)).",
        bundle_path.display(),
        bundle.database_passwords.len()
    ));
    Ok(())
}

fn view(project: &Project, bundle_path: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    let passphrase = secrets::read_passphrase(
        super::passphrase_file(project, global),
        "Bundle passphrase: ",
    )?;
    let plaintext = secrets::read_bundle_text(bundle_path, &passphrase)?;
    output::print(plaintext.trim_end());
    Ok(())
}

fn rekey(project: &Project, bundle_path: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    let old = secrets::read_passphrase(
        super::passphrase_file(project, global),
        "Current passphrase: ",
    )?;
    let new = secrets::prompt_confirmed_passphrase("New passphrase: ")?;
    secrets::rekey(bundle_path, &old, &new)?;
    output::print(&format!("Rekeyed {}.", bundle_path.display()));
    Ok(())
}
