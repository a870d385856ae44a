//! Project-wide validation without a single connection.
//!
//! Walks every environment: inventory shape, per-host variable
//! resolution and structural validation, bundle presence, and the
//! cross-environment isolation rules (no shared host addresses, no
//! copied secret bundles). Secret *references* are not checked here --
//! that needs a decrypted bundle, and lint must stay passphrase-free.

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use groundwork_config::{Inventory, validate, vars};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Problem {
    environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    message: String,
}

#[derive(Tabled)]
struct ProblemRow {
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Problem")]
    message: String,
}

impl From<&Problem> for ProblemRow {
    fn from(p: &Problem) -> Self {
        Self {
            environment: p.environment.clone(),
            host: p.host.clone().unwrap_or_else(|| "-".into()),
            message: p.message.clone(),
        }
    }
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let project = super::load_project(global)?;
    let environments = project.list_environments()?;

    let mut problems: Vec<Problem> = Vec::new();
    let mut inventories: Vec<(String, Inventory)> = Vec::new();
    let mut hosts_seen = 0usize;

    for env in &environments {
        let env_dir = project.environment_dir(env);

        let inventory = match Inventory::load(&env_dir) {
            Ok(inventory) => inventory,
            Err(err) => {
                problems.push(Problem {
                    environment: env.clone(),
                    host: None,
                    message: err.to_string(),
                });
                continue;
            }
        };

        if inventory.hosts.is_empty() {
            problems.push(Problem {
                environment: env.clone(),
                host: None,
                message: "inventory declares no hosts".into(),
            });
        }

        // Convergence of the base stage needs the bundle, so a missing
        // one is a problem now rather than mid-rollout.
        if !super::bundle_path(&env_dir).is_file() {
            problems.push(Problem {
                environment: env.clone(),
                host: None,
                message: format!(
                    "no secret bundle; create one with `groundwork -e {env} secrets init`"
                ),
            });
        }

        for host in &inventory.hosts {
            hosts_seen += 1;
            let resolved = vars::resolve_host_config(&project, env, host, &[])
                .and_then(|cfg| validate::validate_host_config(&cfg));
            if let Err(err) = resolved {
                problems.push(Problem {
                    environment: env.clone(),
                    host: Some(host.name.clone()),
                    message: err.to_string(),
                });
            }
        }

        inventories.push((env.clone(), inventory));
    }

    if let Err(err) = validate::check_host_isolation(&inventories) {
        problems.push(Problem {
            environment: "*".into(),
            host: None,
            message: err.to_string(),
        });
    }
    problems.extend(shared_bundles(&project, &environments));

    let format = global.output_format();
    if problems.is_empty() && format == OutputFormat::Table {
        output::print(&format!(
            "{} environment(s), {hosts_seen} host(s): no problems found",
            environments.len()
        ));
        return Ok(());
    }

    let out = output::render(format, &problems, || {
        let rows: Vec<ProblemRow> = problems.iter().map(ProblemRow::from).collect();
        Table::new(rows).with(Style::rounded()).to_string()
    })?;
    output::print(&out);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CliError::LintFailed {
            problems: problems.len(),
        })
    }
}

/// Byte-identical bundles across environments mean the credentials were
/// copied, which breaks environment isolation. Checked on ciphertext,
/// so no passphrase is needed.
fn shared_bundles(project: &groundwork_config::Project, environments: &[String]) -> Vec<Problem> {
    let mut bundles: Vec<(&str, Vec<u8>)> = Vec::new();
    for env in environments {
        let path = super::bundle_path(&project.environment_dir(env));
        if let Ok(bytes) = std::fs::read(&path) {
            bundles.push((env, bytes));
        }
    }

    let mut problems = Vec::new();
    for (i, (env, bytes)) in bundles.iter().enumerate() {
        for (other, other_bytes) in &bundles[i + 1..] {
            if bytes == other_bytes {
                problems.push(Problem {
                    environment: "*".into(),
                    host: None,
                    message: format!(
                        "`{env}` and `{other}` share the same secret bundle; \
                         environments must hold distinct credentials"
                    ),
                });
            }
        }
    }
    problems
}
