//! Inventory rendering: the resolved host list, or the full merged
//! variable set of each host. Variables are secret-free by
//! construction (configs carry references into the bundle, never
//! values), so this never needs a passphrase.

use std::collections::BTreeMap;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use groundwork_config::{Inventory, vars};
use groundwork_core::{HostConfig, HostEntry};

use crate::cli::{GlobalOpts, HostsArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Roles")]
    roles: String,
}

impl From<&HostEntry> for HostRow {
    fn from(h: &HostEntry) -> Self {
        Self {
            name: h.name.clone(),
            address: h.address.clone(),
            port: h.port.map_or_else(|| "22".to_owned(), |p| p.to_string()),
            roles: h
                .roles
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

pub fn handle(args: &HostsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let project = super::load_project(global)?;
    let env = super::resolve_env(&project, global)?;
    let inventory = Inventory::load(&project.environment_dir(&env))?;
    let hosts = inventory.select(args.limit.as_deref())?;

    if args.vars {
        return render_vars(&project, &env, &hosts, args, global);
    }

    let out = output::render(global.output_format(), &hosts, || {
        let rows: Vec<HostRow> = hosts.iter().map(HostRow::from).collect();
        Table::new(rows).with(Style::rounded()).to_string()
    })?;
    output::print(&out);
    Ok(())
}

/// Merged variables per host. Table mode prints TOML, the same dialect
/// the inputs are written in; JSON/YAML emit a name-keyed map.
fn render_vars(
    project: &groundwork_config::Project,
    env: &str,
    hosts: &[HostEntry],
    args: &HostsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut resolved: BTreeMap<String, HostConfig> = BTreeMap::new();
    for host in hosts {
        let cfg = vars::resolve_host_config(project, env, host, &args.set)?;
        resolved.insert(host.name.clone(), cfg);
    }

    match global.output_format() {
        OutputFormat::Table => {
            let mut sections = Vec::with_capacity(resolved.len());
            for (name, cfg) in &resolved {
                sections.push(format!("# host: {name}\n{}", toml::to_string_pretty(cfg)?));
            }
            output::print(sections.join("\n").trim_end());
        }
        format => output::print(&output::render(format, &resolved, String::new)?),
    }
    Ok(())
}
