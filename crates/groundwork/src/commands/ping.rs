//! Connectivity check: one trivial command per host through the same
//! transport and escalation path a real run would use, so a green ping
//! means both SSH access and sudo actually work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use groundwork_config::Inventory;
use groundwork_core::{Escalation, FailureClass, Remote};
use groundwork_exec::SshTransport;

use crate::cli::{GlobalOpts, PingArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct PingResult {
    host: String,
    address: String,
    ok: bool,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct PingRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency")]
    latency: String,
}

impl From<&PingResult> for PingRow {
    fn from(r: &PingResult) -> Self {
        Self {
            host: r.host.clone(),
            address: r.address.clone(),
            status: match &r.error {
                None => "ok".to_owned(),
                Some(e) => format!("failed: {e}"),
            },
            latency: humantime::format_duration(Duration::from_millis(r.latency_ms)).to_string(),
        }
    }
}

pub async fn handle(args: PingArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let project = super::load_project(global)?;
    let env = super::resolve_env(&project, global)?;
    let inventory = Inventory::load(&project.environment_dir(&env))?;
    let hosts = inventory.select(args.limit.as_deref())?;

    let ssh = project.settings.ssh.to_options()?;
    let ssh = if args.bootstrap {
        ssh.with_user("root")
    } else {
        ssh
    };
    let escalation = if args.bootstrap {
        Escalation::None
    } else {
        Escalation::Sudo
    };

    let checks = hosts.iter().enumerate().map(|(index, host)| {
        let mut options = ssh.clone();
        if let Some(port) = host.port {
            options.port = port;
        }
        let transport = Arc::new(SshTransport::new(host.address.clone(), options));
        let remote = Remote::new(transport, escalation, host.name.clone());
        let name = host.name.clone();
        let address = host.address.clone();
        async move {
            let started = Instant::now();
            let error = match remote.run(&["true"]).await {
                Ok(out) if out.success() => None,
                Ok(out) => Some(out.stderr.trim().to_owned()),
                Err(err) => Some(err.to_string()),
            };
            let elapsed = started.elapsed();
            (
                index,
                PingResult {
                    host: name,
                    address,
                    ok: error.is_none(),
                    latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    error,
                },
            )
        }
    });

    let mut results: Vec<(usize, PingResult)> = futures::stream::iter(checks)
        .buffer_unordered(project.settings.forks.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _)| *index);
    let results: Vec<PingResult> = results.into_iter().map(|(_, r)| r).collect();

    let out = output::render(global.output_format(), &results, || {
        let rows: Vec<PingRow> = results.iter().map(PingRow::from).collect();
        Table::new(rows).with(Style::rounded()).to_string()
    })?;
    output::print(&out);

    let failed = results.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        return Err(CliError::RunFailed {
            failed,
            class: FailureClass::Connectivity,
        });
    }
    Ok(())
}
