//! The convergence workflows: resolve, validate, plan, run, report.
//!
//! Everything that can fail locally fails before the first connection:
//! inventory selection, variable resolution, structural validation,
//! bundle decryption, secret-reference checks, and plan building all
//! complete up front for every selected host.

use std::sync::Arc;

use tokio::sync::mpsc;

use groundwork_config::{Inventory, validate, vars};
use groundwork_core::{
    Escalation, FailurePolicy, HostConfig, HostTarget, Plan, RunOptions, RunSecrets, Runner,
    StageScope,
};
use groundwork_exec::SshTransport;

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::{output, progress};

pub async fn handle(
    scope: StageScope,
    args: RunArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let project = super::load_project(global)?;
    let env = super::resolve_env(&project, global)?;
    let env_dir = project.environment_dir(&env);

    let inventory = Inventory::load(&env_dir)?;
    let hosts = inventory.select(args.limit.as_deref())?;

    let mut configs = Vec::with_capacity(hosts.len());
    for host in &hosts {
        let cfg = vars::resolve_host_config(&project, &env, host, &args.set)?;
        validate::validate_host_config(&cfg)?;
        configs.push(cfg);
    }

    let run_secrets = if needs_secrets(scope, &configs) {
        let bundle = super::load_bundle(&project, &env_dir, global)?;
        for cfg in &configs {
            if scope == StageScope::Database {
                validate::validate_database_references(cfg, &bundle)?;
            } else {
                validate::validate_secret_references(cfg, &bundle)?;
            }
        }
        bundle.into_run_secrets()
    } else {
        RunSecrets::default()
    };

    let ssh = project.settings.ssh.to_options()?;
    let ssh = if args.bootstrap {
        tracing::info!("bootstrap run: connecting as root without escalation");
        ssh.with_user("root")
    } else {
        ssh
    };
    let escalation = if args.bootstrap {
        Escalation::None
    } else {
        Escalation::Sudo
    };

    let mut targets = Vec::with_capacity(hosts.len());
    for (host, cfg) in hosts.iter().zip(&configs) {
        let plan = Plan::build(host, cfg, &run_secrets, scope)?;
        if plan.stages.is_empty() {
            tracing::info!(host = %host.name, "no stages apply to this host's roles");
            continue;
        }
        let mut options = ssh.clone();
        if let Some(port) = host.port {
            options.port = port;
        }
        targets.push(HostTarget {
            entry: host.clone(),
            plan,
            transport: Arc::new(SshTransport::new(host.address.clone(), options)),
            escalation,
        });
    }

    let run_options = RunOptions {
        check_mode: args.check,
        forks: args.forks.unwrap_or(project.settings.forks),
        failure_policy: if args.continue_on_error {
            FailurePolicy::ContinueOnError
        } else {
            FailurePolicy::FailFast
        },
    };

    let format = global.output_format();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let show_progress = !global.quiet && format == OutputFormat::Table;
    let display = progress::spawn(targets.len(), events_rx, show_progress);

    let report = Runner::new(run_options)
        .with_events(events_tx)
        .run(targets)
        .await;
    // The runner dropped its sender; wait for the display to drain.
    let _ = display.await;

    output::print(&output::render(format, &report, || {
        output::report_table(&report)
    })?);

    if let Some(class) = report.worst_failure() {
        let failed = report
            .hosts
            .iter()
            .filter(|h| matches!(h.outcome, groundwork_core::HostOutcome::Failed(_)))
            .count();
        return Err(CliError::RunFailed { failed, class });
    }
    Ok(())
}

/// Whether this run will need the decrypted bundle at all. Firewall and
/// app runs never do, so they proceed without a passphrase.
fn needs_secrets(scope: StageScope, configs: &[HostConfig]) -> bool {
    match scope {
        StageScope::Base | StageScope::All => true,
        StageScope::Database => configs.iter().any(|c| !c.database.users.is_empty()),
        StageScope::Firewall | StageScope::Apps => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config() -> HostConfig {
        let mut cfg = HostConfig::default();
        cfg.database.users.push(groundwork_core::DbUserSpec {
            name: "app".into(),
            password_ref: "app_db".into(),
            grants: vec![],
        });
        cfg
    }

    #[test]
    fn base_scoped_runs_always_need_the_bundle() {
        assert!(needs_secrets(StageScope::Base, &[HostConfig::default()]));
        assert!(needs_secrets(StageScope::All, &[]));
    }

    #[test]
    fn firewall_and_app_runs_never_prompt_for_a_passphrase() {
        assert!(!needs_secrets(StageScope::Firewall, &[db_config()]));
        assert!(!needs_secrets(StageScope::Apps, &[db_config()]));
    }

    #[test]
    fn database_runs_need_the_bundle_only_with_declared_users() {
        assert!(!needs_secrets(StageScope::Database, &[HostConfig::default()]));
        assert!(needs_secrets(StageScope::Database, &[db_config()]));
    }
}
