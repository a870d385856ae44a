//! Output rendering: recap tables for humans, JSON/YAML verbatim for
//! machines. Reports arrive as plain serializable data; everything
//! visual happens here.

use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use groundwork_core::{FailureClass, HostOutcome, OpStatus, RunReport};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a value in the requested format. The table closure is only
/// invoked for table output; JSON and YAML serialize the value itself.
pub fn render<T: Serialize>(
    format: OutputFormat,
    value: &T,
    table: impl FnOnce() -> String,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(table()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

pub fn print(out: &str) {
    if !out.is_empty() {
        println!("{out}");
    }
}

/// Human-readable status word for one op result.
pub fn status_label(status: OpStatus) -> &'static str {
    match status {
        OpStatus::Changed => "changed",
        OpStatus::Unchanged => "ok",
        OpStatus::WouldChange => "would change",
        OpStatus::Failed => "failed",
    }
}

/// Color an op status for terminal display.
pub fn paint_status(status: OpStatus) -> String {
    let label = status_label(status);
    match status {
        OpStatus::Changed | OpStatus::WouldChange => label
            .if_supports_color(Stream::Stdout, |t| t.yellow())
            .to_string(),
        OpStatus::Unchanged => label
            .if_supports_color(Stream::Stdout, |t| t.green())
            .to_string(),
        OpStatus::Failed => label
            .if_supports_color(Stream::Stdout, |t| t.red())
            .to_string(),
    }
}

// ── Run report ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Changed")]
    changed: usize,
    #[tabled(rename = "Ok")]
    unchanged: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
}

fn outcome_cell(outcome: HostOutcome) -> String {
    match outcome {
        HostOutcome::Completed => "completed"
            .if_supports_color(Stream::Stdout, |t| t.green())
            .to_string(),
        HostOutcome::Failed(FailureClass::Connectivity) => "failed (connectivity)"
            .if_supports_color(Stream::Stdout, |t| t.red())
            .to_string(),
        HostOutcome::Failed(FailureClass::Reconciliation) => "failed (reconciliation)"
            .if_supports_color(Stream::Stdout, |t| t.red())
            .to_string(),
        HostOutcome::Skipped => "skipped"
            .if_supports_color(Stream::Stdout, |t| t.yellow())
            .to_string(),
    }
}

/// Recap table plus error details and a one-line summary.
pub fn report_table(report: &RunReport) -> String {
    let rows: Vec<HostRow> = report
        .hosts
        .iter()
        .map(|h| HostRow {
            host: h.host.clone(),
            outcome: outcome_cell(h.outcome),
            changed: h.changed,
            unchanged: h.unchanged,
            failed: h.failed,
        })
        .collect();

    let mut out = Table::new(rows).with(Style::rounded()).to_string();

    for host in &report.hosts {
        if let Some(error) = &host.error {
            out.push('\n');
            out.push_str(&format!(
                "{}: {error}",
                host.host.if_supports_color(Stream::Stdout, |t| t.red())
            ));
        }
    }

    out.push('\n');
    out.push_str(&summary_line(report));
    out
}

fn summary_line(report: &RunReport) -> String {
    let changed: usize = report.hosts.iter().map(|h| h.changed).sum();
    let failed = report
        .hosts
        .iter()
        .filter(|h| matches!(h.outcome, HostOutcome::Failed(_)))
        .count();
    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();
    let elapsed =
        std::time::Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

    let mode = if report.check_mode { " (check mode)" } else { "" };
    format!(
        "{} host(s){mode}: {changed} changed, {failed} failed, finished in {}",
        report.hosts.len(),
        humantime::format_duration(elapsed),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use groundwork_core::{HostReport, OpReport, Outcome, StageName};
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_report() -> RunReport {
        let mut web = HostReport::new("web-1");
        web.record(
            StageName::Base,
            OpReport::from_outcome(
                "timezone Etc/UTC",
                &Outcome::Changed {
                    detail: "America/New_York -> Etc/UTC".into(),
                },
            ),
        );
        web.record(
            StageName::Base,
            OpReport::from_outcome("apt sudo curl", &Outcome::Unchanged),
        );
        let db = HostReport::skipped("db-1");
        RunReport::assemble(false, Utc::now(), vec![web, db])
    }

    #[test]
    fn table_lists_every_host_with_counts() {
        let report = sample_report();
        let out = report_table(&report);
        assert!(out.contains("web-1"));
        assert!(out.contains("db-1"));
        assert!(out.contains("skipped"));
        assert!(out.contains("2 host(s): 1 changed, 0 failed"));
    }

    #[test]
    fn json_round_trips_hosts_and_statuses() {
        let report = sample_report();
        let out = render(OutputFormat::Json, &report, String::new).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["hosts"][0]["host"], "web-1");
        assert_eq!(value["hosts"][0]["changed"], 1);
        assert_eq!(value["hosts"][0]["stages"][0]["ops"][0]["status"], "changed");
        assert_eq!(value["hosts"][1]["outcome"], "skipped");
    }

    #[test]
    fn yaml_includes_check_mode_flag() {
        let report = RunReport::assemble(true, Utc::now(), vec![]);
        let out = render(OutputFormat::Yaml, &report, String::new).unwrap();
        assert!(out.contains("check_mode: true"));
    }

    #[test]
    fn check_mode_is_called_out_in_the_summary() {
        let report = RunReport::assemble(true, Utc::now(), vec![]);
        assert!(summary_line(&report).contains("(check mode)"));
    }

    #[test]
    fn status_labels_are_short_and_stable() {
        assert_eq!(status_label(OpStatus::Changed), "changed");
        assert_eq!(status_label(OpStatus::Unchanged), "ok");
        assert_eq!(status_label(OpStatus::WouldChange), "would change");
        assert_eq!(status_label(OpStatus::Failed), "failed");
    }
}
