//! Live progress for multi-host runs.
//!
//! Consumes the runner's event stream and draws a fleet-level bar on
//! stderr, printing a line for every delta and failure as it happens.
//! The final report is rendered separately once the run completes, so
//! suppressing this display loses nothing.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use groundwork_core::{OpStatus, RunEvent};

use crate::output;

/// Drive the display until the event channel closes. With `show` off
/// the events are drained silently so the runner never blocks.
pub fn spawn(hosts: usize, events: mpsc::UnboundedReceiver<RunEvent>, show: bool) -> JoinHandle<()> {
    tokio::spawn(consume(hosts, events, show))
}

async fn consume(hosts: usize, mut events: mpsc::UnboundedReceiver<RunEvent>, show: bool) {
    let bar = if show {
        let bar = ProgressBar::new(u64::try_from(hosts).unwrap_or(u64::MAX));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} hosts {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    while let Some(event) = events.recv().await {
        match event {
            RunEvent::HostStarted { host } => {
                bar.set_message(host);
                bar.tick();
            }
            RunEvent::OpFinished {
                host,
                stage,
                report,
            } => {
                if show && report.status != OpStatus::Unchanged {
                    let detail = report
                        .detail
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default();
                    bar.println(format!(
                        "{host} [{stage}] {}: {}{detail}",
                        report.op,
                        output::paint_status(report.status),
                    ));
                }
                bar.tick();
            }
            RunEvent::HostFinished { .. } => {
                bar.inc(1);
            }
        }
    }
    bar.finish_and_clear();
}
