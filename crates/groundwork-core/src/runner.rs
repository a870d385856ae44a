// ── Concurrent run driver ──
//
// One future per host, at most `forks` in flight, each host strictly
// sequential through its plan. Host failure halts that host at the
// failing op; under fail-fast it also cancels hosts that have not
// started yet. Hosts already in flight always run to completion, so a
// cancellation never leaves a host mid-op.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use groundwork_exec::Transport;

use crate::error::RunError;
use crate::model::HostEntry;
use crate::op::RunCtx;
use crate::plan::{Plan, StageName};
use crate::remote::{Escalation, Remote};
use crate::report::{HostOutcome, HostReport, OpReport, RunReport};

/// What to do with hosts that have not started when another host fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Cancel hosts that have not started yet.
    #[default]
    FailFast,
    /// Keep scheduling; the report collects every failure.
    ContinueOnError,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub check_mode: bool,
    /// Hosts driven concurrently.
    pub forks: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            check_mode: false,
            forks: 8,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// One host ready to run: its plan plus the session to reach it.
pub struct HostTarget {
    pub entry: HostEntry,
    pub plan: Plan,
    pub transport: Arc<dyn Transport>,
    pub escalation: Escalation,
}

/// Progress notifications, emitted in real time while the report is
/// still being assembled.
#[derive(Debug, Clone)]
pub enum RunEvent {
    HostStarted {
        host: String,
    },
    OpFinished {
        host: String,
        stage: StageName,
        report: OpReport,
    },
    HostFinished {
        host: String,
        outcome: HostOutcome,
    },
}

pub struct Runner {
    options: RunOptions,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Runner {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            events: None,
        }
    }

    /// Attach a progress channel. Send failures are ignored: a dropped
    /// receiver must not abort the run.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, targets: Vec<HostTarget>) -> RunReport {
        let started_at = Utc::now();
        let cancel = CancellationToken::new();

        let host_runs = targets.into_iter().enumerate().map(|(index, target)| {
            let cancel = cancel.clone();
            async move { (index, self.run_host(target, &cancel).await) }
        });

        let mut stream =
            futures::stream::iter(host_runs).buffer_unordered(self.options.forks.max(1));
        let mut finished: Vec<(usize, HostReport)> = Vec::new();
        while let Some((index, report)) = stream.next().await {
            if matches!(report.outcome, HostOutcome::Failed(_))
                && self.options.failure_policy == FailurePolicy::FailFast
            {
                cancel.cancel();
            }
            finished.push((index, report));
        }

        // Completion order is nondeterministic; reports are not.
        finished.sort_by_key(|(index, _)| *index);
        let hosts = finished.into_iter().map(|(_, report)| report).collect();
        RunReport::assemble(self.options.check_mode, started_at, hosts)
    }

    async fn run_host(&self, target: HostTarget, cancel: &CancellationToken) -> HostReport {
        let host = target.entry.name.clone();
        if cancel.is_cancelled() {
            tracing::info!(%host, "skipped: run cancelled before start");
            return HostReport::skipped(host);
        }

        self.emit(RunEvent::HostStarted { host: host.clone() });
        tracing::info!(%host, check_mode = self.options.check_mode, "host run started");

        let remote = Remote::new(target.transport, target.escalation, host.clone());
        let mut ctx = RunCtx::new(self.options.check_mode);
        let mut report = HostReport::new(&host);

        'stages: for stage in &target.plan.stages {
            tracing::debug!(%host, stage = %stage.name, ops = stage.ops.len(), "stage started");
            for op in &stage.ops {
                let described = op.describe();
                match op.execute(&remote, &mut ctx).await {
                    Ok(outcome) => {
                        let op_report = OpReport::from_outcome(&described, &outcome);
                        self.emit(RunEvent::OpFinished {
                            host: host.clone(),
                            stage: stage.name,
                            report: op_report.clone(),
                        });
                        report.record(stage.name, op_report);
                    }
                    Err(source) => {
                        let op_report = OpReport::failed(&described, &source);
                        self.emit(RunEvent::OpFinished {
                            host: host.clone(),
                            stage: stage.name,
                            report: op_report.clone(),
                        });
                        report.record(stage.name, op_report);

                        let error = RunError {
                            host: host.clone(),
                            stage: stage.name.to_string(),
                            op: described,
                            source,
                        };
                        tracing::warn!(%host, %error, "host run failed");
                        report.fail(&error);
                        break 'stages;
                    }
                }
            }
        }

        tracing::info!(
            %host,
            changed = report.changed,
            unchanged = report.unchanged,
            "host run finished"
        );
        self.emit(RunEvent::HostFinished {
            host,
            outcome: report.outcome,
        });
        report
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.send(event).ok();
        }
    }
}
