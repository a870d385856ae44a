// ── Run reporting ──
//
// Reports are plain serializable data assembled by the runner: one
// entry per executed op, grouped by stage and host, plus run-level
// metadata. The CLI renders them as a table or emits them verbatim as
// JSON/YAML, so nothing in here touches formatting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{OpError, RunError};
use crate::op::Outcome;
use crate::plan::StageName;

/// Result of one op on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpStatus {
    Changed,
    Unchanged,
    WouldChange,
    Failed,
}

/// Why a host's run counts as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// The host could not be reached or the session died.
    Connectivity,
    /// The host was reachable but a delta could not be applied.
    Reconciliation,
}

impl FailureClass {
    pub fn of(error: &OpError) -> Self {
        if error.is_connectivity() {
            Self::Connectivity
        } else {
            Self::Reconciliation
        }
    }
}

/// Terminal state of one host's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostOutcome {
    /// Every planned op ran (check mode included).
    Completed,
    Failed(FailureClass),
    /// Never started: an earlier host failed under fail-fast.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpReport {
    /// Short op identifier, e.g. `user groundwork`. Never secret-bearing.
    pub op: String,
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OpReport {
    pub fn from_outcome(op: impl Into<String>, outcome: &Outcome) -> Self {
        let (status, detail) = match outcome {
            Outcome::Changed { detail } => (OpStatus::Changed, Some(detail.clone())),
            Outcome::Unchanged => (OpStatus::Unchanged, None),
            Outcome::WouldChange { detail } => (OpStatus::WouldChange, Some(detail.clone())),
        };
        Self {
            op: op.into(),
            status,
            detail,
        }
    }

    pub fn failed(op: impl Into<String>, error: &OpError) -> Self {
        Self {
            op: op.into(),
            status: OpStatus::Failed,
            detail: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub ops: Vec<OpReport>,
}

/// Everything that happened on one host, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub outcome: HostOutcome,
    pub stages: Vec<StageReport>,
    /// Full rendered error chain when the outcome is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl HostReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            outcome: HostOutcome::Completed,
            stages: Vec::new(),
            error: None,
            changed: 0,
            unchanged: 0,
            failed: 0,
        }
    }

    pub fn skipped(host: impl Into<String>) -> Self {
        Self {
            outcome: HostOutcome::Skipped,
            ..Self::new(host)
        }
    }

    /// Append one op result, opening a new stage section when the
    /// stage differs from the previous op's.
    pub fn record(&mut self, stage: StageName, op: OpReport) {
        match op.status {
            OpStatus::Changed | OpStatus::WouldChange => self.changed += 1,
            OpStatus::Unchanged => self.unchanged += 1,
            OpStatus::Failed => self.failed += 1,
        }
        let stage_name = stage.to_string();
        match self.stages.last_mut() {
            Some(section) if section.stage == stage_name => section.ops.push(op),
            _ => self.stages.push(StageReport {
                stage: stage_name,
                ops: vec![op],
            }),
        }
    }

    pub fn fail(&mut self, error: &RunError) {
        self.outcome = HostOutcome::Failed(FailureClass::of(&error.source));
        self.error = Some(error.to_string());
    }
}

/// The whole run across all targeted hosts.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub check_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Host reports in inventory order, not completion order.
    pub hosts: Vec<HostReport>,
}

impl RunReport {
    pub fn assemble(
        check_mode: bool,
        started_at: DateTime<Utc>,
        hosts: Vec<HostReport>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            check_mode,
            started_at,
            finished_at: Utc::now(),
            hosts,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.hosts.iter().any(|h| h.changed > 0)
    }

    /// Most severe failure class across hosts. A reconciliation failure
    /// outranks connectivity: an unreachable host says nothing about
    /// the declarations, a failed apply does.
    pub fn worst_failure(&self) -> Option<FailureClass> {
        let classes = self.hosts.iter().filter_map(|h| match h.outcome {
            HostOutcome::Failed(class) => Some(class),
            HostOutcome::Completed | HostOutcome::Skipped => None,
        });
        let mut worst = None;
        for class in classes {
            match class {
                FailureClass::Reconciliation => return Some(class),
                FailureClass::Connectivity => worst = Some(class),
            }
        }
        worst
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn failed_host(class: FailureClass) -> HostReport {
        let mut report = HostReport::new("db-1");
        report.outcome = HostOutcome::Failed(class);
        report
    }

    #[test]
    fn record_groups_consecutive_ops_by_stage() {
        let mut report = HostReport::new("web-1");
        report.record(
            StageName::Base,
            OpReport::from_outcome("apt sudo", &Outcome::Unchanged),
        );
        report.record(
            StageName::Base,
            OpReport::from_outcome(
                "user groundwork",
                &Outcome::Changed {
                    detail: "create user".into(),
                },
            ),
        );
        report.record(
            StageName::Firewall,
            OpReport::from_outcome("ufw enabled", &Outcome::Unchanged),
        );

        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].stage, "base");
        assert_eq!(report.stages[0].ops.len(), 2);
        assert_eq!(report.changed, 1);
        assert_eq!(report.unchanged, 2);
    }

    #[test]
    fn would_change_counts_as_changed() {
        let mut report = HostReport::new("web-1");
        report.record(
            StageName::Base,
            OpReport::from_outcome(
                "timezone Etc/UTC",
                &Outcome::WouldChange {
                    detail: "tz differs".into(),
                },
            ),
        );
        assert_eq!(report.changed, 1);
        assert_eq!(
            report.stages[0].ops[0].status,
            OpStatus::WouldChange
        );
    }

    #[test]
    fn reconciliation_outranks_connectivity() {
        let report = RunReport::assemble(
            false,
            Utc::now(),
            vec![
                failed_host(FailureClass::Connectivity),
                failed_host(FailureClass::Reconciliation),
            ],
        );
        assert_eq!(report.worst_failure(), Some(FailureClass::Reconciliation));
    }

    #[test]
    fn completed_hosts_produce_no_failure_class() {
        let report = RunReport::assemble(true, Utc::now(), vec![HostReport::new("web-1")]);
        assert_eq!(report.worst_failure(), None);
        assert!(!report.has_changes());
    }

    #[test]
    fn op_reports_serialize_kebab_case_statuses() {
        let report = OpReport::from_outcome(
            "sshd hardening",
            &Outcome::WouldChange {
                detail: "drop-in missing".into(),
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "would-change");
        assert_eq!(json["detail"], "drop-in missing");
    }
}
