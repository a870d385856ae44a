//! Stage ordering as an explicit dependency graph.
//!
//! The ordering rules are declared as edges and topologically sorted,
//! not implied by list position, so the invariants (hardening before
//! firewall, engine before catalog objects, app dirs before proxy
//! config) are checkable on the graph itself. The sort is deterministic:
//! ties break by declaration order in [`ALL_STAGES`].

use std::collections::BTreeSet;

use strum::{Display, EnumString};

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StageName {
    Base,
    Firewall,
    Intrusion,
    DbEngine,
    DbObjects,
    Apps,
    Proxy,
}

/// Every stage, in declaration (tie-break) order.
pub const ALL_STAGES: [StageName; 7] = [
    StageName::Base,
    StageName::Firewall,
    StageName::Intrusion,
    StageName::DbEngine,
    StageName::DbObjects,
    StageName::Apps,
    StageName::Proxy,
];

/// Stages that must complete before the given stage may start.
pub fn dependencies(stage: StageName) -> &'static [StageName] {
    match stage {
        StageName::Base => &[],
        // SSH access must survive the lockdown before the filter goes up.
        StageName::Firewall => &[StageName::Base],
        // The ban service assumes the filter framework is present.
        StageName::Intrusion => &[StageName::Firewall],
        StageName::DbEngine => &[StageName::Base],
        StageName::DbObjects => &[StageName::DbEngine],
        StageName::Apps => &[StageName::Base],
        // Proxy config references paths the app stage created.
        StageName::Proxy => &[StageName::Apps],
    }
}

/// Order the selected stages so every dependency edge between two
/// selected stages is respected. Edges into unselected stages are
/// ignored: a partial workflow asserts its preconditions were converged
/// by an earlier run.
pub fn topological(selected: &BTreeSet<StageName>) -> Result<Vec<StageName>, PlanError> {
    let stages: Vec<StageName> = ALL_STAGES
        .iter()
        .copied()
        .filter(|s| selected.contains(s))
        .collect();
    let edges: Vec<(StageName, StageName)> = stages
        .iter()
        .flat_map(|&to| {
            dependencies(to)
                .iter()
                .copied()
                .filter(|from| selected.contains(from))
                .map(move |from| (from, to))
        })
        .collect();
    sort_with_edges(&stages, &edges)
}

/// Kahn's algorithm with deterministic tie-breaking by position in
/// `stages`. Split out so tests can feed it a cyclic edge set.
fn sort_with_edges(
    stages: &[StageName],
    edges: &[(StageName, StageName)],
) -> Result<Vec<StageName>, PlanError> {
    let mut remaining: Vec<StageName> = stages.to_vec();
    let mut done: BTreeSet<StageName> = BTreeSet::new();
    let mut order = Vec::with_capacity(stages.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().copied().find(|&stage| {
            edges
                .iter()
                .all(|&(from, to)| to != stage || done.contains(&from))
        });
        let Some(stage) = ready else {
            return Err(PlanError::Cycle {
                stage: remaining[0].to_string(),
            });
        };
        remaining.retain(|&s| s != stage);
        done.insert(stage);
        order.push(stage);
    }
    Ok(order)
}
