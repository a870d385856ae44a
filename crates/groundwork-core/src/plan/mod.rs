// ── Plan construction ──
//
// A plan is built per host, offline, before any connection: stage
// selection (workflow scope intersected with host roles), dependency
// ordering over the stage graph, then op synthesis per stage. The same
// plan drives both converge and check runs.

use std::collections::BTreeSet;

use crate::error::PlanError;
use crate::model::{HostConfig, HostEntry, Role, RunSecrets};
use crate::op::Op;

pub mod graph;
pub mod stages;
pub mod template;

pub use graph::{ALL_STAGES, StageName, dependencies, topological};
pub use template::DEFAULT_SERVER_BLOCK;

/// Which slice of the stage graph a workflow covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageScope {
    /// Every stage the host's roles call for.
    #[default]
    All,
    /// Base hardening only.
    Base,
    /// Packet filter and ban service.
    Firewall,
    /// Database engine and catalog objects.
    Database,
    /// App runtime layout and reverse proxy.
    Apps,
}

impl StageScope {
    fn stages(self) -> &'static [StageName] {
        match self {
            Self::All => &ALL_STAGES,
            Self::Base => &[StageName::Base],
            Self::Firewall => &[StageName::Firewall, StageName::Intrusion],
            Self::Database => &[StageName::DbEngine, StageName::DbObjects],
            Self::Apps => &[StageName::Apps, StageName::Proxy],
        }
    }
}

/// One ordered stage of a host's plan.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: StageName,
    pub ops: Vec<Op>,
}

/// Everything one host will be driven through, in execution order.
#[derive(Debug, Clone)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

impl Plan {
    /// Build the plan for one host. Role-gated stages (database, apps)
    /// are dropped for hosts that lack the role; stages that synthesize
    /// zero ops are dropped entirely.
    pub fn build(
        host: &HostEntry,
        cfg: &HostConfig,
        secrets: &RunSecrets,
        scope: StageScope,
    ) -> Result<Self, PlanError> {
        let mut selected: BTreeSet<StageName> = scope.stages().iter().copied().collect();
        if !host.has_role(Role::Database) {
            selected.remove(&StageName::DbEngine);
            selected.remove(&StageName::DbObjects);
        }
        if !host.has_role(Role::Application) {
            selected.remove(&StageName::Apps);
            selected.remove(&StageName::Proxy);
        }

        let mut plan_stages = Vec::new();
        for name in topological(&selected)? {
            let stage = match name {
                StageName::Base => stages::base_stage(cfg, secrets)?,
                StageName::Firewall => stages::firewall_stage(cfg),
                StageName::Intrusion => stages::intrusion_stage(cfg),
                StageName::DbEngine => stages::db_engine_stage(),
                StageName::DbObjects => stages::db_objects_stage(cfg, secrets)?,
                StageName::Apps => stages::apps_stage(cfg),
                StageName::Proxy => stages::proxy_stage(cfg)?,
            };
            if !stage.ops.is_empty() {
                plan_stages.push(stage);
            }
        }
        Ok(Self {
            stages: plan_stages,
        })
    }

    pub fn op_count(&self) -> usize {
        self.stages.iter().map(|s| s.ops.len()).sum()
    }

    pub fn stage(&self, name: StageName) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Flat view in execution order, each op paired with its stage.
    pub fn iter_ops(&self) -> impl Iterator<Item = (StageName, &Op)> {
        self.stages
            .iter()
            .flat_map(|s| s.ops.iter().map(move |op| (s.name, op)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use crate::model::{AppDescriptor, DatabaseSpec, DbUserSpec};

    use super::*;

    fn host(roles: &[Role]) -> HostEntry {
        HostEntry {
            name: "web-1".into(),
            address: "192.0.2.10".into(),
            port: None,
            roles: roles.to_vec(),
        }
    }

    fn secrets() -> RunSecrets {
        let mut s = RunSecrets {
            admin_password_hash: Some(SecretString::from("$6$salt$hash".to_owned())),
            ..RunSecrets::default()
        };
        s.database_passwords
            .insert("app_db".into(), SecretString::from("secret".to_owned()));
        s
    }

    fn full_config() -> HostConfig {
        let mut cfg = HostConfig::default();
        cfg.database.databases = vec![DatabaseSpec {
            name: "appdb".into(),
            owner: "app".into(),
        }];
        cfg.database.users = vec![DbUserSpec {
            name: "app".into(),
            password_ref: "app_db".into(),
            grants: Vec::new(),
        }];
        cfg.apps = vec![AppDescriptor {
            name: "billing".into(),
            run_user: None,
            domain: "billing.example.org".into(),
            port: 8100,
            proxy_template: None,
        }];
        cfg
    }

    #[test]
    fn roles_gate_stage_selection() {
        let cfg = full_config();
        let plan = Plan::build(&host(&[Role::Application]), &cfg, &secrets(), StageScope::All)
            .unwrap();
        let names: Vec<StageName> = plan.stages.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                StageName::Base,
                StageName::Firewall,
                StageName::Intrusion,
                StageName::Apps,
                StageName::Proxy,
            ]
        );
    }

    #[test]
    fn database_host_gets_engine_before_objects() {
        let cfg = full_config();
        let plan =
            Plan::build(&host(&[Role::Database]), &cfg, &secrets(), StageScope::All).unwrap();
        let names: Vec<StageName> = plan.stages.iter().map(|s| s.name).collect();
        let pos = |n| names.iter().position(|&x| x == n).unwrap();
        assert!(pos(StageName::DbEngine) < pos(StageName::DbObjects));
        assert!(plan.stage(StageName::Apps).is_none());
    }

    #[test]
    fn scoped_workflow_runs_exactly_its_stages() {
        let cfg = full_config();
        let plan = Plan::build(
            &host(&[Role::Database, Role::Application]),
            &cfg,
            &secrets(),
            StageScope::Database,
        )
        .unwrap();
        let names: Vec<StageName> = plan.stages.iter().map(|s| s.name).collect();
        assert_eq!(names, vec![StageName::DbEngine, StageName::DbObjects]);
    }

    #[test]
    fn empty_stages_are_dropped() {
        // No declared databases or users: the objects stage synthesizes
        // nothing and must not appear.
        let mut cfg = full_config();
        cfg.database.databases.clear();
        cfg.database.users.clear();
        let plan =
            Plan::build(&host(&[Role::Database]), &cfg, &secrets(), StageScope::All).unwrap();
        assert!(plan.stage(StageName::DbEngine).is_some());
        assert!(plan.stage(StageName::DbObjects).is_none());
    }

    #[test]
    fn iter_ops_walks_execution_order() {
        let cfg = full_config();
        let plan = Plan::build(
            &host(&[Role::Application]),
            &cfg,
            &secrets(),
            StageScope::Apps,
        )
        .unwrap();
        let first = plan.iter_ops().next().unwrap();
        assert_eq!(first.0, StageName::Apps);
        assert_eq!(plan.op_count(), plan.iter_ops().count());
    }
}
