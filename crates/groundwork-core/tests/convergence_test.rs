#![allow(clippy::unwrap_used)]
// Integration tests for the convergence engine using a scripted
// transport. The scripted rules double as mutation detectors: any
// command without a rule fails the exec, so a test that scripts only
// probe commands proves the run dispatched no mutations.

use std::sync::Arc;

use secrecy::SecretString;

use groundwork_exec::{CmdOutput, ScriptedTransport};

use groundwork_core::op::SshdHardening;
use groundwork_core::{
    DatabaseSpec, DbUserSpec, Escalation, GrantScope, GrantSpec, HostConfig, HostEntry,
    HostOutcome, HostTarget, Op, OpStatus, Plan, Role, RunOptions, RunReport, RunSecrets, Runner,
    Stage, StageName, StageScope,
};

// Digest constants the steady-state scripts serve back. The sha256
// values are the hashes of the contents the planner declares; the md5
// values are PostgreSQL's digest form for the scripted credentials.
const AUTO_UPGRADES_SHA: &str = "b81a3a01864d5ed7f8d023f3fa86d65087ad6b85706d399dc229a60b1c784807";
const SSHD_DROP_IN_SHA: &str = "38cbcb884fc028e8b07d32ea5c4b2ccb585c56ef6734359e83fc365f1a941282";
const APP_DIGEST: &str = "md5f543b608e355623527b0e4f12e5981e8";
const ROTATED_DIGEST: &str = "md517e9250d18f075eb138a1ff5a0eac858";

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> HostConfig {
    let mut cfg = HostConfig::default();
    cfg.base.automation.keys = vec!["ssh-ed25519 AAAAC3Nza auto@control".into()];
    cfg.base.admin.keys = vec!["ssh-ed25519 AAAAC3Nzb admin@laptop".into()];
    cfg
}

fn db_config() -> HostConfig {
    let mut cfg = config();
    cfg.database.databases = vec![DatabaseSpec {
        name: "appdb".into(),
        owner: "app".into(),
    }];
    cfg.database.users = vec![DbUserSpec {
        name: "app".into(),
        password_ref: "app_db".into(),
        grants: vec![GrantSpec {
            database: "appdb".into(),
            scope: GrantScope::All,
        }],
    }];
    cfg
}

fn secrets(db_password: &str) -> RunSecrets {
    let mut s = RunSecrets {
        admin_password_hash: Some(SecretString::from("$6$gw$abcdef".to_owned())),
        ..RunSecrets::default()
    };
    s.database_passwords
        .insert("app_db".into(), SecretString::from(db_password.to_owned()));
    s
}

fn host() -> HostEntry {
    HostEntry {
        name: "srv-1".into(),
        address: "192.0.2.10".into(),
        port: Some(22),
        roles: vec![Role::Database, Role::Application],
    }
}

async fn run_one(
    transport: Arc<ScriptedTransport>,
    escalation: Escalation,
    scope: StageScope,
    cfg: &HostConfig,
    run_secrets: &RunSecrets,
    check_mode: bool,
) -> RunReport {
    let entry = host();
    let plan = Plan::build(&entry, cfg, run_secrets, scope).unwrap();
    let target = HostTarget {
        entry,
        plan,
        transport,
        escalation,
    };
    let options = RunOptions {
        check_mode,
        ..RunOptions::default()
    };
    Runner::new(options).run(vec![target]).await
}

fn position(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("no command line contains `{needle}`"))
}

// ── Fresh-host bootstrap ────────────────────────────────────────────

/// Script a fresh Debian host for the full base stage: every probe
/// reports the pre-hardening state and every mutation succeeds. The
/// getent sequences advance once the account exists.
fn script_fresh_host(t: &ScriptedTransport) {
    // Packages: two of the four baseline packages missing.
    t.on_prefix(
        "dpkg-query",
        CmdOutput {
            status: 1,
            stdout: "ca-certificates installed\ncurl installed\n".into(),
            stderr: "dpkg-query: no packages found matching sudo\n".into(),
        },
    );
    t.on_prefix(
        "env DEBIAN_FRONTEND=noninteractive apt-get update",
        CmdOutput::ok(""),
    );
    t.on_prefix(
        "env DEBIAN_FRONTEND=noninteractive apt-get install",
        CmdOutput::ok(""),
    );

    t.on("cat /etc/timezone", CmdOutput::ok("America/New_York\n"));
    t.on("timedatectl set-timezone Etc/UTC", CmdOutput::ok(""));

    t.on(
        "sha256sum -- /etc/apt/apt.conf.d/20auto-upgrades",
        CmdOutput::err(1, "sha256sum: /etc/apt/apt.conf.d/20auto-upgrades: No such file"),
    );
    t.on_contains("20auto-upgrades", CmdOutput::ok(""));

    // Automation identity: absent until useradd, then resolvable.
    t.on_seq(
        "getent passwd -- groundwork",
        vec![
            CmdOutput::err(2, ""),
            CmdOutput::err(2, ""),
            CmdOutput::ok("groundwork:x:1000:1000::/home/groundwork:/bin/bash\n"),
        ],
    );
    t.on(
        "useradd --shell /bin/bash --create-home -- groundwork",
        CmdOutput::ok(""),
    );
    t.on(
        "cat -- /home/groundwork/.ssh/authorized_keys",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on_contains("mkdir -p /home/groundwork/.ssh", CmdOutput::ok(""));
    t.on(
        "cat -- /etc/sudoers.d/groundwork-automation",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on_contains("sudoers.d/groundwork-automation", CmdOutput::ok(""));

    // Administration identity.
    t.on_seq(
        "getent passwd -- admin",
        vec![
            CmdOutput::err(2, ""),
            CmdOutput::err(2, ""),
            CmdOutput::ok("admin:x:1001:1001::/home/admin:/bin/bash\n"),
        ],
    );
    t.on(
        "useradd --shell /bin/bash --create-home -- admin",
        CmdOutput::ok(""),
    );
    t.on(
        "cat -- /home/admin/.ssh/authorized_keys",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on_contains("mkdir -p /home/admin/.ssh", CmdOutput::ok(""));
    t.on(
        "getent shadow -- admin",
        CmdOutput::ok("admin:!:19800:0:99999:7:::\n"),
    );
    t.on("chpasswd -e", CmdOutput::ok(""));
    t.on(
        "cat -- /etc/sudoers.d/groundwork-admin",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on_contains("sudoers.d/groundwork-admin", CmdOutput::ok(""));

    // SSH lockdown: drop-in absent, guard satisfied, validation passes.
    t.on(
        "sha256sum -- /etc/ssh/sshd_config.d/50-groundwork.conf",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on_contains(
        "test -s /home/groundwork/.ssh/authorized_keys",
        CmdOutput::ok(""),
    );
    t.on_contains("50-groundwork.conf", CmdOutput::ok(""));
    t.on("sshd -t", CmdOutput::ok(""));
    t.on("systemctl reload ssh", CmdOutput::ok(""));
}

#[tokio::test]
async fn test_fresh_host_bootstrap_converges_every_op() {
    let t = Arc::new(ScriptedTransport::new());
    script_fresh_host(&t);

    let report = run_one(
        Arc::clone(&t),
        Escalation::None,
        StageScope::Base,
        &config(),
        &secrets("s3cret"),
        false,
    )
    .await;

    let host = &report.hosts[0];
    assert_eq!(host.outcome, HostOutcome::Completed, "error: {:?}", host.error);
    assert_eq!(host.changed, 11);
    assert_eq!(host.unchanged, 0);
    assert_eq!(host.failed, 0);
    assert!(report.has_changes());
}

#[tokio::test]
async fn test_bootstrap_installs_new_access_before_revoking_old() {
    let t = Arc::new(ScriptedTransport::new());
    script_fresh_host(&t);

    run_one(
        Arc::clone(&t),
        Escalation::None,
        StageScope::Base,
        &config(),
        &secrets("s3cret"),
        false,
    )
    .await;

    let lines = t.cmdlines();
    // The automation identity's key and sudo policy land before the
    // admin account even exists, and the lockdown runs dead last.
    let automation_keys = position(&lines, "mkdir -p /home/groundwork/.ssh");
    let automation_sudo = position(&lines, "sudoers.d/groundwork-automation");
    let admin_created = position(&lines, "useradd --shell /bin/bash --create-home -- admin");
    let lockdown_check = position(&lines, "sshd -t");
    assert!(automation_keys < automation_sudo);
    assert!(automation_sudo < admin_created);
    assert!(admin_created < lockdown_check);
    assert_eq!(lines.last().unwrap(), "systemctl reload ssh");

    // The guard probe runs before the drop-in is written.
    let guard = position(&lines, "test -s /home/groundwork/.ssh/authorized_keys");
    let drop_in = position(&lines, "install -o root -g root -m 644 \"$tmp\" /etc/ssh");
    assert!(guard < drop_in);

    // The admin credential hash travels on stdin, never in argv.
    let chpasswd = t
        .calls()
        .into_iter()
        .find(|c| c.cmdline == "chpasswd -e")
        .unwrap();
    assert_eq!(chpasswd.stdin, b"admin:$6$gw$abcdef\n");
    assert!(!t.saw("$6$gw$abcdef"));
}

/// Script the same host after the bootstrap converged: every probe
/// reports the declared state. No mutation rules exist, so any
/// mutation would fail the run.
fn script_converged_host(t: &ScriptedTransport) {
    t.on_prefix(
        "sudo -n -- dpkg-query",
        CmdOutput::ok(
            "ca-certificates installed\ncurl installed\nsudo installed\nunattended-upgrades installed\n",
        ),
    );
    t.on("sudo -n -- cat /etc/timezone", CmdOutput::ok("Etc/UTC\n"));
    t.on(
        "sudo -n -- sha256sum -- /etc/apt/apt.conf.d/20auto-upgrades",
        CmdOutput::ok(format!("{AUTO_UPGRADES_SHA}  /etc/apt/apt.conf.d/20auto-upgrades\n")),
    );
    t.on(
        "sudo -n -- getent passwd -- groundwork",
        CmdOutput::ok("groundwork:x:1000:1000::/home/groundwork:/bin/bash\n"),
    );
    t.on(
        "sudo -n -- cat -- /home/groundwork/.ssh/authorized_keys",
        CmdOutput::ok("ssh-ed25519 AAAAC3Nza auto@control\n"),
    );
    t.on(
        "sudo -n -- cat -- /etc/sudoers.d/groundwork-automation",
        CmdOutput::ok("groundwork ALL=(ALL) NOPASSWD:ALL\n"),
    );
    t.on(
        "sudo -n -- getent passwd -- admin",
        CmdOutput::ok("admin:x:1001:1001::/home/admin:/bin/bash\n"),
    );
    t.on(
        "sudo -n -- cat -- /home/admin/.ssh/authorized_keys",
        CmdOutput::ok("ssh-ed25519 AAAAC3Nzb admin@laptop\n"),
    );
    t.on(
        "sudo -n -- getent shadow -- admin",
        CmdOutput::ok("admin:$6$gw$abcdef:19800:0:99999:7:::\n"),
    );
    t.on(
        "sudo -n -- cat -- /etc/sudoers.d/groundwork-admin",
        CmdOutput::ok("admin ALL=(ALL:ALL) ALL\n"),
    );
    t.on(
        "sudo -n -- sha256sum -- /etc/ssh/sshd_config.d/50-groundwork.conf",
        CmdOutput::ok(format!("{SSHD_DROP_IN_SHA}  /etc/ssh/sshd_config.d/50-groundwork.conf\n")),
    );
}

#[tokio::test]
async fn test_second_run_is_fully_unchanged_and_dispatches_no_mutation() {
    let t = Arc::new(ScriptedTransport::new());
    script_converged_host(&t);

    let report = run_one(
        Arc::clone(&t),
        Escalation::Sudo,
        StageScope::Base,
        &config(),
        &secrets("s3cret"),
        false,
    )
    .await;

    let host = &report.hosts[0];
    assert_eq!(host.outcome, HostOutcome::Completed, "error: {:?}", host.error);
    assert_eq!(host.changed, 0);
    assert_eq!(host.unchanged, 11);
    assert!(!report.has_changes());

    // Probes only, nothing else: one per op plus the home-directory
    // lookup each authorized_keys check needs.
    assert_eq!(t.cmdlines().len(), 13);
    assert!(!t.saw("useradd"));
    assert!(!t.saw("apt-get"));
    assert!(!t.saw("chpasswd"));
    assert!(!t.saw("visudo"));
    assert!(!t.saw("systemctl reload"));
}

#[tokio::test]
async fn test_check_mode_reports_deltas_without_mutating() {
    let t = Arc::new(ScriptedTransport::new());
    // Fresh-state probes only. No mutation rules, no getent sequences:
    // check mode must never get far enough to need them.
    t.on_prefix(
        "dpkg-query",
        CmdOutput {
            status: 1,
            stdout: "ca-certificates installed\ncurl installed\n".into(),
            stderr: "dpkg-query: no packages found matching sudo\n".into(),
        },
    );
    t.on("cat /etc/timezone", CmdOutput::ok("America/New_York\n"));
    t.on_prefix("sha256sum", CmdOutput::err(1, "No such file or directory"));
    t.on_prefix("getent passwd", CmdOutput::err(2, ""));
    t.on_prefix("getent shadow", CmdOutput::err(2, ""));
    t.on_prefix("cat -- /etc/sudoers.d/", CmdOutput::err(1, "No such file or directory"));

    let report = run_one(
        Arc::clone(&t),
        Escalation::None,
        StageScope::Base,
        &config(),
        &secrets("s3cret"),
        true,
    )
    .await;

    let host = &report.hosts[0];
    assert_eq!(host.outcome, HostOutcome::Completed, "error: {:?}", host.error);
    assert_eq!(host.changed, 11);
    assert_eq!(host.failed, 0);
    assert!(host
        .stages
        .iter()
        .flat_map(|s| s.ops.iter())
        .all(|op| op.status == OpStatus::WouldChange));

    assert!(!t.saw("useradd"));
    assert!(!t.saw("timedatectl set-timezone"));
    assert!(!t.saw("install -o"));
    assert!(!t.saw("chpasswd"));
    assert!(!t.saw("apt-get"));
}

// ── Lockdown guard ──────────────────────────────────────────────────

#[tokio::test]
async fn test_lockdown_refuses_without_automation_key_in_place() {
    let t = Arc::new(ScriptedTransport::new());
    t.on(
        "sudo -n -- sha256sum -- /etc/ssh/sshd_config.d/50-groundwork.conf",
        CmdOutput::err(1, "No such file or directory"),
    );
    t.on(
        "sudo -n -- getent passwd -- groundwork",
        CmdOutput::ok("groundwork:x:1000:1000::/home/groundwork:/bin/bash\n"),
    );
    // Key file empty: a previous run never finished installing access.
    t.on_contains(
        "test -s /home/groundwork/.ssh/authorized_keys",
        CmdOutput::err(1, ""),
    );

    let plan = Plan {
        stages: vec![Stage {
            name: StageName::Base,
            ops: vec![Op::SshdHardening(SshdHardening {
                content: SshdHardening::default_content(),
                automation_user: "groundwork".into(),
            })],
        }],
    };
    let target = HostTarget {
        entry: host(),
        plan,
        transport: t.clone(),
        escalation: Escalation::Sudo,
    };
    let report = Runner::new(RunOptions::default()).run(vec![target]).await;

    let host = &report.hosts[0];
    assert!(matches!(host.outcome, HostOutcome::Failed(_)));
    assert!(host.error.as_deref().unwrap().contains("refusing to apply"));

    // The drop-in was never written and sshd was never touched.
    assert!(!t.saw("install -o"));
    assert!(!t.saw("sshd -t"));
    assert!(!t.saw("systemctl reload"));
}

// ── Database reconciliation ─────────────────────────────────────────

fn script_converged_database(t: &ScriptedTransport, stored_digest: &str) {
    t.on_prefix(
        "sudo -n -- dpkg-query",
        CmdOutput::ok("postgresql installed\n"),
    );
    t.on(
        "sudo -n -- systemctl is-enabled -- postgresql",
        CmdOutput::ok("enabled\n"),
    );
    t.on(
        "sudo -n -- systemctl is-active -- postgresql",
        CmdOutput::ok("active\n"),
    );
    t.on_contains("pg_roles", CmdOutput::ok("1\n"));
    t.on_contains("rolpassword", CmdOutput::ok(format!("{stored_digest}\n")));
    t.on_contains("pg_database", CmdOutput::ok("1\n"));
    t.on_contains("has_database_privilege", CmdOutput::ok("t\n"));
}

#[tokio::test]
async fn test_converged_database_host_reports_no_deltas() {
    let t = Arc::new(ScriptedTransport::new());
    script_converged_database(&t, APP_DIGEST);

    let report = run_one(
        Arc::clone(&t),
        Escalation::Sudo,
        StageScope::Database,
        &db_config(),
        &secrets("s3cret"),
        false,
    )
    .await;

    let host = &report.hosts[0];
    assert_eq!(host.outcome, HostOutcome::Completed, "error: {:?}", host.error);
    assert_eq!(host.changed, 0);
    assert_eq!(host.unchanged, 5);
    // Probes only: no CREATE, ALTER, or GRANT went out.
    assert!(!t.saw("ON_ERROR_STOP"));
}

#[tokio::test]
async fn test_rotated_credential_changes_exactly_one_op() {
    let t = Arc::new(ScriptedTransport::new());
    // Catalog still holds the digest for the old password.
    script_converged_database(&t, APP_DIGEST);
    t.on_contains("ON_ERROR_STOP=1", CmdOutput::ok(""));

    let report = run_one(
        Arc::clone(&t),
        Escalation::Sudo,
        StageScope::Database,
        &db_config(),
        &secrets("rotated"),
        false,
    )
    .await;

    let host = &report.hosts[0];
    assert_eq!(host.outcome, HostOutcome::Completed, "error: {:?}", host.error);
    assert_eq!(host.changed, 1);
    assert_eq!(host.unchanged, 4);

    let changed: Vec<&str> = host
        .stages
        .iter()
        .flat_map(|s| s.ops.iter())
        .filter(|op| op.status == OpStatus::Changed)
        .map(|op| op.op.as_str())
        .collect();
    assert_eq!(changed, vec!["role app"]);

    // The new digest travels on stdin as an ALTER, never in argv.
    let alter = t
        .calls()
        .into_iter()
        .find(|c| c.cmdline.contains("ON_ERROR_STOP=1"))
        .unwrap();
    assert_eq!(
        alter.stdin,
        format!("ALTER ROLE \"app\" WITH LOGIN PASSWORD '{ROTATED_DIGEST}';\n").into_bytes()
    );
    assert!(!t.saw(ROTATED_DIGEST));
}
