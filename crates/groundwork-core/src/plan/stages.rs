//! Per-stage op builders.
//!
//! Each builder turns one slice of the declared model into an ordered
//! op list. Order inside a stage is load-bearing in two places: the
//! base stage installs the automation identity's access before anything
//! that could revoke the old path, and closes with the SSH lockdown;
//! the firewall stage registers every allowance before activation.

use secrecy::ExposeSecret;

use crate::error::PlanError;
use crate::model::{
    AllowRule, AppDescriptor, AppPaths, HostConfig, IdentitySpec, Proto, RunSecrets,
};
use crate::op::{
    AptInstall, AuthorizedKeys, ChangeTag, Directory, EnsureUser, FileAbsent, FileContent, Op,
    PasswordHash, PgDatabase, PgGrant, PgRole, ServiceEnabled, ServiceReload, SshdHardening,
    SudoersPolicy, Symlink, Timezone, UfwAllow, UfwDefaultDeny, UfwEnabled, UnattendedUpgrades,
    postgres::md5_password_digest,
};
use crate::plan::{Stage, graph::StageName, template::render_server_block};

const FAIL2BAN_TAG: &str = "fail2ban";
const PROXY_TAG: &str = "proxy";
const JAIL_PATH: &str = "/etc/fail2ban/jail.d/groundwork.local";

fn login_user(identity: &IdentitySpec) -> Op {
    Op::EnsureUser(EnsureUser {
        name: identity.name.clone(),
        shell: identity.shell.clone(),
        system: false,
        home: None,
    })
}

fn authorized_keys(identity: &IdentitySpec) -> Op {
    Op::AuthorizedKeys(AuthorizedKeys {
        user: identity.name.clone(),
        keys: identity.keys.clone(),
    })
}

fn sudoers(identity: &IdentitySpec, file: &str) -> Op {
    Op::SudoersPolicy(SudoersPolicy {
        file: file.to_owned(),
        line: identity.sudoers_line(),
    })
}

/// Base hardening. Op order carries the bootstrap contract: the
/// automation identity becomes fully usable (account, keys, sudoers)
/// before the admin identity is touched, and the SSH lockdown that
/// revokes root-with-password access runs last of all.
pub(crate) fn base_stage(cfg: &HostConfig, secrets: &RunSecrets) -> Result<Stage, PlanError> {
    let base = &cfg.base;
    let admin_hash = secrets
        .admin_password_hash
        .as_ref()
        .ok_or_else(|| PlanError::MissingAdminHash {
            name: base.admin.name.clone(),
        })?;

    let mut ops = vec![
        Op::AptInstall(AptInstall {
            packages: base.packages.clone(),
        }),
        Op::Timezone(Timezone {
            zone: base.timezone.clone(),
        }),
    ];
    if base.unattended_upgrades {
        ops.push(Op::UnattendedUpgrades(UnattendedUpgrades {}));
    }
    ops.extend([
        login_user(&base.automation),
        authorized_keys(&base.automation),
        sudoers(&base.automation, "groundwork-automation"),
        login_user(&base.admin),
        authorized_keys(&base.admin),
        Op::PasswordHash(PasswordHash {
            user: base.admin.name.clone(),
            hash: admin_hash.expose_secret().to_owned(),
        }),
        sudoers(&base.admin, "groundwork-admin"),
        Op::SshdHardening(SshdHardening {
            content: SshdHardening::default_content(),
            automation_user: base.automation.name.clone(),
        }),
    ]);

    Ok(Stage {
        name: StageName::Base,
        ops,
    })
}

/// Packet filter. Allowances are registered first; activation comes
/// last so no window exists where the filter is up without its rules.
pub(crate) fn firewall_stage(cfg: &HostConfig) -> Stage {
    let mut ops = vec![Op::UfwDefaultDeny(UfwDefaultDeny {})];

    // SSH stays allowed even when the declared rules omit it;
    // activating the filter would otherwise sever the session.
    if !cfg.firewall.allow.iter().any(|r| r.port == 22) {
        ops.push(Op::UfwAllow(UfwAllow {
            rule: AllowRule {
                port: 22,
                proto: Proto::Tcp,
                comment: Some("ssh".into()),
            },
        }));
    }
    for rule in &cfg.firewall.allow {
        ops.push(Op::UfwAllow(UfwAllow { rule: rule.clone() }));
    }
    ops.push(Op::UfwEnabled(UfwEnabled {}));

    Stage {
        name: StageName::Firewall,
        ops,
    }
}

/// Brute-force ban service with an sshd jail.
pub(crate) fn intrusion_stage(cfg: &HostConfig) -> Stage {
    let jail = &cfg.fail2ban;
    let content = format!(
        "[sshd]\n\
         enabled = true\n\
         backend = systemd\n\
         maxretry = {}\n\
         findtime = {}\n\
         bantime = {}\n",
        jail.maxretry, jail.findtime, jail.bantime,
    );

    Stage {
        name: StageName::Intrusion,
        ops: vec![
            Op::AptInstall(AptInstall {
                packages: vec!["fail2ban".into()],
            }),
            Op::FileContent(FileContent {
                path: JAIL_PATH.into(),
                content,
                owner: "root".into(),
                group: "root".into(),
                mode: "644".into(),
                tag: Some(ChangeTag::from(FAIL2BAN_TAG)),
            }),
            Op::ServiceEnabled(ServiceEnabled {
                unit: "fail2ban".into(),
            }),
            Op::ServiceReload(ServiceReload {
                unit: "fail2ban".into(),
                if_changed: ChangeTag::from(FAIL2BAN_TAG),
                validate: None,
            }),
        ],
    }
}

pub(crate) fn db_engine_stage() -> Stage {
    Stage {
        name: StageName::DbEngine,
        ops: vec![
            Op::AptInstall(AptInstall {
                packages: vec!["postgresql".into()],
            }),
            Op::ServiceEnabled(ServiceEnabled {
                unit: "postgresql".into(),
            }),
        ],
    }
}

/// Catalog objects: roles first (databases name them as owners),
/// databases second, grants last. Absent declarations are left alone;
/// nothing here drops or revokes.
pub(crate) fn db_objects_stage(
    cfg: &HostConfig,
    secrets: &RunSecrets,
) -> Result<Stage, PlanError> {
    let db = &cfg.database;
    let mut ops = Vec::new();

    for user in &db.users {
        let password = secrets
            .database_password(&user.password_ref)
            .ok_or_else(|| PlanError::MissingSecret {
                reference: user.password_ref.clone(),
            })?;
        ops.push(Op::PgRole(PgRole {
            name: user.name.clone(),
            digest: md5_password_digest(&user.name, password.expose_secret()),
        }));
    }
    for database in &db.databases {
        ops.push(Op::PgDatabase(PgDatabase {
            name: database.name.clone(),
            owner: database.owner.clone(),
        }));
    }
    for user in &db.users {
        for grant in &user.grants {
            ops.push(Op::PgGrant(PgGrant {
                role: user.name.clone(),
                database: grant.database.clone(),
                scope: grant.scope,
            }));
        }
    }

    Ok(Stage {
        name: StageName::DbObjects,
        ops,
    })
}

fn app_ops(admin: &str, app: &AppDescriptor) -> Vec<Op> {
    let paths = AppPaths::derive(&app.name);
    let run_user = app.runtime_user().to_owned();
    vec![
        Op::EnsureUser(EnsureUser {
            name: run_user.clone(),
            shell: "/usr/sbin/nologin".into(),
            system: true,
            home: Some(paths.data.clone()),
        }),
        // Code is admin-owned and world-readable; everything the
        // runtime user writes stays out of reach of other apps.
        Op::Directory(Directory {
            path: paths.code,
            owner: admin.to_owned(),
            group: admin.to_owned(),
            mode: "755".into(),
        }),
        Op::Directory(Directory {
            path: paths.config,
            owner: admin.to_owned(),
            group: run_user.clone(),
            mode: "750".into(),
        }),
        Op::Directory(Directory {
            path: paths.log,
            owner: run_user.clone(),
            group: run_user.clone(),
            mode: "750".into(),
        }),
        Op::Directory(Directory {
            path: paths.data,
            owner: run_user.clone(),
            group: run_user,
            mode: "750".into(),
        }),
    ]
}

/// Runtime identity and directory skeleton per app. The admin identity
/// owns code and config; the runtime user owns log and data.
pub(crate) fn apps_stage(cfg: &HostConfig) -> Stage {
    let admin = cfg.base.admin.name.as_str();
    let ops = cfg
        .apps
        .iter()
        .flat_map(|app| app_ops(admin, app))
        .collect();
    Stage {
        name: StageName::Apps,
        ops,
    }
}

/// Reverse proxy: one server block per app, distro default site
/// retired, reload gated on actual config change and guarded by
/// `nginx -t`.
pub(crate) fn proxy_stage(cfg: &HostConfig) -> Result<Stage, PlanError> {
    if cfg.apps.is_empty() {
        return Ok(Stage {
            name: StageName::Proxy,
            ops: Vec::new(),
        });
    }

    let mut ops = vec![
        Op::AptInstall(AptInstall {
            packages: vec!["nginx".into()],
        }),
        Op::FileAbsent(FileAbsent {
            path: "/etc/nginx/sites-enabled/default".into(),
            tag: Some(ChangeTag::from(PROXY_TAG)),
        }),
    ];
    for app in &cfg.apps {
        let available = format!("/etc/nginx/sites-available/{}.conf", app.name);
        let enabled = format!("/etc/nginx/sites-enabled/{}.conf", app.name);
        ops.push(Op::FileContent(FileContent {
            path: available.clone(),
            content: render_server_block(app)?,
            owner: "root".into(),
            group: "root".into(),
            mode: "644".into(),
            tag: Some(ChangeTag::from(PROXY_TAG)),
        }));
        ops.push(Op::Symlink(Symlink {
            path: enabled,
            target: available,
            tag: Some(ChangeTag::from(PROXY_TAG)),
        }));
    }
    ops.push(Op::ServiceEnabled(ServiceEnabled {
        unit: "nginx".into(),
    }));
    ops.push(Op::ServiceReload(ServiceReload {
        unit: "nginx".into(),
        if_changed: ChangeTag::from(PROXY_TAG),
        validate: Some(vec!["nginx".into(), "-t".into()]),
    }));

    Ok(Stage {
        name: StageName::Proxy,
        ops,
    })
}
