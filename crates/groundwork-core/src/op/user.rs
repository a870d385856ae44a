// ── System accounts, SSH keys, passwords, sudo policy ──

use async_trait::async_trait;

use super::Converge;
use crate::error::OpError;
use crate::remote::{Remote, ensure_success};

use groundwork_exec::quote::quote;

/// Home directory of an account, `None` when the account is absent.
pub(crate) async fn home_dir(remote: &Remote, user: &str) -> Result<Option<String>, OpError> {
    let out = remote.run(&["getent", "passwd", "--", user]).await?;
    if !out.success() {
        return Ok(None);
    }
    let line = out.stdout_trimmed();
    match line.split(':').nth(5) {
        Some(home) if !home.is_empty() => Ok(Some(home.to_owned())),
        _ => Err(OpError::UnexpectedOutput {
            command: format!("getent passwd {user}"),
            detail: format!("unparseable passwd entry `{line}`"),
        }),
    }
}

/// A system account with a declared shell.
#[derive(Debug, Clone)]
pub struct EnsureUser {
    pub name: String,
    pub shell: String,
    /// System account: no aging, uid from the system range, no skel.
    pub system: bool,
    /// Explicit home directory; system accounts point at their data dir.
    pub home: Option<String>,
}

impl EnsureUser {
    async fn current_shell(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["getent", "passwd", "--", &self.name]).await?;
        if !out.success() {
            return Ok(None);
        }
        let line = out.stdout_trimmed();
        match line.split(':').nth(6) {
            Some(shell) => Ok(Some(shell.to_owned())),
            None => Err(OpError::UnexpectedOutput {
                command: format!("getent passwd {}", self.name),
                detail: format!("unparseable passwd entry `{line}`"),
            }),
        }
    }
}

#[async_trait]
impl Converge for EnsureUser {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        match self.current_shell(remote).await? {
            None => Ok(Some(format!("create {}", self.name))),
            Some(shell) if shell != self.shell => {
                Ok(Some(format!("shell {} -> {}", shell, self.shell)))
            }
            Some(_) => Ok(None),
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        if self.current_shell(remote).await?.is_some() {
            let out = remote
                .run(&["usermod", "-s", &self.shell, "--", &self.name])
                .await?;
            return ensure_success(&format!("usermod {}", self.name), &out);
        }
        let mut argv: Vec<&str> = vec!["useradd", "--shell", &self.shell];
        if self.system {
            argv.push("--system");
            argv.push("--no-create-home");
        } else {
            argv.push("--create-home");
        }
        if let Some(ref home) = self.home {
            argv.push("--home-dir");
            argv.push(home);
        }
        argv.push("--");
        argv.push(&self.name);
        let out = remote.run(&argv).await?;
        ensure_success(&format!("useradd {}", self.name), &out)
    }
}

/// The exact authorized_keys content of an account.
#[derive(Debug, Clone)]
pub struct AuthorizedKeys {
    pub user: String,
    pub keys: Vec<String>,
}

impl AuthorizedKeys {
    fn desired_content(&self) -> String {
        let mut content = self.keys.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        content
    }
}

#[async_trait]
impl Converge for AuthorizedKeys {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let Some(home) = home_dir(remote, &self.user).await? else {
            return Ok(Some(format!("install authorized_keys for {}", self.user)));
        };
        let keyfile = format!("{home}/.ssh/authorized_keys");
        let out = remote.run(&["cat", "--", &keyfile]).await?;
        if out.success() && out.stdout == self.desired_content() {
            Ok(None)
        } else {
            Ok(Some(format!("install authorized_keys for {}", self.user)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let Some(home) = home_dir(remote, &self.user).await? else {
            return Err(OpError::UnexpectedOutput {
                command: format!("getent passwd {}", self.user),
                detail: "no such user".into(),
            });
        };
        let dir = format!("{home}/.ssh");
        let keyfile = format!("{dir}/authorized_keys");
        let owner = format!("{0}:{0}", self.user);
        let script = format!(
            "mkdir -p {d} && cat > {f} && chown -R {o} {d} && chmod 700 {d} && chmod 600 {f}",
            d = quote(&dir),
            f = quote(&keyfile),
            o = quote(&owner),
        );
        let out = remote
            .sh_with_stdin(&script, self.desired_content().as_bytes())
            .await?;
        ensure_success(&format!("authorized_keys {}", self.user), &out)
    }
}

/// The crypt(3) password hash of an account, compared against the
/// shadow field and applied pre-hashed so the cleartext never travels.
#[derive(Debug, Clone)]
pub struct PasswordHash {
    pub user: String,
    pub hash: String,
}

#[async_trait]
impl Converge for PasswordHash {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["getent", "shadow", "--", &self.user]).await?;
        if !out.success() {
            // Account not created yet; the user op is ordered first.
            return Ok(Some(format!("set password for {}", self.user)));
        }
        let line = out.stdout_trimmed();
        match line.split(':').nth(1) {
            Some(current) if current == self.hash => Ok(None),
            Some(_) => Ok(Some(format!("update password for {}", self.user))),
            None => Err(OpError::UnexpectedOutput {
                command: format!("getent shadow {}", self.user),
                detail: format!("unparseable shadow entry `{line}`"),
            }),
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let stdin = format!("{}:{}\n", self.user, self.hash);
        let out = remote
            .run_with_stdin(&["chpasswd", "-e"], stdin.as_bytes())
            .await?;
        ensure_success("chpasswd -e", &out)
    }
}

/// A sudoers drop-in, validated by visudo before it lands. A rejected
/// policy never reaches /etc/sudoers.d, where it would break sudo for
/// every account at once.
#[derive(Debug, Clone)]
pub struct SudoersPolicy {
    /// Drop-in file name under /etc/sudoers.d.
    pub file: String,
    pub line: String,
}

impl SudoersPolicy {
    fn path(&self) -> String {
        format!("/etc/sudoers.d/{}", self.file)
    }

    fn desired_content(&self) -> String {
        format!("{}\n", self.line)
    }
}

#[async_trait]
impl Converge for SudoersPolicy {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let path = self.path();
        let out = remote.run(&["cat", "--", &path]).await?;
        if out.success() && out.stdout == self.desired_content() {
            Ok(None)
        } else {
            Ok(Some(format!("write {path}")))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let script = format!(
            "tmp=$(mktemp) && cat >\"$tmp\" && visudo -c -q -f \"$tmp\" && install -o root -g root -m 440 \"$tmp\" {} && rm -f -- \"$tmp\"",
            quote(&self.path()),
        );
        let out = remote
            .sh_with_stdin(&script, self.desired_content().as_bytes())
            .await?;
        ensure_success(&format!("visudo + install {}", self.path()), &out)
    }
}
