// ── File, directory, and symlink convergence ──
//
// Content comparison is by sha256: the declared content is hashed
// locally and compared against `sha256sum` on the host, so unchanged
// files are never re-uploaded. Uploads go through mktemp + install(1),
// which sets owner and mode in the same step the file lands.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{ChangeTag, Converge};
use crate::error::OpError;
use crate::remote::{Remote, ensure_success};

use groundwork_exec::quote::quote;

pub(crate) fn local_sha256(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Hash of a remote file, `None` when it does not exist.
pub(crate) async fn remote_sha256(remote: &Remote, path: &str) -> Result<Option<String>, OpError> {
    let out = remote.run(&["sha256sum", "--", path]).await?;
    if !out.success() {
        return Ok(None);
    }
    match out.stdout.split_whitespace().next() {
        Some(hash) => Ok(Some(hash.to_owned())),
        None => Err(OpError::UnexpectedOutput {
            command: format!("sha256sum {path}"),
            detail: "no hash on stdout".into(),
        }),
    }
}

/// `owner:group:mode` of a remote path, `None` when it does not exist.
pub(crate) async fn stat_owner_mode(
    remote: &Remote,
    path: &str,
) -> Result<Option<(String, String, String)>, OpError> {
    let out = remote.run(&["stat", "-c", "%U:%G:%a", "--", path]).await?;
    if !out.success() {
        return Ok(None);
    }
    let line = out.stdout_trimmed();
    let mut parts = line.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(group), Some(mode)) => {
            Ok(Some((owner.to_owned(), group.to_owned(), mode.to_owned())))
        }
        _ => Err(OpError::UnexpectedOutput {
            command: format!("stat {path}"),
            detail: format!("unparseable `{line}`"),
        }),
    }
}

/// Write content to a remote path with the given ownership and mode,
/// via a temp file so a torn connection never leaves a half-written
/// target in place.
pub(crate) async fn upload(
    remote: &Remote,
    path: &str,
    content: &[u8],
    owner: &str,
    group: &str,
    mode: &str,
) -> Result<(), OpError> {
    let script = format!(
        "tmp=$(mktemp) && cat >\"$tmp\" && install -o {} -g {} -m {} \"$tmp\" {} && rm -f -- \"$tmp\"",
        quote(owner),
        quote(group),
        quote(mode),
        quote(path),
    );
    let out = remote.sh_with_stdin(&script, content).await?;
    ensure_success(&format!("install {path}"), &out)
}

/// A file with declared content, ownership, and mode.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub owner: String,
    pub group: String,
    /// Octal, as `stat -c %a` prints it (e.g. `644`, `2750`).
    pub mode: String,
    pub tag: Option<ChangeTag>,
}

#[async_trait]
impl Converge for FileContent {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let desired = local_sha256(self.content.as_bytes());
        match remote_sha256(remote, &self.path).await? {
            None => return Ok(Some(format!("create {}", self.path))),
            Some(hash) if hash != desired => return Ok(Some(format!("update {}", self.path))),
            Some(_) => {}
        }
        match stat_owner_mode(remote, &self.path).await? {
            Some((owner, group, mode))
                if owner == self.owner && group == self.group && mode == self.mode =>
            {
                Ok(None)
            }
            _ => Ok(Some(format!("owner/mode {}", self.path))),
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let desired = local_sha256(self.content.as_bytes());
        if remote_sha256(remote, &self.path).await?.as_deref() != Some(desired.as_str()) {
            return upload(
                remote,
                &self.path,
                self.content.as_bytes(),
                &self.owner,
                &self.group,
                &self.mode,
            )
            .await;
        }
        // Content already matches, so only ownership or mode drifted.
        let owner_spec = format!("{}:{}", self.owner, self.group);
        let out = remote.run(&["chown", &owner_spec, "--", &self.path]).await?;
        ensure_success(&format!("chown {}", self.path), &out)?;
        let out = remote.run(&["chmod", &self.mode, "--", &self.path]).await?;
        ensure_success(&format!("chmod {}", self.path), &out)
    }
}

/// A path that must not exist.
#[derive(Debug, Clone)]
pub struct FileAbsent {
    pub path: String,
    pub tag: Option<ChangeTag>,
}

#[async_trait]
impl Converge for FileAbsent {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        // -e follows symlinks, so a dangling link needs the -L probe.
        let script = format!("test -e {p} || test -L {p}", p = quote(&self.path));
        let out = remote.sh(&script).await?;
        if out.success() {
            Ok(Some(format!("remove {}", self.path)))
        } else {
            Ok(None)
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let out = remote.run(&["rm", "-f", "--", &self.path]).await?;
        ensure_success(&format!("rm {}", self.path), &out)
    }
}

/// A directory with declared ownership and mode.
#[derive(Debug, Clone)]
pub struct Directory {
    pub path: String,
    pub owner: String,
    pub group: String,
    pub mode: String,
}

#[async_trait]
impl Converge for Directory {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        match stat_owner_mode(remote, &self.path).await? {
            None => Ok(Some(format!("create {}", self.path))),
            Some((owner, group, mode)) => {
                if owner == self.owner && group == self.group && mode == self.mode {
                    Ok(None)
                } else {
                    Ok(Some(format!("owner/mode {}", self.path)))
                }
            }
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        // install -d creates missing parents and fixes attributes on an
        // existing directory in one call.
        let out = remote
            .run(&[
                "install", "-d", "-o", &self.owner, "-g", &self.group, "-m", &self.mode, "--",
                &self.path,
            ])
            .await?;
        ensure_success(&format!("install -d {}", self.path), &out)
    }
}

/// A symlink pointing at a declared target.
#[derive(Debug, Clone)]
pub struct Symlink {
    pub path: String,
    pub target: String,
    pub tag: Option<ChangeTag>,
}

#[async_trait]
impl Converge for Symlink {
    async fn check(&self, remote: &Remote) -> Result<Option<String>, OpError> {
        let out = remote.run(&["readlink", "--", &self.path]).await?;
        if out.success() && out.stdout_trimmed() == self.target {
            Ok(None)
        } else {
            Ok(Some(format!("link {} -> {}", self.path, self.target)))
        }
    }

    async fn apply(&self, remote: &Remote) -> Result<(), OpError> {
        let out = remote
            .run(&["ln", "-sfn", "--", &self.target, &self.path])
            .await?;
        ensure_success(&format!("ln -sfn {}", self.path), &out)
    }
}
