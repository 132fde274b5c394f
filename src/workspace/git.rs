// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thin async wrapper around the `git` executable.
//!
//! Every call runs `git` as a subprocess with piped output and the C locale,
//! so messages are stable whatever the user's language. Author overrides
//! are passed as `-c user.name=... -c user.email=...` on the one commit
//! invocation, never written to repository config.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::GitError;
use crate::telemetry::GLOBAL_METRICS;

/// Environment applied to every git invocation.
const GIT_ENV: [(&str, &str); 2] = [("LC_ALL", "C"), ("LANGUAGE", "")];

/// Commit author applied to a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// One block of `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    /// Short branch name (without `refs/heads/`).
    pub branch: Option<String>,
    pub detached: bool,
}

/// Runs git commands against one repository.
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            repo_root: repo_root.as_ref().to_path_buf(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run a git command in the repository root and return trimmed stdout.
    pub async fn git(&self, args: &[&str]) -> Result<String, GitError> {
        self.git_in(&self.repo_root, args)
            .await
            .map(|out| out.trim().to_string())
    }

    /// Run a git command in `dir` and return stdout untouched.
    pub async fn git_in(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let label = args
            .iter()
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .copied()
            .unwrap_or("git");
        let timer = GLOBAL_METRICS.start(format!("git.{}", label));

        debug!(dir = %dir.display(), ?args, "git");
        let result = Command::new("git")
            .args(args)
            .envs(GIT_ENV)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                timer.finish(false);
                return Err(GitError::Io(e));
            }
        };

        timer.finish(output.status.success());
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr,
            })
        }
    }

    /// Check if a local branch exists.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let out = self.git(&["branch", "--list", branch]).await?;
        Ok(!out.is_empty())
    }

    /// Create `branch` at the current HEAD without checking it out.
    ///
    /// Returns `true` if the branch was created by this call.
    pub async fn ensure_branch(&self, branch: &str) -> Result<bool, GitError> {
        if self.branch_exists(branch).await? {
            return Ok(false);
        }
        match self.git(&["branch", branch]).await {
            Ok(_) => {
                info!(branch, "Created branch");
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Add a worktree for `branch` at `path`.
    ///
    /// Returns `true` if a worktree was created, `false` if one already existed.
    pub async fn add_worktree(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        if self.has_worktree(path).await? {
            debug!(path = %path.display(), "Worktree already registered");
            return Ok(false);
        }
        let path_str = path.to_string_lossy();
        match self.git(&["worktree", "add", &path_str, branch]).await {
            Ok(_) => {
                info!(branch, path = %path.display(), "Added worktree");
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                debug!(path = %path.display(), "Worktree already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `path` is already one of the repository's worktrees.
    pub async fn has_worktree(&self, path: &Path) -> Result<bool, GitError> {
        let wanted = canonical(path).await;
        for entry in self.list_worktrees().await? {
            if entry.path == path || canonical(&entry.path).await == wanted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove a worktree, discarding uncommitted changes in it.
    pub async fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let path_str = path.to_string_lossy();
        self.git(&["worktree", "remove", "--force", &path_str]).await?;
        info!(path = %path.display(), "Removed worktree");
        Ok(())
    }

    /// List worktrees known to the repository.
    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&output))
    }

    /// Stage exactly one path inside `dir`.
    pub async fn stage(&self, dir: &Path, rel: &str) -> Result<(), GitError> {
        self.git_in(dir, &["add", "--", rel]).await.map(|_| ())
    }

    /// Diff of the staged changes for one path.
    pub async fn staged_diff(&self, dir: &Path, rel: &str) -> Result<String, GitError> {
        self.git_in(dir, &["diff", "--cached", "--", rel]).await
    }

    /// Commit only `rel`, optionally with a one-shot author override.
    pub async fn commit(
        &self,
        dir: &Path,
        rel: &str,
        message: &str,
        author: Option<&CommitAuthor>,
    ) -> Result<(), GitError> {
        let mut args: Vec<String> = Vec::new();
        if let Some(author) = author {
            args.push("-c".to_string());
            args.push(format!("user.name={}", author.name));
            args.push("-c".to_string());
            args.push(format!("user.email={}", author.email));
        }
        args.extend(
            ["commit", "-m", message, "--", rel]
                .iter()
                .map(|s| s.to_string()),
        );

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git_in(dir, &refs).await?;
        debug!(dir = %dir.display(), rel, "Committed");
        Ok(())
    }

    /// Current commit of the checkout at `dir`.
    pub async fn head(&self, dir: &Path) -> Result<String, GitError> {
        self.git_in(dir, &["rev-parse", "HEAD"])
            .await
            .map(|s| s.trim().to_string())
    }

    /// Current branch of the checkout at `dir` (empty when detached).
    pub async fn current_branch(&self, dir: &Path) -> Result<String, GitError> {
        self.git_in(dir, &["branch", "--show-current"])
            .await
            .map(|s| s.trim().to_string())
    }
}

async fn canonical(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Parse `git worktree list --porcelain` output.
///
/// Blocks are separated by blank lines; each has a `worktree <path>` line and
/// optionally `HEAD <sha>`, `branch <ref>` and `detached` lines.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();

    for block in output.split("\n\n") {
        let mut entry = WorktreeEntry::default();
        for line in block.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                entry.path = PathBuf::from(path);
            } else if let Some(head) = line.strip_prefix("HEAD ") {
                entry.head = Some(head.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
                entry.branch = Some(short.to_string());
            } else if line == "detached" {
                entry.detached = true;
            }
        }
        if !entry.path.as_os_str().is_empty() {
            entries.push(entry);
        }
    }

    entries
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    /// Initialise a repository with one commit so branches can be created.
    pub fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .output()
                .unwrap();
            assert!(status.status.success(), "git {:?}: {:?}", args, status);
        };
        run(&["init", "-q"]);
        run(&["config", "user.name", "Test"]);
        run(&["config", "user.email", "test@example.test"]);
        run(&["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        run(&["add", "README.md"]);
        run(&["commit", "-q", "-m", "init"]);
    }
}
