// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workspace reuse under a translated git.
//!
//! Kept in its own test binary because it changes the process locale.

#![cfg(unix)]

mod common;

use tempfile::tempdir;

use codi_worktree::WriteRequest;

use common::{init_repo, orchestrator, FakeAgent};

#[tokio::test]
async fn test_repeated_writes_reuse_workspace_under_german_locale() {
    std::env::set_var("LANGUAGE", "de");
    std::env::set_var("LANG", "de_DE.UTF-8");
    std::env::set_var("LC_ALL", "de_DE.UTF-8");

    let dir = tempdir().unwrap();
    init_repo(dir.path());
    let orch = orchestrator(dir.path(), FakeAgent::replying("ok"));

    let first = orch
        .write_file("s1", &WriteRequest::new("a.txt", "one\n", "Add a"))
        .await
        .unwrap();
    let second = orch
        .write_file("s1", &WriteRequest::new("a.txt", "two\n", "Change a"))
        .await
        .unwrap();

    assert_eq!(first.workspace_path, second.workspace_path);
    assert!(second.committed);
    assert!(second.output.starts_with("File written and committed: a.txt"));

    // A fresh orchestrator finds the existing branch and worktree.
    let fresh = orchestrator(dir.path(), FakeAgent::replying("ok"));
    let third = fresh
        .write_file("s1", &WriteRequest::new("a.txt", "three\n", "Change a again"))
        .await
        .unwrap();
    assert_eq!(third.workspace_path, first.workspace_path);
    assert_eq!(orch.worktrees().await.unwrap().len(), 1);
}
