// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent server lifecycle against real child processes.

#![cfg(unix)]

mod common;

use std::time::Duration;

use tempfile::tempdir;

use codi_worktree::error::SupervisorError;
use codi_worktree::supervisor::{AgentState, PromptReply};

use common::{sleeping_config, supervisor, FakeAgent};

#[tokio::test]
async fn test_server_started_once_and_described() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&sleeping_config(), FakeAgent::replying("hi"));

    let port = sup.ensure_server("ada-0badc0de", Some(dir.path())).await.unwrap();
    assert_eq!(sup.ensure_server("ada-0badc0de", None).await.unwrap(), port);

    let summary = sup.describe("ada-0badc0de").unwrap();
    assert_eq!(summary.port, port);
    assert_eq!(summary.url, format!("http://127.0.0.1:{}", port));
    assert_eq!(summary.state, AgentState::Ready);
    assert!(summary.active);
    assert!(summary.pid.is_some());
    assert_eq!(summary.cwd.as_deref(), Some(dir.path()));
    assert!(summary.session_id.is_none());

    assert_eq!(sup.shutdown_all().await, 1);
    assert!(sup.describe("ada-0badc0de").is_none());
}

#[tokio::test]
async fn test_prompt_reply_and_captured_output() {
    let sup = supervisor(&sleeping_config(), FakeAgent::replying_later("line one\n\nline two"));

    let reply = sup.run_prompt("bo-12345678", "hello", None).await.unwrap();
    assert_eq!(reply, PromptReply::Text("line one\n\nline two".to_string()));
    assert_eq!(sup.name_for_session("ses_1").as_deref(), Some("bo-12345678"));

    let captured = sup.capture_output("bo-12345678", 1).await.unwrap();
    assert_eq!(captured.as_deref(), Some("line two"));

    assert!(sup.shutdown("bo-12345678").await);
    let err = sup.capture_output("bo-12345678", 10).await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning(_)));
}

#[tokio::test]
async fn test_missing_server_command_is_a_spawn_error() {
    let mut config = sleeping_config();
    config.server.command = "/nonexistent/agent-server".to_string();
    let sup = supervisor(&config, FakeAgent::replying("hi"));

    let err = sup.ensure_server("cy-00000001", None).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn { .. }), "{:?}", err);
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn test_exited_server_is_forgotten_and_restarted() {
    let mut config = sleeping_config();
    config.server.args = vec!["0.2".to_string()];
    let sup = supervisor(&config, FakeAgent::replying("hi"));

    sup.ensure_server("di-00000002", None).await.unwrap();
    let first_pid = sup.describe("di-00000002").and_then(|s| s.pid);

    for _ in 0..50 {
        if sup.describe("di-00000002").is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(!sup.is_alive("di-00000002"));
    assert!(sup.describe("di-00000002").is_none());

    sup.ensure_server("di-00000002", None).await.unwrap();
    let second_pid = sup.describe("di-00000002").and_then(|s| s.pid);
    assert_ne!(first_pid, second_pid);

    sup.shutdown_all().await;
}

#[tokio::test]
async fn test_queued_input_is_flushed_once() {
    let sup = supervisor(&sleeping_config(), FakeAgent::replying("hi"));

    sup.queue_input("ed-00000003", "first", None).await.unwrap();
    sup.queue_input("ed-00000003", "second", None).await.unwrap();
    assert!(sup.is_alive("ed-00000003"));

    assert_eq!(sup.flush_input("ed-00000003").as_deref(), Some("first\n\nsecond"));
    assert_eq!(sup.flush_input("ed-00000003"), None);

    sup.shutdown_all().await;
}
