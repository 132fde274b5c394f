// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use codi_worktree::config::ResolvedConfig;
use codi_worktree::error::SupervisorError;
use codi_worktree::supervisor::{
    ControlApi, ManualClock, ProcessSupervisor, ReplyPayload, SessionCreated,
};
use codi_worktree::Orchestrator;

/// Run git in `dir` and return trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?}: {:?}", args, output);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// A repository with one commit on its default branch.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "init"]);
}

/// One prompt as the fake server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenPrompt {
    pub session_id: String,
    pub agent: String,
    pub text: String,
}

/// In-memory agent server.
///
/// Sessions are numbered `ses_1`, `ses_2`, ... and every prompt is
/// answered with `reply` directly, or only through the history when
/// `history_only` is set. While failing, prompts are rejected unseen.
#[derive(Default)]
pub struct FakeAgent {
    pub reply: String,
    pub history_only: bool,
    failing: AtomicBool,
    sessions: Mutex<u32>,
    prompts: Mutex<Vec<SeenPrompt>>,
}

impl FakeAgent {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            ..Default::default()
        })
    }

    pub fn replying_later(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            history_only: true,
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<SeenPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlApi for FakeAgent {
    async fn list_sessions(&self) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn create_session(&self, _title: &str) -> Result<SessionCreated, SupervisorError> {
        let mut count = self.sessions.lock().unwrap();
        *count += 1;
        Ok(SessionCreated::from_value(
            json!({"data": {"id": format!("ses_{}", count)}}),
        ))
    }

    async fn prompt(
        &self,
        session_id: &str,
        agent: &str,
        text: &str,
    ) -> Result<ReplyPayload, SupervisorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SupervisorError::api_message("agent busy"));
        }
        self.prompts.lock().unwrap().push(SeenPrompt {
            session_id: session_id.to_string(),
            agent: agent.to_string(),
            text: text.to_string(),
        });
        if self.history_only {
            return Ok(ReplyPayload::from_value(json!({})));
        }
        Ok(ReplyPayload::from_value(
            json!({"parts": [{"type": "text", "text": self.reply}]}),
        ))
    }

    async fn messages(&self, _session_id: &str) -> Result<ReplyPayload, SupervisorError> {
        let prompts = self.prompts.lock().unwrap();
        let mut history: Vec<_> = prompts
            .iter()
            .map(|seen| json!({"info": {"role": "user"}, "parts": [{"type": "text", "text": seen.text}]}))
            .collect();
        if !prompts.is_empty() {
            history.push(json!({"info": {"role": "assistant"}, "parts": [{"type": "text", "text": self.reply}]}));
        }
        Ok(ReplyPayload::from_value(json!({"data": history})))
    }
}

/// Configuration whose agent servers are idle `sleep` processes.
pub fn sleeping_config() -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    config.server.command = "sleep".to_string();
    config.server.args = vec!["30".to_string()];
    config.server.reply_attempts = 3;
    config.server.quick_reply_window_ms = 2_000;
    config
}

/// Supervisor wired to `agent` with a manual clock.
pub fn supervisor(config: &ResolvedConfig, agent: Arc<FakeAgent>) -> ProcessSupervisor {
    let api: Arc<dyn ControlApi> = agent;
    let factory = move |_: &str| -> Arc<dyn ControlApi> { Arc::clone(&api) };
    ProcessSupervisor::with_parts(
        config.server.clone(),
        Arc::new(factory),
        Arc::new(ManualClock::new()),
    )
}

pub fn orchestrator(root: &Path, agent: Arc<FakeAgent>) -> Orchestrator {
    let config = sleeping_config();
    let supervisor = supervisor(&config, agent);
    Orchestrator::with_supervisor(root, config, supervisor)
}
