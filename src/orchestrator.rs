// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Facade over identity, workspaces, mutations and agent processes.
//!
//! ```text
//!   edit/write ──► IdentityResolver ──► WorkspaceManager ──► MutationEngine
//!                                            │                    │
//!                                   WorkspaceRegistry      MutationOutcome
//!                                            │                    │
//!   tool call ───────────────────────► CallInterceptor ◄──────────┘
//!
//!   spawn/prompt ──► IdentityResolver ──► ProcessSupervisor
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::config::ResolvedConfig;
use crate::error::CoreError;
use crate::identity::{is_agent_name, AgentIdentity, IsolationPolicy};
use crate::intercept::{CallInterceptor, EnrichedResult, ToolCall, ToolOutput};
use crate::mutation::{CommitRecord, EditOperation, MutationEngine};
use crate::supervisor::{AgentSummary, ProcessSupervisor, PromptReply};
use crate::workspace::{
    ResolvedWorkspace, WorkspaceManager, WorkspaceRecord, WorkspaceRegistry, WorktreeEntry,
};

/// An edit request: the substitution plus an optional commit description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    #[serde(flatten)]
    pub operation: EditOperation,
    #[serde(default)]
    pub description: Option<String>,
}

impl EditRequest {
    pub fn new(operation: EditOperation, description: Option<&str>) -> Self {
        Self {
            operation,
            description: description.map(str::to_string),
        }
    }
}

/// A whole-file write. The description is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl WriteRequest {
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            description: Some(description.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Edit,
    Write,
}

/// What an edit or write produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// Path relative to the workspace.
    pub title: String,
    pub output: String,
    pub relative_path: String,
    pub workspace_path: PathBuf,
    pub branch_name: String,
    pub diff: String,
    pub committed: bool,
}

impl MutationOutcome {
    fn new(kind: MutationKind, ws: &ResolvedWorkspace, record: CommitRecord) -> Self {
        let rel = &record.relative_path;
        let output = match (record.committed, kind) {
            (false, _) => format!("No changes to commit: {} on branch {}", rel, ws.branch_name),
            (true, MutationKind::Edit) => {
                format!("File edited and committed: {} on branch {}", rel, ws.branch_name)
            }
            (true, MutationKind::Write) => {
                format!("File written and committed: {} on branch {}", rel, ws.branch_name)
            }
        };
        Self {
            title: rel.clone(),
            output,
            relative_path: record.relative_path,
            workspace_path: ws.workspace_path.clone(),
            branch_name: ws.branch_name.clone(),
            diff: record.unified_diff,
            committed: record.committed,
        }
    }

    /// Result decoration for the after hook.
    pub fn enriched(&self) -> EnrichedResult {
        EnrichedResult {
            title: self.title.clone(),
            output: self.output.clone(),
            metadata: json!({
                "filePath": self.relative_path,
                "diff": self.diff,
            }),
        }
    }
}

/// What spawning an agent produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnOutcome {
    pub name: String,
    pub policy: IsolationPolicy,
    pub branch_name: String,
    /// Set for worktree agents.
    pub workspace_path: Option<PathBuf>,
    pub session_id: Option<String>,
    /// Reply received within the quick-reply window.
    pub reply: Option<String>,
    pub message: String,
}

/// Entry point tying the subsystems together.
pub struct Orchestrator {
    config: ResolvedConfig,
    registry: Arc<WorkspaceRegistry>,
    workspaces: Arc<WorkspaceManager>,
    mutations: MutationEngine,
    supervisor: ProcessSupervisor,
    interceptor: CallInterceptor,
}

impl Orchestrator {
    /// Create an orchestrator whose agents are reached over HTTP.
    pub fn new(repo_root: impl AsRef<Path>, config: ResolvedConfig) -> Self {
        let supervisor = ProcessSupervisor::new(config.server.clone());
        Self::with_supervisor(repo_root, config, supervisor)
    }

    pub fn with_supervisor(
        repo_root: impl AsRef<Path>,
        config: ResolvedConfig,
        supervisor: ProcessSupervisor,
    ) -> Self {
        let repo_root = repo_root.as_ref();
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspaces = Arc::new(WorkspaceManager::new(
            repo_root,
            &config,
            Arc::clone(&registry),
        ));
        let mutations = MutationEngine::new(workspaces.git().clone());
        let interceptor = CallInterceptor::new(Arc::clone(&workspaces), repo_root);
        Self {
            config,
            registry,
            workspaces,
            mutations,
            supervisor,
            interceptor,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn repo_root(&self) -> &Path {
        self.workspaces.repo_root()
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Identity for a session under a policy, honouring agent names.
    pub fn identity(&self, session: &str, policy: IsolationPolicy) -> AgentIdentity {
        let known = self.known_name(session);
        self.workspaces
            .identities()
            .derive(session, known.as_deref(), policy)
    }

    /// Agent name whose identity this session should reuse.
    ///
    /// An opted-in session reuses the identity of the workspace it joined;
    /// an agent's own session reuses the agent's name.
    fn known_name(&self, session: &str) -> Option<String> {
        if let Some(record) = self.registry.get(session).filter(|r| r.opted_in) {
            let joined = record
                .workspace_path
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| is_agent_name(n));
            if let Some(name) = joined {
                return Some(name.to_string());
            }
        }
        self.supervisor.name_for_session(session).or_else(|| {
            (self.registry.is_supervised(session) && is_agent_name(session))
                .then(|| session.to_string())
        })
    }

    async fn resolve(&self, session: &str, file_path: &str) -> Result<ResolvedWorkspace, CoreError> {
        let known = self.known_name(session);
        Ok(self
            .workspaces
            .resolve(session, session, known.as_deref(), Path::new(file_path))
            .await?)
    }

    /// Apply an exact-match edit in the session's workspace and commit it.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, request), fields(file = %request.operation.file_path)))]
    pub async fn edit_file(
        &self,
        session: &str,
        request: &EditRequest,
    ) -> Result<MutationOutcome, CoreError> {
        let file_path = CoreError::require("filePath", Some(request.operation.file_path.as_str()))?;
        let ws = self.resolve(session, file_path).await?;
        let record = self
            .mutations
            .edit_and_commit(&ws, &request.operation, request.description.as_deref())
            .await?;
        Ok(MutationOutcome::new(MutationKind::Edit, &ws, record))
    }

    /// Write a whole file in the session's workspace and commit it.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, request), fields(file = %request.file_path)))]
    pub async fn write_file(
        &self,
        session: &str,
        request: &WriteRequest,
    ) -> Result<MutationOutcome, CoreError> {
        let description = CoreError::require("description", request.description.as_deref())?;
        let file_path = CoreError::require("filePath", Some(request.file_path.as_str()))?;
        let ws = self.resolve(session, file_path).await?;
        let record = self
            .mutations
            .write_and_commit(&ws, &request.content, Some(description))
            .await?;
        Ok(MutationOutcome::new(MutationKind::Write, &ws, record))
    }

    /// Start an agent on behalf of `session` and hand it a task.
    ///
    /// Worktree agents run inside their own workspace and get the prompt
    /// right away; a reply arriving within the quick-reply window is
    /// returned. Lazy agents run in the repository root and keep the prompt
    /// queued until the next `send_prompt`.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, initial_prompt)))]
    pub async fn spawn_agent(
        &self,
        session: &str,
        policy: IsolationPolicy,
        initial_prompt: &str,
    ) -> Result<SpawnOutcome, CoreError> {
        let prompt = CoreError::require("initial_prompt", Some(initial_prompt))?;
        let identity = self.workspaces.identities().derive(session, None, policy);
        let name = identity.workspace_name();

        match policy {
            IsolationPolicy::Worktree => self.spawn_worktree_agent(identity, name, prompt).await,
            IsolationPolicy::Lazy => {
                let root = self.repo_root().to_path_buf();
                let session_id = self.supervisor.ensure_session(&name, Some(&root)).await?;
                self.supervisor.queue_input(&name, prompt, Some(&root)).await?;
                info!(agent = %name, "Spawned lazy agent");
                Ok(SpawnOutcome {
                    message: format!("Session {} created", name),
                    name,
                    policy,
                    branch_name: identity.branch_name,
                    workspace_path: None,
                    session_id: Some(session_id),
                    reply: None,
                })
            }
        }
    }

    async fn spawn_worktree_agent(
        &self,
        identity: AgentIdentity,
        name: String,
        prompt: &str,
    ) -> Result<SpawnOutcome, CoreError> {
        self.registry.mark_supervised(&name);
        let workspace = self.workspaces.materialize(&identity).await?;
        self.registry
            .register(&name, &workspace, &identity.branch_name);

        let session_id = self.supervisor.ensure_session(&name, Some(&workspace)).await?;
        self.registry.mark_supervised(&session_id);
        self.registry
            .register(&session_id, &workspace, &identity.branch_name);

        let supervisor = self.supervisor.clone();
        let agent = name.clone();
        let text = prompt.to_string();
        let cwd = workspace.clone();
        let run = tokio::spawn(async move { supervisor.run_prompt(&agent, &text, Some(&cwd)).await });

        let window = self.config.server.quick_reply_window();
        let reply = match tokio::time::timeout(window, run).await {
            Ok(Ok(Ok(PromptReply::Text(text)))) => Some(text),
            Ok(Ok(Ok(PromptReply::NoReply))) => None,
            Ok(Ok(Err(e))) => {
                warn!(agent = %name, error = %e, "Initial prompt failed");
                None
            }
            Ok(Err(e)) => {
                warn!(agent = %name, error = %e, "Initial prompt task failed");
                None
            }
            Err(_) => {
                debug!(agent = %name, "No quick reply; prompt continues in background");
                None
            }
        };

        info!(agent = %name, path = %workspace.display(), "Spawned worktree agent");
        Ok(SpawnOutcome {
            message: reply
                .clone()
                .unwrap_or_else(|| format!("Session {} created", name)),
            name,
            policy: IsolationPolicy::Worktree,
            branch_name: identity.branch_name,
            workspace_path: Some(workspace),
            session_id: Some(session_id),
            reply,
        })
    }

    /// Send a prompt to a running agent and return its reply text.
    ///
    /// Queued input is sent first, followed by `text`.
    pub async fn send_prompt(&self, name: &str, text: &str) -> Result<String, CoreError> {
        let name = CoreError::require("name", Some(name))?;
        let text = CoreError::require("prompt", Some(text))?;

        let Some(summary) = self.supervisor.describe(name).filter(|s| s.active) else {
            return Ok(format!("Session {} not running", name));
        };

        let queued = self.supervisor.flush_input(name);
        let message = match &queued {
            Some(queued) => format!("{}\n\n{}", queued, text),
            None => text.to_string(),
        };

        let reply = match self
            .supervisor
            .run_prompt(name, &message, summary.cwd.as_deref())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // Queued input goes back; the caller's own text is not queued.
                if let Some(queued) = queued {
                    if !self.supervisor.restore_input(name, &queued) {
                        warn!(agent = %name, "Dropped queued input of exited agent");
                    }
                }
                return Err(e.into());
            }
        };
        Ok(match reply {
            PromptReply::Text(text) => text,
            PromptReply::NoReply => format!("Session {} responded without text", name),
        })
    }

    /// Recent output of an agent, at most `limit` lines.
    pub async fn capture_output(&self, name: &str, limit: usize) -> Result<String, CoreError> {
        let name = CoreError::require("name", Some(name))?;
        if !self.supervisor.is_alive(name) {
            return Ok(format!("Session {} not running", name));
        }
        Ok(self
            .supervisor
            .capture_output(name, limit)
            .await?
            .unwrap_or_else(|| format!("Session {} has no output", name)))
    }

    /// Supervised agents whose names are identity-derived.
    pub fn list_agents(&self) -> Vec<AgentSummary> {
        self.supervisor
            .list()
            .into_iter()
            .filter(|s| is_agent_name(&s.name))
            .collect()
    }

    /// Stop an agent's process.
    pub async fn kill_agent(&self, name: &str) -> Result<String, CoreError> {
        let name = CoreError::require("name", Some(name))?;
        Ok(if self.supervisor.shutdown(name).await {
            format!("Session {} killed", name)
        } else {
            format!("Session {} not found", name)
        })
    }

    /// Stop every agent process.
    pub async fn shutdown(&self) -> usize {
        self.supervisor.shutdown_all().await
    }

    /// Opt an unsupervised session into a workspace.
    ///
    /// Without `agent` the session joins its own workspace, creating it if
    /// needed. With `agent` it joins that agent's existing workspace.
    pub async fn jump_in(
        &self,
        session: &str,
        agent: Option<&str>,
    ) -> Result<WorkspaceRecord, CoreError> {
        if self.registry.is_supervised(session) {
            return Err(CoreError::WorkspaceLocked(session.to_string()));
        }

        let target = agent.map(str::trim).filter(|a| !a.is_empty());
        let (path, branch) = match target {
            None => {
                let identity =
                    self.workspaces
                        .identities()
                        .derive(session, None, IsolationPolicy::Worktree);
                let path = self.workspaces.materialize(&identity).await?;
                (path, identity.branch_name)
            }
            Some(name) => {
                let path = self.workspaces.workspace_path_for(name);
                if !is_agent_name(name) || !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(CoreError::WorkspaceNotFound(name.to_string()));
                }
                let identity =
                    self.workspaces
                        .identities()
                        .derive(name, Some(name), IsolationPolicy::Worktree);
                (path, identity.branch_name)
            }
        };

        self.registry.opt_in(session, &path, &branch)?;
        self.registry
            .get(session)
            .ok_or_else(|| CoreError::WorkspaceNotFound(session.to_string()))
    }

    /// Return an unsupervised session to the outer checkout.
    pub fn jump_out(&self, session: &str) -> Result<Option<WorkspaceRecord>, CoreError> {
        self.registry.opt_out(session)
    }

    /// Workspaces under the workspaces root.
    pub async fn worktrees(&self) -> Result<Vec<WorktreeEntry>, CoreError> {
        Ok(self.workspaces.list().await?)
    }

    /// Remove a workspace. Returns the sessions that were routed into it.
    pub async fn remove_worktree(&self, path: &Path) -> Result<Vec<String>, CoreError> {
        Ok(self.workspaces.remove(path).await?)
    }

    /// Route a tool call into its session's workspace.
    pub fn before_tool(&self, call: &mut ToolCall) -> bool {
        self.interceptor.before(call)
    }

    /// Promote an enriched result over the tool's plain one.
    pub fn after_tool(&self, output: &mut ToolOutput) -> bool {
        self.interceptor.after(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::{ControlApi, ManualClock, MockControlApi, ReplyPayload, SessionCreated};
    use crate::workspace::git::test_support::init_repo;
    use tempfile::tempdir;

    fn config() -> ResolvedConfig {
        let mut config = ResolvedConfig::default();
        config.server.command = "sleep".to_string();
        config.server.args = vec!["30".to_string()];
        config.server.reply_attempts = 2;
        config.server.quick_reply_window_ms = 2_000;
        config
    }

    fn orchestrator(root: &Path, api: MockControlApi) -> Orchestrator {
        let config = config();
        let api: Arc<dyn ControlApi> = Arc::new(api);
        let factory = move |_: &str| -> Arc<dyn ControlApi> { Arc::clone(&api) };
        let supervisor = ProcessSupervisor::with_parts(
            config.server.clone(),
            Arc::new(factory),
            Arc::new(ManualClock::new()),
        );
        Orchestrator::with_supervisor(root, config, supervisor)
    }

    fn agent_api(reply: &'static str) -> MockControlApi {
        let mut mock = MockControlApi::new();
        mock.expect_list_sessions().returning(|| Ok(()));
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_agent".to_string() }));
        mock.expect_prompt().returning(move |_, _, _| {
            Ok(ReplyPayload::from_value(
                json!({"parts": [{"type": "text", "text": reply}]}),
            ))
        });
        mock.expect_messages()
            .returning(|_| Ok(ReplyPayload::from_value(json!([]))));
        mock
    }

    #[tokio::test]
    async fn test_write_then_edit_outcomes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let written = orch
            .write_file("s1", &WriteRequest::new("a.txt", "v1\n", "init"))
            .await
            .unwrap();
        assert!(written.committed);
        assert_eq!(written.title, "a.txt");
        assert!(written.output.starts_with("File written and committed: a.txt on branch opencode/"));

        let edited = orch
            .edit_file(
                "s1",
                &EditRequest::new(EditOperation::new("a.txt", "v1", "v2"), None),
            )
            .await
            .unwrap();
        assert!(edited.output.starts_with("File edited and committed: a.txt"));
        assert_eq!(edited.workspace_path, written.workspace_path);
        assert!(edited.diff.contains("-v1\n+v2"));

        let enriched = edited.enriched();
        assert_eq!(enriched.metadata["filePath"], "a.txt");
        assert_eq!(enriched.metadata["diff"], edited.diff.as_str());
    }

    #[tokio::test]
    async fn test_write_requires_description() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let mut request = WriteRequest::new("a.txt", "v1", "x");
        request.description = Some("  ".to_string());
        let err = orch.write_file("s1", &request).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingArgument(ref a) if a == "description"));
        assert!(orch.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_write_reports_no_changes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let request = WriteRequest::new("a.txt", "same\n", "init");
        orch.write_file("s1", &request).await.unwrap();
        let again = orch.write_file("s1", &request).await.unwrap();
        assert!(!again.committed);
        assert!(again.output.starts_with("No changes to commit: a.txt"));
    }

    #[tokio::test]
    async fn test_tool_calls_follow_mutations() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let outcome = orch
            .write_file("s1", &WriteRequest::new("a.txt", "x\n", "init"))
            .await
            .unwrap();

        let mut call = ToolCall::new("s1", "c1", "bash", json!({"command": "ls"}));
        assert!(orch.before_tool(&mut call));
        assert_eq!(
            call.args["cwd"],
            outcome.workspace_path.to_string_lossy().as_ref()
        );

        let mut output = ToolOutput::plain("write", "ok").with_enriched(outcome.enriched());
        assert!(orch.after_tool(&mut output));
        assert_eq!(output.title, "a.txt");
        assert!(!orch.after_tool(&mut output));
    }

    #[tokio::test]
    async fn test_jump_in_and_out() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let record = orch.jump_in("s1", None).await.unwrap();
        assert!(record.opted_in);
        assert!(record.workspace_path.exists());

        let joined = orch
            .jump_in("s2", record.workspace_path.file_name().and_then(|n| n.to_str()))
            .await
            .unwrap();
        assert_eq!(joined.workspace_path, record.workspace_path);
        assert_eq!(joined.branch_name, record.branch_name);

        let err = orch.jump_in("s3", Some("nobody-00000000")).await.unwrap_err();
        assert!(matches!(err, CoreError::WorkspaceNotFound(_)));

        let removed = orch.jump_out("s1").unwrap().unwrap();
        assert_eq!(removed.session_handle, "s1");
        assert!(orch.registry().get("s1").is_none());
        assert!(orch.jump_out("s1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_opted_in_session_edits_joined_workspace() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let own = orch.jump_in("owner", None).await.unwrap();
        let name = own.workspace_path.file_name().unwrap().to_str().unwrap().to_string();
        orch.jump_in("visitor", Some(&name)).await.unwrap();

        let outcome = orch
            .write_file("visitor", &WriteRequest::new("b.txt", "b\n", "add b"))
            .await
            .unwrap();
        assert_eq!(outcome.workspace_path, own.workspace_path);
        assert_eq!(outcome.branch_name, own.branch_name);
    }

    #[tokio::test]
    async fn test_spawn_worktree_agent_returns_quick_reply() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), agent_api("on it"));

        let outcome = orch
            .spawn_agent("caller", IsolationPolicy::Worktree, "build the thing")
            .await
            .unwrap();
        assert_eq!(outcome.reply.as_deref(), Some("on it"));
        assert_eq!(outcome.message, "on it");
        assert!(is_agent_name(&outcome.name));

        let workspace = outcome.workspace_path.clone().unwrap();
        assert!(workspace.exists());
        assert!(orch.registry().is_supervised(&outcome.name));
        assert!(orch.registry().is_supervised("ses_agent"));
        assert_eq!(orch.registry().workspace_path("ses_agent"), Some(workspace.clone()));

        let err = orch.jump_out("ses_agent").unwrap_err();
        assert!(matches!(err, CoreError::WorkspaceLocked(_)));
        let err = orch.jump_in("ses_agent", None).await.unwrap_err();
        assert!(matches!(err, CoreError::WorkspaceLocked(_)));

        // The agent's own mutations land in its workspace under its identity.
        let written = orch
            .write_file("ses_agent", &WriteRequest::new("c.txt", "c\n", "add c"))
            .await
            .unwrap();
        assert_eq!(written.workspace_path, workspace);
        assert_eq!(written.branch_name, outcome.branch_name);

        let agents = orch.list_agents();
        assert_eq!(agents.len(), 1);
        assert!(agents[0].active);

        assert_eq!(
            orch.kill_agent(&outcome.name).await.unwrap(),
            format!("Session {} killed", outcome.name)
        );
        assert_eq!(
            orch.kill_agent(&outcome.name).await.unwrap(),
            format!("Session {} not found", outcome.name)
        );
    }

    #[tokio::test]
    async fn test_lazy_agent_queues_prompt() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());

        let mut mock = MockControlApi::new();
        mock.expect_list_sessions().returning(|| Ok(()));
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_lazy".to_string() }));
        mock.expect_prompt()
            .withf(|_, _, text| text == "first task\n\nsecond task")
            .times(1)
            .returning(|_, _, _| Ok(ReplyPayload::from_value(json!(null))));
        mock.expect_messages()
            .returning(|_| Ok(ReplyPayload::from_value(json!([]))));
        let orch = orchestrator(dir.path(), mock);

        let outcome = orch
            .spawn_agent("caller", IsolationPolicy::Lazy, "first task")
            .await
            .unwrap();
        assert_eq!(outcome.message, format!("Session {} created", outcome.name));
        assert!(outcome.workspace_path.is_none());
        assert!(outcome.branch_name.starts_with("opencode/"));
        assert!(!orch.registry().is_supervised(&outcome.name));
        assert_eq!(
            orch.capture_output(&outcome.name, 5).await.unwrap(),
            format!("Session {} has no output", outcome.name)
        );

        let reply = orch.send_prompt(&outcome.name, "second task").await.unwrap();
        assert_eq!(reply, format!("Session {} responded without text", outcome.name));
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_prompt_validation_and_missing_agent() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let orch = orchestrator(dir.path(), MockControlApi::new());

        let err = orch
            .spawn_agent("caller", IsolationPolicy::Worktree, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingArgument(_)));

        let reply = orch.send_prompt("ada-00000000", "hi").await.unwrap();
        assert_eq!(reply, "Session ada-00000000 not running");
        assert_eq!(
            orch.capture_output("ada-00000000", 5).await.unwrap(),
            "Session ada-00000000 not running"
        );

        assert!(matches!(
            orch.kill_agent("").await,
            Err(CoreError::MissingArgument(_))
        ));
    }
}
