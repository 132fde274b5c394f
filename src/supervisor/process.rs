// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lifecycle of named agent server processes.
//!
//! Each supervised agent is a child process serving the control API on a
//! loopback port. The supervisor starts it on demand, waits for readiness,
//! lazily opens one conversation session, relays prompts, and forgets the
//! entry when the process exits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::client::{ClientFactory, ControlApi, HttpClientFactory};
use super::reply::NO_REPLY;
use super::retry::{BoundedRetry, Clock, RetryStep, TokioClock};
use crate::config::ResolvedServerConfig;
use crate::error::SupervisorError;
use crate::telemetry::GLOBAL_METRICS;

/// How long `shutdown` waits for the process to be reaped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Exit information of a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Spawned, waiting for the control API to answer.
    Starting,
    /// Answering requests.
    Ready,
    /// Exited but not yet forgotten.
    Exited,
}

/// Snapshot of one supervised agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub name: String,
    pub port: u16,
    pub url: String,
    pub session_id: Option<String>,
    pub active: bool,
    pub state: AgentState,
    pub pid: Option<u32>,
    pub cwd: Option<PathBuf>,
}

/// Outcome of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Text(String),
    /// Polling finished without any reply text.
    NoReply,
}

impl PromptReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            PromptReply::Text(text) => Some(text),
            PromptReply::NoReply => None,
        }
    }

    /// The reply text, or the no-reply sentinel.
    pub fn into_text(self) -> String {
        match self {
            PromptReply::Text(text) => text,
            PromptReply::NoReply => NO_REPLY.to_string(),
        }
    }
}

struct RemoteAgent {
    generation: u64,
    port: u16,
    pid: Option<u32>,
    cwd: Option<PathBuf>,
    client: Arc<dyn ControlApi>,
    ready: bool,
    session_id: Option<String>,
    input_buffer: Option<String>,
    exit: watch::Receiver<Option<ProcessExit>>,
    kill: Option<oneshot::Sender<()>>,
}

impl RemoteAgent {
    fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    fn connection(&self) -> Connection {
        Connection {
            generation: self.generation,
            port: self.port,
            client: Arc::clone(&self.client),
            session_id: self.session_id.clone(),
            exit: self.exit.clone(),
        }
    }

    fn summary(&self, name: &str, host: &str) -> AgentSummary {
        let active = self.is_alive();
        let state = match (active, self.ready) {
            (false, _) => AgentState::Exited,
            (true, false) => AgentState::Starting,
            (true, true) => AgentState::Ready,
        };
        AgentSummary {
            name: name.to_string(),
            port: self.port,
            url: base_url(host, self.port),
            session_id: self.session_id.clone(),
            active,
            state,
            pid: self.pid,
            cwd: self.cwd.clone(),
        }
    }
}

/// A ready server, detached from the table lock.
#[derive(Clone)]
struct Connection {
    generation: u64,
    port: u16,
    client: Arc<dyn ControlApi>,
    session_id: Option<String>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl Connection {
    fn exited(&self) -> bool {
        self.exit.borrow().is_some()
    }
}

struct Inner {
    settings: ResolvedServerConfig,
    factory: Arc<dyn ClientFactory>,
    clock: Arc<dyn Clock>,
    agents: Mutex<HashMap<String, RemoteAgent>>,
    startup: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    generation: AtomicU64,
}

fn lock_agents(inner: &Inner) -> MutexGuard<'_, HashMap<String, RemoteAgent>> {
    inner.agents.lock().unwrap_or_else(|p| p.into_inner())
}

/// Drop the startup lock of `name` unless a caller is holding or awaiting it.
fn release_startup_lock(inner: &Inner, name: &str) {
    let mut locks = inner.startup.lock().unwrap_or_else(|p| p.into_inner());
    if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        locks.remove(name);
    }
}

fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

/// Reserve a free loopback port by binding to port 0.
fn allocate_port(host: &str) -> Result<u16, SupervisorError> {
    let listener = std::net::TcpListener::bind((host, 0))
        .map_err(|e| SupervisorError::PortAllocation(format!("bind {}:0: {}", host, e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| SupervisorError::PortAllocation(e.to_string()))?
        .port();
    Ok(port)
}

/// Supervisor for named agent server processes.
///
/// Cheap to clone; clones share the same process table.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("command", &self.inner.settings.command)
            .field("agents", &lock_agents(&self.inner).len())
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(settings: ResolvedServerConfig) -> Self {
        Self::with_parts(settings, Arc::new(HttpClientFactory), Arc::new(TokioClock))
    }

    /// Create a supervisor with a custom client factory and clock.
    pub fn with_parts(
        settings: ResolvedServerConfig,
        factory: Arc<dyn ClientFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                factory,
                clock,
                agents: Mutex::new(HashMap::new()),
                startup: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &ResolvedServerConfig {
        &self.inner.settings
    }

    fn agents(&self) -> MutexGuard<'_, HashMap<String, RemoteAgent>> {
        lock_agents(&self.inner)
    }

    fn startup_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .inner
            .startup
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// A ready, live connection. Drops the entry if its process has exited.
    fn live_connection(&self, name: &str) -> Option<Connection> {
        let mut agents = self.agents();
        let agent = agents.get(name)?;
        if !agent.is_alive() {
            agents.remove(name);
            return None;
        }
        agent.ready.then(|| agent.connection())
    }

    /// Ensure a live server exists for `name` and return its port.
    ///
    /// A new process runs with `cwd` as its working directory; `cwd` is
    /// ignored when a live process is reused. Concurrent calls for one name
    /// start at most one process.
    pub async fn ensure_server(&self, name: &str, cwd: Option<&Path>) -> Result<u16, SupervisorError> {
        if let Some(conn) = self.live_connection(name) {
            return Ok(conn.port);
        }
        let lock = self.startup_lock(name);
        let result = {
            let _guard = lock.lock().await;
            self.ensure_server_locked(name, cwd).await
        };
        drop(lock);
        if result.is_err() {
            release_startup_lock(&self.inner, name);
        }
        Ok(result?.port)
    }

    async fn ensure_server_locked(
        &self,
        name: &str,
        cwd: Option<&Path>,
    ) -> Result<Connection, SupervisorError> {
        match self.live_connection(name) {
            Some(conn) => Ok(conn),
            None => self.start(name, cwd).await,
        }
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, cwd), fields(cwd = ?cwd)))]
    async fn start(&self, name: &str, cwd: Option<&Path>) -> Result<Connection, SupervisorError> {
        let settings = &self.inner.settings;
        let timer = GLOBAL_METRICS.start("supervisor.spawn");

        let port = match allocate_port(&settings.host) {
            Ok(port) => port,
            Err(e) => {
                timer.finish(false);
                return Err(e);
            }
        };

        let mut cmd = Command::new(&settings.command);
        cmd.args(settings.args_for_port(port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                timer.finish(false);
                return Err(SupervisorError::Spawn {
                    name: name.to_string(),
                    message: format!("{}: {}", settings.command, e),
                });
            }
        };
        let pid = child.id();
        GLOBAL_METRICS.record_spawn();

        if let Some(stderr) = child.stderr.take() {
            let label = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(agent = %label, "{}", line);
                }
            });
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        let client = self.inner.factory.connect(&base_url(&settings.host, port));

        self.agents().insert(
            name.to_string(),
            RemoteAgent {
                generation,
                port,
                pid,
                cwd: cwd.map(Path::to_path_buf),
                client: Arc::clone(&client),
                ready: false,
                session_id: None,
                input_buffer: None,
                exit: exit_rx.clone(),
                kill: Some(kill_tx),
            },
        );

        tokio::spawn(watch_process(
            Arc::downgrade(&self.inner),
            name.to_string(),
            generation,
            child,
            kill_rx,
            exit_tx,
        ));

        info!(agent = %name, port, pid = ?pid, "Started agent server");

        if let Err(e) = self.wait_ready(name, port, client.as_ref(), &exit_rx).await {
            warn!(agent = %name, port, error = %e, "Agent server failed to start");
            self.terminate(name, generation).await;
            timer.finish(false);
            return Err(e);
        }

        let mut agents = self.agents();
        match agents.get_mut(name) {
            Some(agent) if agent.generation == generation && agent.is_alive() => {
                agent.ready = true;
                timer.finish(true);
                Ok(agent.connection())
            }
            _ => {
                timer.finish(false);
                Err(SupervisorError::Spawn {
                    name: name.to_string(),
                    message: "process exited during startup".to_string(),
                })
            }
        }
    }

    /// Poll the readiness check until it answers or the deadline passes.
    async fn wait_ready(
        &self,
        name: &str,
        port: u16,
        client: &dyn ControlApi,
        exit: &watch::Receiver<Option<ProcessExit>>,
    ) -> Result<(), SupervisorError> {
        let settings = &self.inner.settings;
        let clock = &self.inner.clock;
        let mut retry = BoundedRetry::deadline(settings.startup_timeout(), settings.startup_interval());
        retry.start(clock.now());

        loop {
            let exited = *exit.borrow();
            if let Some(status) = exited {
                return Err(SupervisorError::Spawn {
                    name: name.to_string(),
                    message: format!("process exited before becoming ready (code {:?})", status.code),
                });
            }

            match client.list_sessions().await {
                Ok(()) => return Ok(()),
                Err(e) => debug!(agent = %name, port, error = %e, "Agent server not ready"),
            }

            match retry.next_step(clock.now()) {
                RetryStep::Wait(delay) => clock.sleep(delay).await,
                RetryStep::Exhausted => {
                    return Err(SupervisorError::StartupTimeout {
                        name: name.to_string(),
                        port,
                        timeout_ms: settings.startup_timeout_ms,
                    })
                }
            }
        }
    }

    /// Remove the entry of `generation` and kill its process.
    async fn terminate(&self, name: &str, generation: u64) {
        let removed = {
            let mut agents = self.agents();
            match agents.get(name) {
                Some(agent) if agent.generation == generation => agents.remove(name),
                _ => None,
            }
        };
        if let Some(agent) = removed {
            kill_and_wait(agent).await;
        }
    }

    /// Ensure the server is running and has a conversation session.
    ///
    /// The session is created once per process and titled
    /// `wt_agent: <name>`.
    pub async fn ensure_session(
        &self,
        name: &str,
        cwd: Option<&Path>,
    ) -> Result<String, SupervisorError> {
        let (_, session_id) = self.session_connection(name, cwd).await?;
        Ok(session_id)
    }

    async fn session_connection(
        &self,
        name: &str,
        cwd: Option<&Path>,
    ) -> Result<(Connection, String), SupervisorError> {
        if let Some(conn) = self.live_connection(name) {
            if let Some(id) = conn.session_id.clone() {
                return Ok((conn, id));
            }
        }

        let lock = self.startup_lock(name);
        let _guard = lock.lock().await;
        let mut conn = self.ensure_server_locked(name, cwd).await?;
        if let Some(id) = conn.session_id.clone() {
            return Ok((conn, id));
        }

        let created = conn
            .client
            .create_session(&format!("wt_agent: {}", name))
            .await?;
        let id = created
            .session_id()
            .ok_or_else(|| SupervisorError::SessionCreation {
                name: name.to_string(),
                port: conn.port,
            })?
            .to_string();

        if let Some(agent) = self.agents().get_mut(name) {
            if agent.generation == conn.generation {
                agent.session_id = Some(id.clone());
            }
        }
        info!(agent = %name, session = %id, "Created agent session");
        conn.session_id = Some(id.clone());
        Ok((conn, id))
    }

    /// Send `text` to the agent and wait for reply text.
    ///
    /// Starts the server and session if needed. Returns the reply carried by
    /// the prompt response, otherwise polls the session history for a
    /// bounded number of attempts.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, text, cwd), fields(chars = text.len())))]
    pub async fn run_prompt(
        &self,
        name: &str,
        text: &str,
        cwd: Option<&Path>,
    ) -> Result<PromptReply, SupervisorError> {
        let timer = GLOBAL_METRICS.start("supervisor.prompt");
        let result = self.prompt_inner(name, text, cwd).await;
        timer.finish(result.is_ok());
        result
    }

    async fn prompt_inner(
        &self,
        name: &str,
        text: &str,
        cwd: Option<&Path>,
    ) -> Result<PromptReply, SupervisorError> {
        let (conn, session_id) = self.session_connection(name, cwd).await?;
        let died = || SupervisorError::ProcessDied {
            name: name.to_string(),
            port: conn.port,
            session_id: session_id.clone(),
        };

        let response = match conn
            .client
            .prompt(&session_id, &self.inner.settings.agent_profile, text)
            .await
        {
            Ok(response) => response,
            Err(_) if conn.exited() => return Err(died()),
            Err(e) => return Err(e),
        };

        if let Some(reply) = response.text() {
            return Ok(PromptReply::Text(reply));
        }

        let settings = &self.inner.settings;
        let clock = &self.inner.clock;
        let mut retry = BoundedRetry::attempts(settings.reply_attempts, settings.reply_interval());
        while let RetryStep::Wait(delay) = retry.next_step(clock.now()) {
            if conn.exited() {
                return Err(died());
            }
            clock.sleep(delay).await;
            match conn.client.messages(&session_id).await {
                Ok(history) => {
                    if let Some(reply) = history.text() {
                        return Ok(PromptReply::Text(reply));
                    }
                }
                Err(e) => debug!(agent = %name, error = %e, "Polling for reply failed"),
            }
        }

        debug!(agent = %name, attempts = retry.waits(), "No reply text");
        Ok(PromptReply::NoReply)
    }

    /// Summary of one agent, if known.
    pub fn describe(&self, name: &str) -> Option<AgentSummary> {
        self.agents()
            .get(name)
            .map(|agent| agent.summary(name, &self.inner.settings.host))
    }

    /// Summaries of all known agents, sorted by name.
    pub fn list(&self) -> Vec<AgentSummary> {
        let host = &self.inner.settings.host;
        let mut summaries: Vec<_> = self
            .agents()
            .iter()
            .map(|(name, agent)| agent.summary(name, host))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.agents().get(name).is_some_and(RemoteAgent::is_alive)
    }

    /// Name of the agent owning a conversation session.
    pub fn name_for_session(&self, session_id: &str) -> Option<String> {
        self.agents()
            .iter()
            .find(|(_, agent)| agent.session_id.as_deref() == Some(session_id))
            .map(|(name, _)| name.clone())
    }

    /// Kill the agent's process and forget it.
    ///
    /// Returns `false` if nothing was registered under `name`.
    pub async fn shutdown(&self, name: &str) -> bool {
        let removed = self.agents().remove(name);
        release_startup_lock(&self.inner, name);
        match removed {
            Some(agent) => {
                kill_and_wait(agent).await;
                info!(agent = %name, "Shut down agent server");
                true
            }
            None => false,
        }
    }

    /// Shut down every agent. Returns how many were live.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<_> = self.agents().drain().collect();
        let mut live = 0;
        for (name, agent) in drained {
            release_startup_lock(&self.inner, &name);
            if agent.is_alive() {
                live += 1;
            }
            kill_and_wait(agent).await;
            debug!(agent = %name, "Shut down agent server");
        }
        live
    }

    /// Append text to the agent's pending input, starting its server if
    /// needed. Chunks are separated by a blank line.
    pub async fn queue_input(
        &self,
        name: &str,
        text: &str,
        cwd: Option<&Path>,
    ) -> Result<(), SupervisorError> {
        self.ensure_server(name, cwd).await?;
        let mut agents = self.agents();
        let agent = agents
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotRunning(name.to_string()))?;
        match agent.input_buffer.as_mut() {
            Some(buffer) if !buffer.is_empty() => {
                buffer.push_str("\n\n");
                buffer.push_str(text);
            }
            _ => agent.input_buffer = Some(text.to_string()),
        }
        Ok(())
    }

    /// Take the pending input, leaving the buffer empty.
    pub fn flush_input(&self, name: &str) -> Option<String> {
        self.agents()
            .get_mut(name)
            .and_then(|agent| agent.input_buffer.take())
            .filter(|text| !text.is_empty())
    }

    #[cfg(test)]
    fn startup_lock_count(&self) -> usize {
        self.inner
            .startup
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Put input taken by [`flush_input`](Self::flush_input) back ahead of
    /// anything queued since.
    ///
    /// Returns `false` if the agent is gone and the input was dropped.
    pub fn restore_input(&self, name: &str, text: &str) -> bool {
        let mut agents = self.agents();
        let Some(agent) = agents.get_mut(name) else {
            return false;
        };
        agent.input_buffer = Some(match agent.input_buffer.take().filter(|b| !b.is_empty()) {
            Some(later) => format!("{}\n\n{}", text, later),
            None => text.to_string(),
        });
        true
    }

    /// Recent reply text of the agent's session, at most `limit` lines.
    ///
    /// Blank lines and lines without printable ASCII are dropped. `None`
    /// means the session has produced no text yet.
    pub async fn capture_output(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Option<String>, SupervisorError> {
        let conn = self
            .live_connection(name)
            .ok_or_else(|| SupervisorError::NotRunning(name.to_string()))?;
        let Some(session_id) = conn.session_id.clone() else {
            return Ok(None);
        };
        let Some(text) = conn.client.messages(&session_id).await?.text() else {
            return Ok(None);
        };

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| l.chars().any(|c| ('!'..='~').contains(&c)))
            .collect();
        let start = lines.len().saturating_sub(limit);
        let captured = lines[start..].join("\n");
        Ok((!captured.is_empty()).then_some(captured))
    }
}

async fn kill_and_wait(mut agent: RemoteAgent) {
    if let Some(kill) = agent.kill.take() {
        let _ = kill.send(());
    }
    let mut exit = agent.exit.clone();
    drop(agent);
    let exited = async move { exit.wait_for(Option::is_some).await.map(|_| ()) };
    if tokio::time::timeout(SHUTDOWN_GRACE, exited).await.is_err() {
        warn!("Agent server did not exit within {:?}", SHUTDOWN_GRACE);
    }
}

/// Own the child until it exits, then publish the exit and forget the entry
/// if it still belongs to this generation.
async fn watch_process(
    inner: Weak<Inner>,
    name: String,
    generation: u64,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            if let Err(e) = child.kill().await {
                debug!(agent = %name, error = %e, "Kill failed");
            }
            child.wait().await
        }
    };

    let code = status.ok().and_then(|s| s.code());
    exit_tx.send_replace(Some(ProcessExit { code }));
    GLOBAL_METRICS.record_exit();

    if let Some(inner) = inner.upgrade() {
        let mut agents = lock_agents(&inner);
        if agents.get(&name).is_some_and(|a| a.generation == generation) {
            agents.remove(&name);
            release_startup_lock(&inner, &name);
        }
    }
    info!(agent = %name, code = ?code, "Agent server exited");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::client::MockControlApi;
    use crate::supervisor::reply::{ReplyPayload, SessionCreated};
    use crate::supervisor::retry::ManualClock;
    use serde_json::json;

    fn settings(command: &str, args: &[&str]) -> ResolvedServerConfig {
        ResolvedServerConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            startup_timeout_ms: 1_000,
            startup_interval_ms: 100,
            reply_attempts: 3,
            reply_interval_ms: 10,
            ..Default::default()
        }
    }

    fn ready_mock() -> MockControlApi {
        let mut mock = MockControlApi::new();
        mock.expect_list_sessions().returning(|| Ok(()));
        mock
    }

    fn supervisor(
        settings: ResolvedServerConfig,
        api: MockControlApi,
        clock: &ManualClock,
    ) -> ProcessSupervisor {
        let api: Arc<dyn ControlApi> = Arc::new(api);
        let factory = move |_: &str| -> Arc<dyn ControlApi> { Arc::clone(&api) };
        ProcessSupervisor::with_parts(settings, Arc::new(factory), Arc::new(clock.clone()))
    }

    fn sleeper(api: MockControlApi, clock: &ManualClock) -> ProcessSupervisor {
        supervisor(settings("sleep", &["30"]), api, clock)
    }

    fn text_reply(text: &str) -> ReplyPayload {
        ReplyPayload::from_value(json!({"parts": [{"type": "text", "text": text}]}))
    }

    #[tokio::test]
    async fn test_ensure_server_reuses_live_process() {
        let clock = ManualClock::new();
        let sup = sleeper(ready_mock(), &clock);

        let first = sup.ensure_server("ada", None).await.unwrap();
        let second = sup.ensure_server("ada", None).await.unwrap();
        assert_eq!(first, second);

        let summary = sup.describe("ada").unwrap();
        assert!(summary.active);
        assert_eq!(summary.state, AgentState::Ready);
        assert_eq!(summary.url, format!("http://127.0.0.1:{}", first));
        assert!(summary.pid.is_some());

        assert!(sup.shutdown("ada").await);
        assert!(sup.describe("ada").is_none());
        assert!(!sup.shutdown("ada").await);
        assert_eq!(sup.startup_lock_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_ensure_server_starts_one_process() {
        let clock = ManualClock::new();
        let sup = sleeper(ready_mock(), &clock);

        let (a, b) = tokio::join!(sup.ensure_server("ada", None), sup.ensure_server("ada", None));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(sup.list().len(), 1);
        assert_eq!(sup.startup_lock_count(), 1);

        sup.shutdown_all().await;
        assert_eq!(sup.startup_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_startup_timeout_kills_process() {
        let clock = ManualClock::new();
        let mut mock = MockControlApi::new();
        mock.expect_list_sessions()
            .returning(|| Err(SupervisorError::api_message("connection refused")));
        let sup = sleeper(mock, &clock);

        let err = sup.ensure_server("ada", None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::StartupTimeout { timeout_ms: 1_000, .. }));
        assert!(sup.describe("ada").is_none());
        assert_eq!(sup.startup_lock_count(), 0);
        assert_eq!(clock.total_slept(), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let clock = ManualClock::new();
        let sup = supervisor(
            settings("/nonexistent/agent-server", &[]),
            MockControlApi::new(),
            &clock,
        );

        let err = sup.ensure_server("ada", None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(sup.list().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_immediate_reply_and_single_session() {
        let clock = ManualClock::new();
        let mut mock = ready_mock();
        mock.expect_create_session()
            .withf(|title| title == "wt_agent: ada")
            .times(1)
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_1".to_string() }));
        mock.expect_prompt()
            .withf(|session, agent, _| session == "ses_1" && agent == "build")
            .times(2)
            .returning(|_, _, text| Ok(text_reply(&format!("echo {}", text))));
        let sup = sleeper(mock, &clock);

        let reply = sup.run_prompt("ada", "one", None).await.unwrap();
        assert_eq!(reply, PromptReply::Text("echo one".to_string()));
        let reply = sup.run_prompt("ada", "two", None).await.unwrap();
        assert_eq!(reply.text(), Some("echo two"));

        assert_eq!(sup.name_for_session("ses_1").as_deref(), Some("ada"));
        assert_eq!(sup.describe("ada").unwrap().session_id.as_deref(), Some("ses_1"));
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_prompt_polls_history() {
        let clock = ManualClock::new();
        let mut mock = ready_mock();
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_1".to_string() }));
        mock.expect_prompt()
            .returning(|_, _, _| Ok(ReplyPayload::from_value(json!(null))));
        let mut polls = 0;
        mock.expect_messages().returning(move |_| {
            polls += 1;
            if polls < 2 {
                Err(SupervisorError::api_message("busy"))
            } else {
                Ok(ReplyPayload::from_value(json!([
                    {"info": {"role": "user"}, "parts": [{"type": "text", "text": "go"}]},
                    {"info": {"role": "assistant"}, "parts": [{"type": "text", "text": "done"}]}
                ])))
            }
        });
        let sup = sleeper(mock, &clock);

        let reply = sup.run_prompt("ada", "go", None).await.unwrap();
        assert_eq!(reply.text(), Some("done"));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(10); 2]);
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_prompt_without_reply_returns_sentinel() {
        let clock = ManualClock::new();
        let mut mock = ready_mock();
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_1".to_string() }));
        mock.expect_prompt()
            .returning(|_, _, _| Ok(ReplyPayload::from_value(json!({}))));
        mock.expect_messages()
            .times(3)
            .returning(|_| Ok(ReplyPayload::from_value(json!([]))));
        let sup = sleeper(mock, &clock);

        let reply = sup.run_prompt("ada", "go", None).await.unwrap();
        assert_eq!(reply, PromptReply::NoReply);
        assert_eq!(reply.into_text(), NO_REPLY);
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_unusable_session_response() {
        let clock = ManualClock::new();
        let mut mock = ready_mock();
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::from_value(json!({"ok": true}))));
        let sup = sleeper(mock, &clock);

        let err = sup.run_prompt("ada", "go", None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::SessionCreation { .. }));
        sup.shutdown_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_process_death_during_prompt() {
        let clock = ManualClock::new();
        let pid: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
        let pid_for_mock = Arc::clone(&pid);

        let mut mock = ready_mock();
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_9".to_string() }));
        mock.expect_prompt().returning(move |_, _, _| {
            if let Some(pid) = *pid_for_mock.lock().unwrap() {
                let _ = std::process::Command::new("kill")
                    .args(["-9", &pid.to_string()])
                    .status();
                std::thread::sleep(Duration::from_millis(300));
            }
            Err(SupervisorError::api_message("connection reset"))
        });
        let sup = sleeper(mock, &clock);

        sup.ensure_session("ada", None).await.unwrap();
        *pid.lock().unwrap() = sup.describe("ada").unwrap().pid;

        let err = sup.run_prompt("ada", "go", None).await.unwrap_err();
        match err {
            SupervisorError::ProcessDied { name, session_id, .. } => {
                assert_eq!(name, "ada");
                assert_eq!(session_id, "ses_9");
            }
            other => panic!("expected ProcessDied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exit_forgets_entry() {
        let clock = ManualClock::new();
        let sup = supervisor(settings("sleep", &["0.2"]), ready_mock(), &clock);

        sup.ensure_server("ada", None).await.unwrap();
        for _ in 0..100 {
            if sup.describe("ada").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(sup.describe("ada").is_none());
        assert!(!sup.is_alive("ada"));
        assert_eq!(sup.startup_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_server_runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let sup = supervisor(
            settings("sh", &["-c", "touch started && sleep 30"]),
            ready_mock(),
            &clock,
        );

        sup.ensure_server("ada", Some(dir.path())).await.unwrap();
        for _ in 0..100 {
            if dir.path().join("started").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(dir.path().join("started").exists());
        assert_eq!(sup.describe("ada").unwrap().cwd.as_deref(), Some(dir.path()));
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_queue_and_flush_input() {
        let clock = ManualClock::new();
        let sup = sleeper(ready_mock(), &clock);

        assert_eq!(sup.flush_input("ada"), None);
        sup.queue_input("ada", "first", None).await.unwrap();
        sup.queue_input("ada", "second", None).await.unwrap();
        assert_eq!(sup.flush_input("ada").as_deref(), Some("first\n\nsecond"));
        assert_eq!(sup.flush_input("ada"), None);
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_restore_input_goes_before_later_chunks() {
        let clock = ManualClock::new();
        let sup = sleeper(ready_mock(), &clock);

        assert!(!sup.restore_input("ada", "lost"));
        sup.queue_input("ada", "first", None).await.unwrap();
        let taken = sup.flush_input("ada").unwrap();
        sup.queue_input("ada", "later", None).await.unwrap();

        assert!(sup.restore_input("ada", &taken));
        assert_eq!(sup.flush_input("ada").as_deref(), Some("first\n\nlater"));
        sup.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_capture_output_keeps_last_lines() {
        let clock = ManualClock::new();
        let mut mock = ready_mock();
        mock.expect_create_session()
            .returning(|_| Ok(SessionCreated::Direct { id: "ses_1".to_string() }));
        mock.expect_messages().returning(|_| {
            Ok(ReplyPayload::from_value(json!([
                {"parts": [{"type": "text", "text": "one\n\n  two  \n\u{00e9}\nthree"}]}
            ])))
        });
        let sup = sleeper(mock, &clock);

        assert!(matches!(
            sup.capture_output("ada", 10).await,
            Err(SupervisorError::NotRunning(_))
        ));
        sup.ensure_server("ada", None).await.unwrap();
        assert_eq!(sup.capture_output("ada", 10).await.unwrap(), None);

        sup.ensure_session("ada", None).await.unwrap();
        let captured = sup.capture_output("ada", 2).await.unwrap();
        assert_eq!(captured.as_deref(), Some("two\nthree"));
        sup.shutdown_all().await;
    }

    #[test]
    fn test_allocate_port() {
        let port = allocate_port("127.0.0.1").unwrap();
        assert!(port > 0);
    }
}
