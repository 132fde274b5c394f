// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP control API of a spawned agent server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;

use super::reply::{ReplyPayload, SessionCreated};
use crate::error::SupervisorError;

/// Operations the supervisor needs from an agent server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// List sessions. Used as the readiness check.
    async fn list_sessions(&self) -> Result<(), SupervisorError>;

    async fn create_session(&self, title: &str) -> Result<SessionCreated, SupervisorError>;

    /// Submit a prompt under the given agent profile.
    async fn prompt(
        &self,
        session_id: &str,
        agent: &str,
        text: &str,
    ) -> Result<ReplyPayload, SupervisorError>;

    /// Fetch the conversation history of a session.
    async fn messages(&self, session_id: &str) -> Result<ReplyPayload, SupervisorError>;
}

/// Builds a control client for a server base URL.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, base_url: &str) -> Arc<dyn ControlApi>;
}

impl<F> ClientFactory for F
where
    F: Fn(&str) -> Arc<dyn ControlApi> + Send + Sync,
{
    fn connect(&self, base_url: &str) -> Arc<dyn ControlApi> {
        self(base_url)
    }
}

/// Factory producing [`HttpControlClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn connect(&self, base_url: &str) -> Arc<dyn ControlApi> {
        Arc::new(HttpControlClient::new(base_url))
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    agent: &'a str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// reqwest client for one agent server.
#[derive(Debug, Clone)]
pub struct HttpControlClient {
    client: Client,
    base_url: String,
}

impl HttpControlClient {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, SupervisorError> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SupervisorError::api_message(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            SupervisorError::api(format!("failed to read response body: {}", e), status.as_u16())
        })?;

        if !status.is_success() {
            return Err(SupervisorError::api(
                format!("{} returned {}: {}", path, status, text),
                status.as_u16(),
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            SupervisorError::api(format!("invalid JSON from {}: {}", path, e), status.as_u16())
        })
    }
}

#[async_trait]
impl ControlApi for HttpControlClient {
    async fn list_sessions(&self) -> Result<(), SupervisorError> {
        self.request::<()>(Method::GET, "/session", None).await?;
        Ok(())
    }

    async fn create_session(&self, title: &str) -> Result<SessionCreated, SupervisorError> {
        let value = self
            .request(Method::POST, "/session", Some(&CreateSessionRequest { title }))
            .await?;
        Ok(SessionCreated::from_value(value))
    }

    async fn prompt(
        &self,
        session_id: &str,
        agent: &str,
        text: &str,
    ) -> Result<ReplyPayload, SupervisorError> {
        let body = PromptRequest {
            agent,
            parts: [TextPart { kind: "text", text }],
        };
        let value = self
            .request(Method::POST, &format!("/session/{}/message", session_id), Some(&body))
            .await?;
        Ok(ReplyPayload::from_value(value))
    }

    async fn messages(&self, session_id: &str) -> Result<ReplyPayload, SupervisorError> {
        let value = self
            .request::<()>(Method::GET, &format!("/session/{}/message", session_id), None)
            .await?;
        Ok(ReplyPayload::from_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_body_shape() {
        let body = PromptRequest {
            agent: "build",
            parts: [TextPart { kind: "text", text: "hi" }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"agent": "build", "parts": [{"type": "text", "text": "hi"}]})
        );
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = HttpControlClient::new("http://127.0.0.1:4096/");
        assert_eq!(client.base_url(), "http://127.0.0.1:4096");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_api_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = HttpControlClient::new(&format!("http://127.0.0.1:{}", port));
        let err = client.list_sessions().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Api { status_code: None, .. }));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |url: &str| -> Arc<dyn ControlApi> { Arc::new(HttpControlClient::new(url)) };
        let _client = factory.connect("http://127.0.0.1:1");
    }
}
