//! Voice-agent session service client
//!
//! The AI agent collaborator is consumed only through this narrow contract:
//! start a session, get back a media join handle and a session id. The call
//! is synchronous with a bounded timeout and the orchestrator fails closed
//! to a hangup when it errors, so a slow agent service can never leave a
//! caller in dead air.

use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// A started voice-agent session.
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub session_id: String,
    /// Streaming URL the call's media is pointed at
    pub join_handle: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceAgentClient: Send + Sync {
    async fn start_session(
        &self,
        agent_key: &str,
        caller_number: &str,
        metadata: Value,
    ) -> Result<AgentSession>;
}

pub struct HttpVoiceAgentClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    session_id: String,
    join_url: String,
}

impl HttpVoiceAgentClient {
    pub fn new(api_base: &str, api_key: &str, timeout_seconds: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl VoiceAgentClient for HttpVoiceAgentClient {
    async fn start_session(
        &self,
        agent_key: &str,
        caller_number: &str,
        metadata: Value,
    ) -> Result<AgentSession> {
        let url = format!("{}/sessions", self.api_base);
        let body = serde_json::json!({
            "agent_key": agent_key,
            "caller_number": caller_number,
            "metadata": metadata,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach voice-agent service: {}", e);
                DomainError::ProviderUnavailable(format!("voice agent: {}", e))
            })?;

        if !response.status().is_success() {
            error!(
                "Voice-agent service refused session for agent {}: {}",
                agent_key,
                response.status()
            );
            return Err(DomainError::ProviderUnavailable(format!(
                "voice agent returned {}",
                response.status()
            )));
        }

        let session: StartSessionResponse = response.json().await.map_err(|e| {
            DomainError::ProviderUnavailable(format!("voice agent response: {}", e))
        })?;

        debug!("Started voice-agent session {}", session.session_id);
        Ok(AgentSession {
            session_id: session.session_id,
            join_handle: session.join_url,
        })
    }
}
