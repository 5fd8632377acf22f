//! Hosted Agent Session Client
//!
//! Wraps the agent platform's run endpoint. A run is either answered inline
//! or acknowledged with a poll URL that is then polled until the run
//! completes. Conversation continuity is entirely remote: we pass the
//! session token through and hand back whichever token the platform returns.

use crate::{
    error::UpstreamError,
    http,
    types::{AgentResponse, SessionToken},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "agent platform";

/// A remote conversational agent that can start or continue a conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Sends one prompt. Without a token the remote starts a new conversation;
    /// with a token the prompt continues that conversation.
    async fn send(
        &self,
        prompt: &str,
        session: Option<SessionToken>,
    ) -> Result<AgentResponse, UpstreamError>;
}

/// Connection settings for [`HostedAgentClient`].
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    pub base_url: String,
    pub agent_id: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// `SessionClient` backed by the agent platform's REST API.
pub struct HostedAgentClient {
    client: reqwest::Client,
    run_url: String,
    agent_id: String,
    api_key: SecretString,
    timeout: Duration,
    poll_interval: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
    id: &'a str,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// The envelope shared by run and poll responses.
#[derive(Deserialize, Debug)]
struct RunEnvelope {
    #[serde(default)]
    completed: bool,
    status: Option<String>,
    data: Option<Value>,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RunOutput {
    output: String,
    session_id: String,
}

enum RunState {
    Done(RunOutput),
    /// Still running. Carries a poll URL when the reply named one.
    Pending(Option<String>),
}

impl HostedAgentClient {
    pub fn new(config: AgentClientConfig) -> anyhow::Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client: http::build_client(config.timeout)?,
            run_url: format!("{}/agents/{}/run", base, config.agent_id),
            agent_id: config.agent_id,
            api_key: config.api_key,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
        })
    }

    async fn run(&self, prompt: &str, session: Option<&SessionToken>) -> Result<RunOutput, UpstreamError> {
        let body = RunRequest {
            id: &self.agent_id,
            query: prompt,
            session_id: session.map(SessionToken::as_str),
        };
        let request = self
            .client
            .post(&self.run_url)
            .header("x-api-key", self.api_key.expose_secret())
            .json(&body);
        let envelope: RunEnvelope = http::send_json(SERVICE, request, self.timeout).await?;

        let mut poll_url = match interpret(envelope)? {
            RunState::Done(output) => return Ok(output),
            RunState::Pending(Some(url)) => url,
            RunState::Pending(None) => {
                return Err(UpstreamError::protocol(
                    SERVICE,
                    "response has neither data nor a poll url",
                ));
            }
        };

        loop {
            debug!(url = %poll_url, "Agent run in progress, polling");
            tokio::time::sleep(self.poll_interval).await;
            let request = self
                .client
                .get(&poll_url)
                .header("x-api-key", self.api_key.expose_secret());
            let envelope: RunEnvelope = http::send_json(SERVICE, request, self.timeout).await?;
            match interpret(envelope)? {
                RunState::Done(output) => return Ok(output),
                RunState::Pending(Some(url)) => poll_url = url,
                // In-progress poll replies usually omit the url; keep polling the same one.
                RunState::Pending(None) => {}
            }
        }
    }
}

/// Decides whether an envelope carries a finished run or a poll location.
fn interpret(envelope: RunEnvelope) -> Result<RunState, UpstreamError> {
    if envelope
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("failed"))
    {
        let reason = envelope
            .error
            .unwrap_or_else(|| "agent run failed without an error message".to_string());
        return Err(UpstreamError::protocol(SERVICE, reason));
    }

    match envelope.data {
        Some(Value::Object(map)) => {
            let output: RunOutput = serde_json::from_value(Value::Object(map))
                .map_err(|e| UpstreamError::protocol(SERVICE, e.to_string()))?;
            Ok(RunState::Done(output))
        }
        Some(Value::String(url)) if !envelope.completed && !url.is_empty() => {
            Ok(RunState::Pending(Some(url)))
        }
        _ if !envelope.completed => Ok(RunState::Pending(
            envelope.url.filter(|url| !url.is_empty()),
        )),
        _ => Err(UpstreamError::protocol(
            SERVICE,
            "completed run is missing its output payload",
        )),
    }
}

#[async_trait]
impl SessionClient for HostedAgentClient {
    async fn send(
        &self,
        prompt: &str,
        session: Option<SessionToken>,
    ) -> Result<AgentResponse, UpstreamError> {
        let continuing = session.is_some();
        let output =
            http::with_deadline(SERVICE, self.timeout, self.run(prompt, session.as_ref())).await?;

        if output.session_id.trim().is_empty() {
            return Err(UpstreamError::protocol(SERVICE, "empty session_id in output"));
        }
        if output.output.is_empty() {
            return Err(UpstreamError::protocol(SERVICE, "empty output text"));
        }

        info!(session_id = %output.session_id, continuing, "Agent turn completed");
        Ok(AgentResponse {
            text: output.output,
            session: SessionToken::new(output.session_id),
        })
    }
}
