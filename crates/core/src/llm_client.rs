use crate::error::UpstreamError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "insights model";

/// A chat model that answers a single prompt with a JSON object.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JsonCompletionClient: Send + Sync {
    async fn complete_json(&self, prompt: &str) -> Result<Map<String, Value>, UpstreamError>;
}

/// An implementation of `JsonCompletionClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "llama3-8b-8192").
    /// * `timeout` - Upper bound for a single completion call.
    pub fn new(config: OpenAIConfig, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            max_tokens: 500,
            timeout,
        }
    }
}

#[async_trait]
impl JsonCompletionClient for OpenAICompatibleClient {
    async fn complete_json(&self, prompt: &str) -> Result<Map<String, Value>, UpstreamError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| UpstreamError::from_openai(SERVICE, e, 0))?
                    .into(),
            ])
            .max_completion_tokens(self.max_tokens)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|e| UpstreamError::from_openai(SERVICE, e, 0))?;

        debug!(model = %self.model, "Requesting JSON completion");
        let seconds = self.timeout.as_secs();
        let response: CreateChatCompletionResponse =
            tokio::time::timeout(self.timeout, self.client.chat().create(request))
                .await
                .map_err(|_| UpstreamError::Timeout {
                    service: SERVICE,
                    seconds,
                })?
                .map_err(|e| UpstreamError::from_openai(SERVICE, e, seconds))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| UpstreamError::protocol(SERVICE, "no content in completion"))?;

        parse_json_object(content)
    }
}

/// Parses model output that must be a single JSON object.
pub(crate) fn parse_json_object(content: &str) -> Result<Map<String, Value>, UpstreamError> {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(UpstreamError::protocol(
            SERVICE,
            "completion is JSON but not an object",
        )),
        Err(e) => Err(UpstreamError::protocol(
            SERVICE,
            format!("completion is not valid JSON: {e}"),
        )),
    }
}
