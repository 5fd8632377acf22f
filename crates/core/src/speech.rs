//! Speech Synthesis Clients
//!
//! Two hosted back-ends are supported: the agent platform's synthesis model,
//! which returns a link to a hosted audio file, and ElevenLabs, which streams
//! MP3 bytes back inline.

use crate::{error::UpstreamError, http, types::AudioArtifact};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Converts generated text to audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, UpstreamError>;
}

impl AudioArtifact {
    /// A link the client can play: the hosted URL, or the bytes inlined as a `data:` URI.
    pub fn link(&self) -> String {
        match self {
            AudioArtifact::Url(url) => url.clone(),
            AudioArtifact::Bytes { content_type, data } => format!(
                "data:{};base64,{}",
                content_type,
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
        }
    }
}

// --- Agent platform synthesis model ---

const PLATFORM_SERVICE: &str = "speech synthesis";

/// Connection settings for [`PlatformSpeechClient`].
#[derive(Debug, Clone)]
pub struct PlatformSpeechConfig {
    pub base_url: String,
    pub model_id: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Runs a hosted text-to-speech model and returns the URL of the result.
pub struct PlatformSpeechClient {
    client: reqwest::Client,
    execute_url: String,
    api_key: SecretString,
    timeout: Duration,
    poll_interval: Duration,
}

#[derive(Deserialize, Debug)]
struct ModelEnvelope {
    #[serde(default)]
    completed: bool,
    status: Option<String>,
    data: Option<Value>,
    url: Option<String>,
    error: Option<String>,
}

impl PlatformSpeechClient {
    pub fn new(config: PlatformSpeechConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout)?,
            execute_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.model_id
            ),
            api_key: config.api_key,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
        })
    }

    /// Synthesizes `text` and returns a playable URL owned by the remote service.
    pub async fn synthesize_to_url(&self, text: &str) -> Result<String, UpstreamError> {
        http::with_deadline(PLATFORM_SERVICE, self.timeout, self.execute(text)).await
    }

    async fn execute(&self, text: &str) -> Result<String, UpstreamError> {
        let request = self
            .client
            .post(&self.execute_url)
            .header("x-api-key", self.api_key.expose_secret())
            .json(&serde_json::json!({ "data": text }));
        let mut envelope: ModelEnvelope =
            http::send_json(PLATFORM_SERVICE, request, self.timeout).await?;
        let mut poll_url: Option<String> = None;

        loop {
            if envelope
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("failed"))
            {
                return Err(UpstreamError::protocol(
                    PLATFORM_SERVICE,
                    envelope
                        .error
                        .unwrap_or_else(|| "synthesis failed".to_string()),
                ));
            }

            if envelope.completed {
                return match envelope.data {
                    Some(Value::String(url)) if !url.is_empty() => Ok(url),
                    _ => Err(UpstreamError::protocol(
                        PLATFORM_SERVICE,
                        "completed synthesis has no audio url",
                    )),
                };
            }

            // Only the execute reply is guaranteed to name the poll url.
            let announced = match (envelope.url, envelope.data) {
                (Some(url), _) if !url.is_empty() => Some(url),
                (_, Some(Value::String(url))) if !url.is_empty() => Some(url),
                _ => None,
            };
            if announced.is_some() {
                poll_url = announced;
            }
            let Some(url) = poll_url.as_deref() else {
                return Err(UpstreamError::protocol(
                    PLATFORM_SERVICE,
                    "pending synthesis has no poll url",
                ));
            };
            debug!(url = %url, "Synthesis in progress, polling");
            tokio::time::sleep(self.poll_interval).await;
            let request = self
                .client
                .get(url)
                .header("x-api-key", self.api_key.expose_secret());
            envelope = http::send_json(PLATFORM_SERVICE, request, self.timeout).await?;
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for PlatformSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, UpstreamError> {
        self.synthesize_to_url(text).await.map(AudioArtifact::Url)
    }
}

// --- ElevenLabs ---

const ELEVENLABS_SERVICE: &str = "ElevenLabs";

/// Connection settings for [`ElevenLabsClient`].
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub voice_id: String,
    pub model_id: String,
    pub timeout: Duration,
}

/// Streams synthesized speech bytes from ElevenLabs.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    stream_url: String,
    api_key: SecretString,
    model_id: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout)?,
            stream_url: format!(
                "{}/text-to-speech/{}/stream",
                config.base_url.trim_end_matches('/'),
                config.voice_id
            ),
            api_key: config.api_key,
            model_id: config.model_id,
            timeout: config.timeout,
        })
    }

    /// Synthesizes `text` and returns the encoded audio with its content type.
    pub async fn synthesize_to_bytes(&self, text: &str) -> Result<(String, Bytes), UpstreamError> {
        let request = self
            .client
            .post(&self.stream_url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&TextToSpeechRequest {
                text,
                model_id: &self.model_id,
                voice_settings: VoiceSettings::default(),
            });

        let fetch = async {
            let response = http::send(ELEVENLABS_SERVICE, request, self.timeout).await?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("audio/mpeg")
                .to_string();
            let data = response.bytes().await.map_err(|e| {
                UpstreamError::from_reqwest(ELEVENLABS_SERVICE, e, self.timeout.as_secs())
            })?;
            Ok((content_type, data))
        };
        let (content_type, data) =
            http::with_deadline(ELEVENLABS_SERVICE, self.timeout, fetch).await?;

        if data.is_empty() {
            return Err(UpstreamError::protocol(
                ELEVENLABS_SERVICE,
                "empty audio stream",
            ));
        }
        if !content_type.starts_with("audio/") {
            return Err(UpstreamError::protocol(
                ELEVENLABS_SERVICE,
                format!("unexpected content type {content_type}"),
            ));
        }
        Ok((content_type, data))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, UpstreamError> {
        let (content_type, data) = self.synthesize_to_bytes(text).await?;
        Ok(AudioArtifact::Bytes { content_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_artifact_link_is_url() {
        let artifact = AudioArtifact::Url("https://cdn.example/a.mp3".to_string());
        assert_eq!(artifact.link(), "https://cdn.example/a.mp3");
    }

    #[test]
    fn test_bytes_artifact_link_is_data_uri() {
        let artifact = AudioArtifact::Bytes {
            content_type: "audio/mpeg".to_string(),
            data: Bytes::from_static(b"abc"),
        };
        assert_eq!(artifact.link(), "data:audio/mpeg;base64,YWJj");
    }

    #[test]
    fn test_tts_request_body() {
        let body = TextToSpeechRequest {
            text: "hello",
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }
}
