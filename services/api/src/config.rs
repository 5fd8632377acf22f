use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backends for speech synthesis.
#[derive(Clone, Debug)]
pub enum SpeechProvider {
    /// The agent platform's hosted synthesis model; replies carry a hosted URL.
    Platform { model_id: String },
    /// ElevenLabs streaming synthesis; replies carry an inline `data:` URI.
    ElevenLabs {
        api_key: SecretString,
        voice_id: String,
        model_id: String,
    },
    /// Audio requests are answered with text only.
    Disabled,
}

/// Settings for the hosted vector index behind `POST /query`.
#[derive(Clone, Debug)]
pub struct VectorStoreSettings {
    pub host: String,
    pub api_key: SecretString,
    pub namespace: String,
    pub top_k: usize,
}

/// Settings for the OpenAI-compatible model behind `POST /analyze`.
#[derive(Clone, Debug)]
pub struct InsightsSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub request_timeout: Duration,
    pub agent_api_key: SecretString,
    pub agent_id: String,
    pub agent_base_url: String,
    pub poll_interval: Duration,
    pub speech: SpeechProvider,
    pub vector_store: Option<VectorStoreSettings>,
    pub insights: Option<InsightsSettings>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    var(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5001".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./prompts"));

        let timeout_secs: u64 = parse_or("REQUEST_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let poll_interval_ms: u64 = parse_or("AGENT_POLL_INTERVAL_MS", 500)?;

        let agent_api_key = SecretString::from(required("AGENT_API_KEY")?);
        let agent_id = required("AGENT_ID")?;
        let agent_base_url = var("AGENT_BASE_URL")
            .unwrap_or_else(|| "https://platform-api.aixplain.com/sdk".to_string());

        let speech_provider = var("SPEECH_PROVIDER").unwrap_or_else(|| "platform".to_string());
        let speech = match speech_provider.to_lowercase().as_str() {
            "platform" => SpeechProvider::Platform {
                model_id: var("SPEECH_MODEL_ID").ok_or_else(|| {
                    ConfigError::MissingVar(
                        "SPEECH_MODEL_ID must be set for 'platform' speech provider".to_string(),
                    )
                })?,
            },
            "elevenlabs" => SpeechProvider::ElevenLabs {
                api_key: SecretString::from(var("ELEVENLABS_API_KEY").ok_or_else(|| {
                    ConfigError::MissingVar(
                        "ELEVENLABS_API_KEY must be set for 'elevenlabs' speech provider"
                            .to_string(),
                    )
                })?),
                voice_id: var("ELEVENLABS_VOICE_ID").ok_or_else(|| {
                    ConfigError::MissingVar(
                        "ELEVENLABS_VOICE_ID must be set for 'elevenlabs' speech provider"
                            .to_string(),
                    )
                })?,
                model_id: var("ELEVENLABS_MODEL_ID")
                    .unwrap_or_else(|| "eleven_multilingual_v2".to_string()),
            },
            "none" => SpeechProvider::Disabled,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SPEECH_PROVIDER".to_string(),
                    format!("'{}' is not one of platform, elevenlabs, none", other),
                ));
            }
        };

        let vector_store = match (var("VECTOR_STORE_HOST"), var("VECTOR_STORE_API_KEY")) {
            (Some(host), Some(api_key)) => Some(VectorStoreSettings {
                host,
                api_key: SecretString::from(api_key),
                namespace: var("VECTOR_NAMESPACE").unwrap_or_else(|| "default".to_string()),
                top_k: parse_or("VECTOR_TOP_K", 3)?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::MissingVar(
                    "VECTOR_STORE_API_KEY must be set when VECTOR_STORE_HOST is set".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingVar(
                    "VECTOR_STORE_HOST must be set when VECTOR_STORE_API_KEY is set".to_string(),
                ));
            }
            (None, None) => None,
        };

        let insights = var("INSIGHTS_API_KEY").map(|api_key| InsightsSettings {
            api_key: SecretString::from(api_key),
            base_url: var("INSIGHTS_BASE_URL")
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            model: var("INSIGHTS_MODEL").unwrap_or_else(|| "llama3-8b-8192".to_string()),
        });

        Ok(Self {
            bind_address,
            log_level,
            prompts_path,
            request_timeout: Duration::from_secs(timeout_secs),
            agent_api_key,
            agent_id,
            agent_base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            speech,
            vector_store,
            insights,
        })
    }
}
