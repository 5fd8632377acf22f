//! Main Entrypoint for the TheraVoice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading prompt templates.
//! 3. Initializing the hosted-service clients (agent, speech, vector store, insights).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use theravoice_api::{
    config::{Config, SpeechProvider},
    router::create_router,
    state::AppState,
};
use theravoice_core::{
    insights::HealthInsightsService,
    llm_client::OpenAICompatibleClient,
    prompt::PromptBuilder,
    session_client::{AgentClientConfig, HostedAgentClient},
    speech::{
        ElevenLabsClient, ElevenLabsConfig, PlatformSpeechClient, PlatformSpeechConfig,
        SpeechSynthesizer,
    },
    therapist::TherapistService,
    vector_store::{HostedVectorStore, VectorStore, VectorStoreConfig},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

const PLATFORM_MODELS_URL: &str = "https://models.aixplain.com/api/v1/execute";
const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn build_synthesizer(config: &Config) -> anyhow::Result<Option<Arc<dyn SpeechSynthesizer>>> {
    let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = match &config.speech {
        SpeechProvider::Platform { model_id } => {
            info!(model_id = %model_id, "Using platform speech synthesis.");
            Some(Arc::new(PlatformSpeechClient::new(PlatformSpeechConfig {
                base_url: PLATFORM_MODELS_URL.to_string(),
                model_id: model_id.clone(),
                api_key: config.agent_api_key.clone(),
                timeout: config.request_timeout,
                poll_interval: config.poll_interval,
            })?))
        }
        SpeechProvider::ElevenLabs {
            api_key,
            voice_id,
            model_id,
        } => {
            info!(voice_id = %voice_id, "Using ElevenLabs speech synthesis.");
            Some(Arc::new(ElevenLabsClient::new(ElevenLabsConfig {
                base_url: ELEVENLABS_API_URL.to_string(),
                api_key: api_key.clone(),
                voice_id: voice_id.clone(),
                model_id: model_id.clone(),
                timeout: config.request_timeout,
            })?))
        }
        SpeechProvider::Disabled => {
            info!("Speech synthesis disabled; audio requests will receive text only.");
            None
        }
    };
    Ok(synthesizer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Prompts ---
    let prompts = Arc::new(
        PromptBuilder::load(&config.prompts_path).context("Failed to load prompt templates")?,
    );

    // --- 4. Initialize Shared Services ---
    let session_client = Arc::new(
        HostedAgentClient::new(AgentClientConfig {
            base_url: config.agent_base_url.clone(),
            agent_id: config.agent_id.clone(),
            api_key: config.agent_api_key.clone(),
            timeout: config.request_timeout,
            poll_interval: config.poll_interval,
        })
        .context("Failed to build agent client")?,
    );
    let synthesizer = build_synthesizer(&config).context("Failed to build speech client")?;
    let therapist = Arc::new(TherapistService::new(
        prompts.clone(),
        session_client,
        synthesizer,
    ));

    let vector_store: Option<Arc<dyn VectorStore>> = match &config.vector_store {
        Some(settings) => {
            info!(host = %settings.host, namespace = %settings.namespace, "Vector store enabled.");
            Some(Arc::new(
                HostedVectorStore::new(VectorStoreConfig {
                    host: settings.host.clone(),
                    namespace: settings.namespace.clone(),
                    api_key: settings.api_key.clone(),
                    timeout: config.request_timeout,
                })
                .context("Failed to build vector store client")?,
            ))
        }
        None => None,
    };

    let insights = config.insights.as_ref().map(|settings| {
        info!(model = %settings.model, "Health insights enabled.");
        let openai_config = OpenAIConfig::new()
            .with_api_key(settings.api_key.expose_secret())
            .with_api_base(&settings.base_url);
        Arc::new(HealthInsightsService::new(
            prompts.clone(),
            Arc::new(OpenAICompatibleClient::new(
                openai_config,
                settings.model.clone(),
                config.request_timeout,
            )),
        ))
    });

    let app_state = Arc::new(AppState {
        therapist,
        vector_store,
        vector_top_k: config
            .vector_store
            .as_ref()
            .map(|settings| settings.top_k)
            .unwrap_or_default(),
        insights,
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        agent_id = %config.agent_id,
        timeout_secs = config.request_timeout.as_secs(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
