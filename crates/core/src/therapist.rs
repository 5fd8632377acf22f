//! Therapist Turn Orchestration
//!
//! One turn runs the user's words through the prompt template, sends the
//! prompt to the hosted agent (continuing the conversation if a token was
//! supplied) and, when asked, synthesizes the reply. The agent call is the
//! only fatal leg; synthesis failures are logged and the turn degrades to a
//! text-only reply.

use crate::{
    error::UpstreamError,
    prompt::PromptBuilder,
    session_client::SessionClient,
    speech::SpeechSynthesizer,
    types::{SessionToken, TurnReply},
};
use std::sync::Arc;
use tracing::{info, warn};

/// A single inbound turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_query: String,
    pub session: Option<SessionToken>,
    pub audio: bool,
}

pub struct TherapistService {
    prompts: Arc<PromptBuilder>,
    session_client: Arc<dyn SessionClient>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl TherapistService {
    pub fn new(
        prompts: Arc<PromptBuilder>,
        session_client: Arc<dyn SessionClient>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            prompts,
            session_client,
            synthesizer,
        }
    }

    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnReply, UpstreamError> {
        let prompt = self.prompts.therapist_prompt(&request.user_query);
        let response = self.session_client.send(&prompt, request.session).await?;

        if !request.audio {
            return Ok(TurnReply::TextOnly(response));
        }

        let Some(synthesizer) = &self.synthesizer else {
            warn!(session_id = %response.session, "Audio requested but no speech synthesizer is configured");
            return Ok(TurnReply::TextOnly(response));
        };

        match synthesizer.synthesize(&response.text).await {
            Ok(audio) => {
                info!(session_id = %response.session, "Synthesized audio for reply");
                Ok(TurnReply::TextWithAudio { response, audio })
            }
            Err(e) => {
                warn!(session_id = %response.session, error = %e, "Speech synthesis failed, returning text only");
                Ok(TurnReply::TextOnly(response))
            }
        }
    }
}
