//! API Models
//!
//! Request and response bodies for the HTTP surface, annotated for OpenAPI
//! generation with `utoipa`.

use serde::{Deserialize, Serialize};
use theravoice_core::{
    insights::{HeartRateSample, SleepSample},
    types::TurnReply,
};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct RunAgentPayload {
    #[schema(example = "I feel overwhelmed")]
    pub user_query: Option<String>,
    /// Token returned by a previous turn. Omit, or send null, to start a new session.
    #[schema(example = "sess-123")]
    pub session_id: Option<String>,
    /// Request a synthesized audio version of the reply.
    pub audio: Option<bool>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct RunAgentResponse {
    pub response: String,
    pub session_id: String,
    /// Present only when audio was requested and synthesis succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_link: Option<String>,
}

impl From<TurnReply> for RunAgentResponse {
    fn from(reply: TurnReply) -> Self {
        match reply {
            TurnReply::TextOnly(response) => Self {
                response: response.text,
                session_id: response.session.into_inner(),
                audio_link: None,
            },
            TurnReply::TextWithAudio { response, audio } => Self {
                response: response.text,
                session_id: response.session.into_inner(),
                audio_link: Some(audio.link()),
            },
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct QueryPayload {
    #[schema(example = "I can't sleep before exams")]
    pub text: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct AnalyzePayload {
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub heart_rate: Option<Vec<HeartRateSample>>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub sleep: Option<Vec<SleepSample>>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}
