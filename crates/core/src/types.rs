use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation token handed out by the hosted agent.
///
/// Holds no local state. The caller replays it on the next turn so the remote
/// agent can continue the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Builds a token from client input, treating empty or blank strings as absent.
    pub fn from_client(raw: Option<String>) -> Option<Self> {
        raw.filter(|s| !s.trim().is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generated text plus the token to replay on the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub text: String,
    pub session: SessionToken,
}

/// Synthesized speech for one agent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioArtifact {
    /// A playable resource hosted by the synthesis service.
    Url(String),
    /// Raw encoded audio returned inline.
    Bytes {
        content_type: String,
        data: bytes::Bytes,
    },
}

/// The outcome of a single therapist turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    TextOnly(AgentResponse),
    TextWithAudio {
        response: AgentResponse,
        audio: AudioArtifact,
    },
}

impl TurnReply {
    pub fn response(&self) -> &AgentResponse {
        match self {
            TurnReply::TextOnly(response) => response,
            TurnReply::TextWithAudio { response, .. } => response,
        }
    }
}

/// A record stored in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
}

/// A nearest-neighbour hit returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub text: String,
    pub score: f32,
}
