//! Upstream Error Kinds
//!
//! Every remote binding in this crate reports failures as an [`UpstreamError`].
//! The variants map one-to-one onto the ways a hosted dependency can fail:
//! it cannot be reached, it is too slow, it rejects the credential, or it
//! answers with something we cannot interpret.

use async_openai::error::OpenAIError;
use reqwest::StatusCode;

/// A failure talking to a hosted dependency (agent platform, speech
/// synthesis, vector store or insights model).
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Network or connection failure, or the remote answered with a server error.
    #[error("{service} is unavailable: {message}")]
    Unavailable {
        service: &'static str,
        status: Option<StatusCode>,
        message: String,
    },
    /// The remote call exceeded its timeout.
    #[error("{service} did not respond within {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },
    /// The remote answered but the payload was missing expected fields.
    #[error("{service} returned an unexpected payload: {message}")]
    Protocol {
        service: &'static str,
        message: String,
    },
    /// The remote rejected our credential.
    #[error("{service} rejected the configured credential")]
    Unauthorized { service: &'static str },
}

impl UpstreamError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            status: None,
            message: message.into(),
        }
    }

    pub fn protocol(service: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            service,
            message: message.into(),
        }
    }

    /// Stable snake_case name of the error kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "upstream_unavailable",
            Self::Timeout { .. } => "upstream_timeout",
            Self::Protocol { .. } => "upstream_protocol_error",
            Self::Unauthorized { .. } => "unauthorized",
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error, seconds: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { service, seconds }
        } else if err.is_decode() {
            Self::protocol(service, err.to_string())
        } else {
            Self::unavailable(service, err.to_string())
        }
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(service: &'static str, status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { service },
            _ => Self::Unavailable {
                service,
                status: Some(status),
                message: format!("status {status}: {}", truncate(body)),
            },
        }
    }

    /// Classifies a failure reported by the `async-openai` client.
    pub fn from_openai(service: &'static str, err: OpenAIError, seconds: u64) -> Self {
        match err {
            OpenAIError::Reqwest(e) => Self::from_reqwest(service, e, seconds),
            OpenAIError::ApiError(api) => {
                let code = api.code.as_deref().unwrap_or_default();
                let kind = api.r#type.as_deref().unwrap_or_default();
                if code == "invalid_api_key" || kind == "authentication_error" {
                    Self::Unauthorized { service }
                } else {
                    Self::unavailable(service, api.message)
                }
            }
            OpenAIError::JSONDeserialize(e) => Self::protocol(service, e.to_string()),
            // Raised while building the request, before anything is sent.
            OpenAIError::InvalidArgument(message) => Self::protocol(service, message),
            other => Self::unavailable(service, other.to_string()),
        }
    }
}

fn truncate(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
