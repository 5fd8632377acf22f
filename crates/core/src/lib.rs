//! TheraVoice core: bindings for the hosted services the therapist API
//! depends on, and the turn orchestration built on top of them.

pub mod error;
pub mod http;
pub mod insights;
pub mod llm_client;
pub mod prompt;
pub mod session_client;
pub mod speech;
pub mod therapist;
pub mod types;
pub mod vector_store;

pub use error::UpstreamError;
