//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the service
//! clients built once at startup from the configuration.

use std::sync::Arc;
use theravoice_core::{
    insights::HealthInsightsService, therapist::TherapistService, vector_store::VectorStore,
};

/// The shared application state, created once at startup and passed to all handlers.
/// Optional services are `None` when their configuration is absent.
#[derive(Clone)]
pub struct AppState {
    pub therapist: Arc<TherapistService>,
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub vector_top_k: usize,
    pub insights: Option<Arc<HealthInsightsService>>,
}
