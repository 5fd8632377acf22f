//! Integration tests for the TheraVoice API.
//!
//! Each test builds a router over recording fakes of the hosted services and
//! drives it with `tower::ServiceExt::oneshot`.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Map, Value, json};
use tower::ServiceExt;

use theravoice_api::{router::create_router, state::AppState};
use theravoice_core::{
    UpstreamError,
    insights::HealthInsightsService,
    llm_client::JsonCompletionClient,
    prompt::PromptBuilder,
    session_client::SessionClient,
    speech::SpeechSynthesizer,
    therapist::TherapistService,
    types::{AgentResponse, AudioArtifact, ScoredMatch, SessionToken},
    vector_store::VectorStore,
};

// =============================================================================
// Fakes
// =============================================================================

/// Records every call and answers with a fixed reply or error.
struct FakeSession {
    calls: AtomicUsize,
    tokens_seen: Mutex<Vec<Option<SessionToken>>>,
    prompts_seen: Mutex<Vec<String>>,
    reply: Result<(&'static str, &'static str), fn() -> UpstreamError>,
}

impl FakeSession {
    fn replying(text: &'static str, token: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            prompts_seen: Mutex::new(Vec::new()),
            reply: Ok((text, token)),
        })
    }

    fn failing(err: fn() -> UpstreamError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            prompts_seen: Mutex::new(Vec::new()),
            reply: Err(err),
        })
    }
}

#[async_trait]
impl SessionClient for FakeSession {
    async fn send(
        &self,
        prompt: &str,
        session: Option<SessionToken>,
    ) -> Result<AgentResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        self.tokens_seen.lock().unwrap().push(session);
        match &self.reply {
            Ok((text, token)) => Ok(AgentResponse {
                text: text.to_string(),
                session: SessionToken::new(*token),
            }),
            Err(make) => Err(make()),
        }
    }
}

struct FakeSpeech {
    calls: AtomicUsize,
    succeed: bool,
}

impl FakeSpeech {
    fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            succeed,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str) -> Result<AudioArtifact, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(AudioArtifact::Url("https://audio.example/reply.mp3".to_string()))
        } else {
            Err(UpstreamError::unavailable("speech synthesis", "connection refused"))
        }
    }
}

#[derive(Default)]
struct FakeStore {
    records: Mutex<Vec<(String, String)>>,
    fail_query: bool,
    fail_upsert: bool,
    upsert_attempts: AtomicUsize,
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn upsert(&self, id: &str, text: &str) -> Result<(), UpstreamError> {
        self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert {
            return Err(UpstreamError::unavailable("vector store", "write rejected"));
        }
        self.records
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn query(&self, _text: &str, k: usize) -> Result<Vec<ScoredMatch>, UpstreamError> {
        if self.fail_query {
            return Err(UpstreamError::Timeout {
                service: "vector store",
                seconds: 30,
            });
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .enumerate()
            .take(k)
            .map(|(i, (_, text))| ScoredMatch {
                text: text.clone(),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect())
    }
}

struct FakeInsights {
    calls: AtomicUsize,
    prompts_seen: Mutex<Vec<String>>,
}

#[async_trait]
impl JsonCompletionClient for FakeInsights {
    async fn complete_json(&self, prompt: &str) -> Result<Map<String, Value>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        let Value::Object(map) = json!({
            "summary": "Heart rate is easing off.",
            "risk_assessment": "low"
        }) else {
            unreachable!()
        };
        Ok(map)
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    session: Arc<FakeSession>,
    speech: Arc<FakeSpeech>,
    store: Option<Arc<FakeStore>>,
    insights: Option<Arc<FakeInsights>>,
}

impl Harness {
    fn new(session: Arc<FakeSession>) -> Self {
        Self {
            session,
            speech: FakeSpeech::new(true),
            store: None,
            insights: None,
        }
    }

    fn with_speech(mut self, speech: Arc<FakeSpeech>) -> Self {
        self.speech = speech;
        self
    }

    fn with_store(mut self, store: FakeStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    fn with_insights(mut self) -> Self {
        self.insights = Some(Arc::new(FakeInsights {
            calls: AtomicUsize::new(0),
            prompts_seen: Mutex::new(Vec::new()),
        }));
        self
    }

    fn app(&self) -> axum::Router {
        let prompts = Arc::new(PromptBuilder::default());
        let therapist = Arc::new(TherapistService::new(
            prompts.clone(),
            self.session.clone(),
            Some(self.speech.clone() as Arc<dyn SpeechSynthesizer>),
        ));
        let state = AppState {
            therapist,
            vector_store: self
                .store
                .clone()
                .map(|s| s as Arc<dyn VectorStore>),
            vector_top_k: 3,
            insights: self.insights.clone().map(|client| {
                Arc::new(HealthInsightsService::new(
                    prompts.clone(),
                    client as Arc<dyn JsonCompletionClient>,
                ))
            }),
        };
        create_router(Arc::new(state))
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// =============================================================================
// /run_agent
// =============================================================================

#[tokio::test]
async fn run_agent_text_only_matches_exact_shape() {
    let harness = Harness::new(FakeSession::replying("You're not alone...", "sess-123"));

    let (status, body) = send(
        harness.app(),
        post_json(
            "/run_agent",
            r#"{"user_query": "I feel overwhelmed", "audio": false}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"response": "You're not alone...", "session_id": "sess-123"})
    );
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 0);
    assert_eq!(*harness.session.tokens_seen.lock().unwrap(), vec![None]);
    assert!(harness.session.prompts_seen.lock().unwrap()[0].contains("I feel overwhelmed"));
}

#[tokio::test]
async fn run_agent_replays_session_token() {
    let harness = Harness::new(FakeSession::replying("Go on.", "sess-123"));

    let (status, first) = send(
        harness.app(),
        post_json("/run_agent", r#"{"user_query": "hello"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = first["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        harness.app(),
        post_json(
            "/run_agent",
            &json!({"user_query": "still here", "session_id": token}).to_string(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let seen = harness.session.tokens_seen.lock().unwrap();
    assert_eq!(seen[0], None);
    assert_eq!(seen[1], Some(SessionToken::new("sess-123")));
}

#[tokio::test]
async fn run_agent_empty_session_id_starts_new_session() {
    let harness = Harness::new(FakeSession::replying("Hi.", "sess-new"));

    let (status, body) = send(
        harness.app(),
        post_json("/run_agent", r#"{"user_query": "hello", "session_id": ""}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "sess-new");
    assert_eq!(*harness.session.tokens_seen.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn run_agent_with_audio_includes_link_and_session() {
    let harness = Harness::new(FakeSession::replying("Breathe.", "sess-9"));

    let (status, body) = send(
        harness.app(),
        post_json("/run_agent", r#"{"user_query": "panic", "audio": true}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "response": "Breathe.",
            "session_id": "sess-9",
            "audio_link": "https://audio.example/reply.mp3"
        })
    );
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_agent_synthesis_failure_omits_audio_link() {
    let harness = Harness::new(FakeSession::replying("Breathe.", "sess-9"))
        .with_speech(FakeSpeech::new(false));

    let (status, body) = send(
        harness.app(),
        post_json("/run_agent", r#"{"user_query": "panic", "audio": true}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Breathe.");
    assert_eq!(body["session_id"], "sess-9");
    assert!(body.get("audio_link").is_none());
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_agent_missing_user_query_is_400_without_calls() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    let (status, body) = send(harness.app(), post_json("/run_agent", r#"{"audio": true}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
    assert!(body["error"].as_str().unwrap().contains("user_query"));
    assert_eq!(harness.session.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_agent_malformed_bodies_are_400() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    for body in [r#"{"user_query": 7}"#, "not json", r#"{"user_query": "   "}"#] {
        let (status, json) = send(harness.app(), post_json("/run_agent", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json["kind"], "invalid_input");
    }

    let no_content_type = Request::post("/run_agent")
        .body(Body::from(r#"{"user_query": "hi"}"#))
        .unwrap();
    let (status, _) = send(harness.app(), no_content_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(harness.session.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_agent_upstream_errors_map_to_status_codes() {
    let cases: [(fn() -> UpstreamError, StatusCode, &str); 4] = [
        (
            || UpstreamError::unavailable("agent platform", "connection refused"),
            StatusCode::BAD_GATEWAY,
            "upstream_unavailable",
        ),
        (
            || UpstreamError::Timeout {
                service: "agent platform",
                seconds: 30,
            },
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_timeout",
        ),
        (
            || UpstreamError::protocol("agent platform", "missing output"),
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream_protocol_error",
        ),
        (
            || UpstreamError::Unauthorized {
                service: "agent platform",
            },
            StatusCode::INTERNAL_SERVER_ERROR,
            "unauthorized",
        ),
    ];

    for (make, expected_status, expected_kind) in cases {
        let harness = Harness::new(FakeSession::failing(make));
        let (status, body) = send(
            harness.app(),
            post_json("/run_agent", r#"{"user_query": "hi", "audio": true}"#),
        )
        .await;
        assert_eq!(status, expected_status);
        assert_eq!(body["kind"], expected_kind);
        assert!(body["error"].is_string());
        assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 0);
    }
}

// =============================================================================
// /query
// =============================================================================

#[tokio::test]
async fn query_against_empty_index_returns_empty_response() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"))
        .with_store(FakeStore::default());

    let (status, body) = send(
        harness.app(),
        post_json("/query", r#"{"text": "first entry"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": ""}));
    let records = harness.store.as_ref().unwrap().records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1, "first entry");
}

#[tokio::test]
async fn query_draws_on_earlier_records_with_fresh_ids() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"))
        .with_store(FakeStore::default());

    send(harness.app(), post_json("/query", r#"{"text": "exams stress me"}"#)).await;
    let (status, body) = send(
        harness.app(),
        post_json("/query", r#"{"text": "cannot sleep"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "exams stress me");

    let records = harness.store.as_ref().unwrap().records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].0, records[1].0);
}

#[tokio::test]
async fn query_failure_degrades_to_empty_response() {
    let harness = Harness::new(FakeSession::replying("unused", "unused")).with_store(FakeStore {
        fail_query: true,
        ..Default::default()
    });

    let (status, body) = send(harness.app(), post_json("/query", r#"{"text": "hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": ""}));
}

#[tokio::test]
async fn query_upsert_failure_still_returns_composed_response() {
    let store = FakeStore {
        fail_upsert: true,
        ..Default::default()
    };
    store
        .records
        .lock()
        .unwrap()
        .push(("earlier".to_string(), "exams stress me".to_string()));
    let harness = Harness::new(FakeSession::replying("unused", "unused")).with_store(store);

    let (status, body) = send(
        harness.app(),
        post_json("/query", r#"{"text": "cannot sleep"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "exams stress me"}));
    let store = harness.store.as_ref().unwrap();
    assert_eq!(store.upsert_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(store.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn query_missing_text_is_400() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"))
        .with_store(FakeStore::default());

    let (status, body) = send(harness.app(), post_json("/query", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn query_without_store_is_503() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    let (status, body) = send(harness.app(), post_json("/query", r#"{"text": "hi"}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "not_configured");
}

// =============================================================================
// /analyze
// =============================================================================

#[tokio::test]
async fn analyze_returns_model_insight() {
    let harness = Harness::new(FakeSession::replying("unused", "unused")).with_insights();

    let request = json!({
        "heart_rate": [
            {"timestamp": "2024-11-08T10:00:00.000Z", "bpm": 90},
            {"timestamp": "2024-11-08T10:15:00.000Z", "bpm": 80},
            {"timestamp": "2024-11-08T10:30:00.000Z", "bpm": 70}
        ],
        "sleep": [
            {"stage": "core", "start": "2024-11-06T22:00:00.000Z", "end": "2024-11-07T05:00:00.000Z"},
            {"stage": "core", "start": "2024-11-07T22:00:00.000Z", "end": "2024-11-08T06:00:00.000Z"}
        ]
    });
    let (status, body) = send(harness.app(), post_json("/analyze", &request.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "Heart rate is easing off.");
    let insights = harness.insights.as_ref().unwrap();
    assert_eq!(insights.calls.load(Ordering::SeqCst), 1);
    let prompt = &insights.prompts_seen.lock().unwrap()[0];
    assert!(prompt.contains("Heart rate trend: decreasing"));
    assert!(prompt.contains("Sleep trend: increasing"));
}

#[tokio::test]
async fn analyze_missing_series_is_400() {
    let harness = Harness::new(FakeSession::replying("unused", "unused")).with_insights();

    for body in [
        json!({"heart_rate": [{"bpm": 70}]}),
        json!({"heart_rate": [], "sleep": []}),
    ] {
        let (status, json) = send(harness.app(), post_json("/analyze", &body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Both 'heart_rate' and 'sleep' data are required."
        );
    }
    assert_eq!(
        harness.insights.as_ref().unwrap().calls.load(Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn analyze_bad_timestamp_is_400() {
    let harness = Harness::new(FakeSession::replying("unused", "unused")).with_insights();

    let body = json!({
        "heart_rate": [{"bpm": 70}],
        "sleep": [{"start": "last night", "end": "this morning"}]
    });
    let (status, json) = send(harness.app(), post_json("/analyze", &body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_input");
}

#[tokio::test]
async fn analyze_without_insights_is_503() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    let body = json!({
        "heart_rate": [{"bpm": 70}],
        "sleep": [{"start": "2024-11-07T22:00:00Z", "end": "2024-11-08T06:00:00Z"}]
    });
    let (status, json) = send(harness.app(), post_json("/analyze", &body.to_string())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "not_configured");
}

// =============================================================================
// Misc
// =============================================================================

#[tokio::test]
async fn health_returns_ok() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    let (status, body) = send(
        harness.app(),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let harness = Harness::new(FakeSession::replying("unused", "unused"));

    let (status, body) = send(
        harness.app(),
        Request::get("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    for path in ["/run_agent", "/query", "/analyze", "/health"] {
        assert!(body["paths"].get(path).is_some(), "missing {path}");
    }
}
