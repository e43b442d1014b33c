//! HTTP gateway for convoy.
//!
//! Receives platform webhooks and hands each message to the dispatcher on a
//! spawned task, so the platform always gets its answer before the agent runs.
//!
//! Built on Axum.

pub mod runtime;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use convoy_channels::{SIGNATURE_HEADER, SignatureVerifier, WebhookError, parse_webhook};
use convoy_config::AppConfig;
use convoy_workflow::{DispatchOutcome, Dispatcher};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use runtime::{Runtime, assemble, assemble_with, spawn_event_logger};

/// Webhook bodies carry attachment metadata only, never bytes.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub verifier: SignatureVerifier,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>, verifier: SignatureVerifier) -> Self {
        Self {
            dispatcher,
            verifier,
            started_at: Utc::now(),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/bluebubbles", post(webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the runtime and serve until the listener fails.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let runtime = assemble(&config)?;
    spawn_event_logger(&runtime.event_bus);

    let verifier = SignatureVerifier::new(config.transport.webhook_secret.clone());
    if !verifier.is_enabled() {
        warn!("No webhook secret configured, accepting unsigned webhooks");
    }
    let state = Arc::new(GatewayState::new(runtime.dispatcher, verifier));
    let app = build_router(state);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    mode: String,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.dispatcher.mode().name().to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

#[derive(Serialize)]
struct WebhookAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WebhookAck {
    fn reply(code: StatusCode, status: &'static str) -> (StatusCode, Json<Self>) {
        (code, Json(Self { status, error: None }))
    }

    fn rejected(code: StatusCode, error: WebhookError) -> (StatusCode, Json<Self>) {
        (
            code,
            Json(Self {
                status: "rejected",
                error: Some(error.to_string()),
            }),
        )
    }
}

async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.verifier.verify(&body, signature) {
        warn!("Webhook signature rejected");
        return WebhookAck::rejected(StatusCode::UNAUTHORIZED, e);
    }

    let message = match parse_webhook(&body) {
        Ok(Some(message)) => message,
        Ok(None) => return WebhookAck::reply(StatusCode::OK, "ignored"),
        Err(e) => {
            warn!(error = %e, "Unusable webhook payload");
            return WebhookAck::rejected(StatusCode::BAD_REQUEST, e);
        }
    };

    debug!(chat_id = %message.chat_id, message_id = ?message.id(), "Webhook message received");
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let chat_id = message.chat_id.clone();
        match dispatcher.dispatch(message).await {
            DispatchOutcome::Completed(report) => debug!(
                chat_id = %chat_id,
                sequence = report.sequence,
                responded = report.responded,
                "Inline run completed"
            ),
            DispatchOutcome::Rejected { reason } => {
                warn!(chat_id = %chat_id, reason = %reason, "Run could not be started")
            }
            other => debug!(chat_id = %chat_id, outcome = ?other, "Dispatch finished"),
        }
    });

    WebhookAck::reply(StatusCode::ACCEPTED, "accepted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use convoy_agent::{
        ActivityExecutor, ActivityOutput, ActivityRequest, ConversationStore, DeliveryOutcome, StoreConfig,
    };
    use convoy_core::{ActivityError, InMemorySettingsStore, ModelResponse};
    use convoy_workflow::ExecutionMode;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    /// Records finalized chats, answers nothing.
    #[derive(Default)]
    struct QuietActivities {
        finalized: Mutex<Vec<String>>,
        done: Notify,
    }

    #[async_trait]
    impl ActivityExecutor for QuietActivities {
        async fn execute(&self, request: ActivityRequest) -> Result<ActivityOutput, ActivityError> {
            Ok(match request {
                ActivityRequest::LoadHistory { .. } => ActivityOutput::History { turns: vec![] },
                ActivityRequest::BuildInput { .. } => ActivityOutput::Input { items: vec![] },
                ActivityRequest::InvokeModel { .. } => ActivityOutput::Model {
                    response: ModelResponse::text("NO_RESPONSE"),
                },
                ActivityRequest::ExecuteTools { .. } => ActivityOutput::ToolOutcomes { outcomes: vec![] },
                ActivityRequest::Deliver { .. } => ActivityOutput::Delivered {
                    outcome: DeliveryOutcome::Suppressed,
                },
                ActivityRequest::Finalize { run, .. } => {
                    self.finalized.lock().unwrap().push(run.chat_id);
                    self.done.notify_one();
                    ActivityOutput::Finalized {
                        responded: false,
                        cursor_advanced: true,
                    }
                }
            })
        }
    }

    fn state(secret: Option<&str>) -> (SharedState, Arc<QuietActivities>) {
        let activities = Arc::new(QuietActivities::default());
        let dispatcher = Dispatcher::new(
            Arc::new(ConversationStore::without_hydration(StoreConfig::default())),
            Arc::new(InMemorySettingsStore::new()),
            activities.clone(),
            ExecutionMode::Inline,
        );
        let verifier = SignatureVerifier::new(secret.map(str::to_string));
        (Arc::new(GatewayState::new(Arc::new(dispatcher), verifier)), activities)
    }

    fn new_message_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "new-message",
            "data": {
                "guid": "msg-1",
                "text": "hello",
                "handle": {"address": "+15550001", "service": "iMessage"},
                "dateCreated": 1_700_000_000_000i64,
                "chats": [{"guid": "chat-1"}]
            }
        }))
        .unwrap()
    }

    fn post(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/bluebubbles")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = state(None);
        let app = build_router(state);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "inline");
    }

    #[tokio::test]
    async fn new_message_is_accepted_and_dispatched() {
        let (state, activities) = state(None);
        let app = build_router(state);

        let response = app.oneshot(post(new_message_body(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "accepted");

        activities.done.notified().await;
        assert_eq!(*activities.finalized.lock().unwrap(), vec!["chat-1".to_string()]);
    }

    #[tokio::test]
    async fn other_events_are_acknowledged() {
        let (state, activities) = state(None);
        let app = build_router(state);
        let body = serde_json::to_vec(&json!({"type": "chat-read-status-changed", "data": null})).unwrap();

        let response = app.oneshot(post(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ignored");
        assert!(activities.finalized.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (state, _) = state(None);
        let app = build_router(state);
        let response = app.oneshot(post(b"{nope".to_vec(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_is_enforced_when_configured() {
        let (state, _) = state(Some("s3cret"));
        let signature = state.verifier.sign(&new_message_body()).unwrap();
        let app = build_router(state);

        let unsigned = app.clone().oneshot(post(new_message_body(), None)).await.unwrap();
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

        let signed = app.oneshot(post(new_message_body(), Some(&signature))).await.unwrap();
        assert_eq!(signed.status(), StatusCode::ACCEPTED);
    }
}
