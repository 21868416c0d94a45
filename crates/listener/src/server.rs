//! HTTP intake for webhook deliveries.
//!
//! # Endpoints
//!
//! - `POST /event/{hook_type}` - Accepts a webhook and enqueues it (202 Accepted)
//! - `GET /task/{task_id}` - Returns the task's status record as JSON
//! - `GET /health` - Returns 200 if the server is running

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pipeline::{TaskId, WebhookEnvelope, WebhookHeaders};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::queue::{QueueError, TaskQueue, TaskRecord};
use crate::signature::{self, SignatureError};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    queue: TaskQueue,
    /// Shared webhook secret; `None` disables signature checks.
    auth_key: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(queue: TaskQueue, auth_key: Option<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { queue, auth_key }),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    pub fn auth_key(&self) -> Option<&[u8]> {
        self.inner.auth_key.as_deref()
    }
}

/// Errors that can occur while accepting a request.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("server is shutting down")]
    QueueClosed(#[from] QueueError),

    #[error("no such task: {0}")]
    TaskNotFound(String),
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = match &self {
            IntakeError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            IntakeError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            IntakeError::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            IntakeError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/event/{hook_type}", post(event_handler))
        .route("/task/{task_id}", get(task_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Serves `app_state` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish. Once this returns the router,
/// and with it the intake's handle on the task queue, has been dropped.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Listening for webhooks");
    }
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Webhook handler.
///
/// The hook type is not checked here: an unknown type is accepted, and the
/// run fails with a `FATAL:` status that can be read back via `/task`.
async fn event_handler(
    State(app_state): State<AppState>,
    Path(hook_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), IntakeError> {
    let headers = webhook_headers(&headers);
    debug!(%hook_type, headers = headers.len(), "Received webhook");

    // Verify the signature before parsing anything.
    if let Some(secret) = app_state.auth_key() {
        if let Err(e) = signature::verify(&headers, &body, secret) {
            warn!(%hook_type, error = %e, "Rejected webhook signature");
            return Err(e.into());
        }
    }

    let body: serde_json::Value = serde_json::from_slice(&body)?;
    let task_id = app_state
        .queue()
        .submit(hook_type.clone(), WebhookEnvelope::new(headers, body))
        .await?;

    info!(%task_id, %hook_type, "Webhook accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))))
}

async fn task_handler(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, IntakeError> {
    let record = match TaskId::new(task_id.as_str()) {
        Some(id) => app_state.queue().registry().get(&id).await,
        None => None,
    };
    record.map(Json).ok_or(IntakeError::TaskNotFound(task_id))
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Copies request headers that are valid UTF-8.
fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{channel, Job, TaskRegistry, TaskStatus};
    use crate::signature::sign_sha256;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn app(auth_key: Option<&[u8]>) -> (Router, AppState, mpsc::Receiver<Job>) {
        let (queue, receiver) = channel(8, TaskRegistry::new());
        let state = AppState::new(queue, auth_key.map(<[u8]>::to_vec));
        (build_router(state.clone()), state, receiver)
    }

    fn push_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ref": "refs/heads/main",
            "repository": { "clone_url": "https://example/repo.git" }
        }))
        .unwrap()
    }

    fn event_request(hook_type: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/event/{hook_type}"))
            .header("content-type", "application/json")
            .header("X-Gitea-Event", "push");
        if let Some(signature) = signature {
            builder = builder.header("X-Gitea-Signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (router, _, _rx) = app(None);
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_event_is_enqueued_with_headers_and_body() {
        let (router, state, mut rx) = app(None);

        let response = router
            .oneshot(event_request("gitea", push_body(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let task_id = json_body(response).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let job = rx.recv().await.unwrap();
        assert_eq!(job.task_id.as_str(), task_id);
        assert_eq!(job.hook_type, "gitea");
        assert_eq!(job.envelope.headers.get("x-gitea-event"), Some("push"));
        assert_eq!(job.envelope.body["ref"], "refs/heads/main");

        let record = state.queue().registry().get(&job.task_id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_hook_type_is_still_accepted() {
        let (router, _, mut rx) = app(None);
        let response = router
            .oneshot(event_request("bitbucket", push_body(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await.unwrap().hook_type, "bitbucket");
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let (router, _, _rx) = app(None);
        let response = router
            .oneshot(event_request("gitea", b"not json".to_vec(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_signature_is_accepted() {
        let secret = b"hook-secret";
        let (router, _, _rx) = app(Some(secret));
        let body = push_body();
        let signature = sign_sha256(&body, secret);

        let response = router
            .oneshot(event_request("gitea", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized_and_not_enqueued() {
        let (router, _, mut rx) = app(Some(b"hook-secret"));
        let body = push_body();
        let signature = sign_sha256(&body, b"wrong");

        let response = router
            .oneshot(event_request("gitea", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized_when_key_configured() {
        let (router, _, _rx) = app(Some(b"hook-secret"));
        let response = router
            .oneshot(event_request("gitea", push_body(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_closed_queue_is_service_unavailable() {
        let (router, _, rx) = app(None);
        drop(rx);
        let response = router
            .oneshot(event_request("gitea", push_body(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_task_status_lookup() {
        let (router, state, _rx) = app(None);
        let task_id = state
            .queue()
            .submit("gitea", WebhookEnvelope::new(WebhookHeaders::new(), json!({})))
            .await
            .unwrap();
        state
            .queue()
            .registry()
            .mark_failed(&task_id, "FATAL: No \"ref\" in request JSON body")
            .await;

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/task/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["task_id"], task_id.as_str());
        assert_eq!(body["status"], "failed");
        assert_eq!(body["detail"], "FATAL: No \"ref\" in request JSON body");
        assert!(body["finished_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (router, _, _rx) = app(None);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/task/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
