//! HTTP routes for chatline.
//!
//! Every route acts for the caller named in `x-user-id`. Pushes to other
//! users happen inside the service once the change is stored.

use crate::auth::Caller;
use crate::config::Config;
use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;
use crate::ws;
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use chatline_protocol::{ConversationId, DeliveryStatus, Message, MessageId, NewMessage, UserId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of `PUT /api/messages/:id`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditRequest {
    pub content: String,
}

/// Body of `PUT /api/messages/status`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusRequest {
    pub conversation_id: ConversationId,
    pub status: DeliveryStatus,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/messages/status", put(update_status))
        .route("/api/messages/unread/count", get(unread_count))
        .route("/api/messages/unread/counts-by-sender", get(unread_by_sender))
        .route("/api/messages/read/:partner_id", put(mark_read))
        .route("/api/messages/clear/:partner_id", delete(clear_history))
        .route(
            "/api/messages/:id",
            get(history)
                .post(send_message)
                .put(edit_message)
                .delete(delete_message),
        )
        .route(&ws_path, get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/websocket server until ctrl-c.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone()));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = router(state.clone());
    let listener = TcpListener::bind(addr).await?;

    info!("chatline server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?user_id=<id>",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.service.shutdown();
    info!("chatline server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": state.service.presence().count(),
    }))
}

fn parse_message_id(raw: &str) -> Result<MessageId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid message id {raw:?}")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(receiver): Path<String>,
    payload: Result<Json<NewMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let new = body(payload)?;
    let start = Instant::now();

    let message = state
        .service
        .send(&caller.user, &UserId::new(receiver), new)
        .await?;

    metrics::record_message_sent();
    metrics::record_latency("send", start.elapsed().as_secs_f64());
    Ok((StatusCode::CREATED, Json(message)))
}

async fn history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(partner): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let start = Instant::now();
    let messages = state
        .service
        .history(&caller.user, &UserId::new(partner))
        .await?;

    metrics::record_latency("history", start.elapsed().as_secs_f64());
    Ok(Json(messages))
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let id = parse_message_id(&id)?;
    let request = body(payload)?;

    let message = state
        .service
        .edit_message(&caller.user, id, request.content)
        .await?;

    metrics::record_mutation("edit");
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    let id = parse_message_id(&id)?;
    let message = state.service.delete_message(&caller.user, id).await?;

    metrics::record_mutation("delete");
    Ok(Json(message))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body(payload)?;
    let updated = state
        .service
        .update_status(&caller.user, request.conversation_id, request.status)
        .await?;

    metrics::record_status_updates(updated);
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(partner): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .service
        .mark_seen_from(&caller.user, &UserId::new(partner))
        .await?;

    metrics::record_status_updates(updated);
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.service.total_unread(&caller.user).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn unread_by_sender(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<BTreeMap<UserId, u64>>, ApiError> {
    Ok(Json(state.service.unread_by_sender(&caller.user).await?))
}

async fn clear_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(partner): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    caller.require_admin()?;

    let deleted = state
        .service
        .clear_conversation(&caller.user, &UserId::new(partner))
        .await?;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState::new(Config::default())))
    }

    fn request(method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send(app: &Router, from: &str, to: &str, content: &str) -> Value {
        let (status, body) = call(
            app,
            request(
                Method::POST,
                &format!("/api/messages/{to}"),
                Some(from),
                Some(json!({ "content": content })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_send_and_history() {
        let app = app();
        let sent = send(&app, "alice", "bob", "hello").await;
        assert_eq!(sent["status"], "sent");
        assert_eq!(sent["sender"], "alice");

        let (status, history) = call(
            &app,
            request(Method::GET, "/api/messages/alice", Some("bob"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["content"], "hello");

        let (_, empty) = call(
            &app,
            request(Method::GET, "/api/messages/carol", Some("bob"), None),
        )
        .await;
        assert_eq!(empty, json!([]));
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let (status, body) = call(
            &app(),
            request(Method::GET, "/api/messages/unread/count", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_bodies() {
        let app = app();
        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/messages/bob",
                Some("alice"),
                Some(json!({ "content": "hi", "sender": "mallory" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/messages/bob",
                Some("alice"),
                Some(json!({ "content": "" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            request(
                Method::PUT,
                "/api/messages/not-a-uuid",
                Some("alice"),
                Some(json!({ "content": "x" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unread_and_mark_read() {
        let app = app();
        send(&app, "alice", "bob", "one").await;
        send(&app, "alice", "bob", "two").await;
        send(&app, "carol", "bob", "three").await;

        let (_, count) = call(
            &app,
            request(Method::GET, "/api/messages/unread/count", Some("bob"), None),
        )
        .await;
        assert_eq!(count["count"], 3);

        let (_, by_sender) = call(
            &app,
            request(
                Method::GET,
                "/api/messages/unread/counts-by-sender",
                Some("bob"),
                None,
            ),
        )
        .await;
        assert_eq!(by_sender, json!({ "alice": 2, "carol": 1 }));

        let (status, updated) = call(
            &app,
            request(Method::PUT, "/api/messages/read/alice", Some("bob"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["updated"], 2);

        let (_, count) = call(
            &app,
            request(Method::GET, "/api/messages/unread/count", Some("bob"), None),
        )
        .await;
        assert_eq!(count["count"], 1);
    }

    #[tokio::test]
    async fn test_update_status_route() {
        let app = app();
        let sent = send(&app, "alice", "bob", "hi").await;
        let conversation_id = sent["conversation_id"].clone();

        let (status, _) = call(
            &app,
            request(
                Method::PUT,
                "/api/messages/status",
                Some("mallory"),
                Some(json!({ "conversation_id": conversation_id, "status": "seen" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            request(
                Method::PUT,
                "/api/messages/status",
                Some("bob"),
                Some(json!({ "conversation_id": conversation_id, "status": "delivered" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 1);
    }

    #[tokio::test]
    async fn test_edit_and_delete_routes() {
        let app = app();
        let sent = send(&app, "alice", "bob", "draft").await;
        let uri = format!("/api/messages/{}", sent["id"].as_str().unwrap());

        let (status, _) = call(
            &app,
            request(Method::PUT, &uri, Some("bob"), Some(json!({ "content": "hijack" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, edited) = call(
            &app,
            request(Method::PUT, &uri, Some("alice"), Some(json!({ "content": "final" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["content"], "final");
        assert_eq!(edited["is_edited"], true);

        let (status, deleted) = call(&app, request(Method::DELETE, &uri, Some("alice"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["is_deleted"], true);
        assert_eq!(deleted["content"], "This message was deleted");

        let (status, _) = call(&app, request(Method::DELETE, &uri, Some("alice"), None)).await;
        assert_eq!(status, StatusCode::GONE);

        let missing = format!("/api/messages/{}", MessageId::generate());
        let (status, _) = call(&app, request(Method::DELETE, &missing, Some("alice"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_requires_admin() {
        let app = app();
        send(&app, "alice", "bob", "one").await;

        let (status, _) = call(
            &app,
            request(Method::DELETE, "/api/messages/clear/bob", Some("alice"), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = Request::builder()
            .method(Method::DELETE)
            .uri("/api/messages/clear/bob")
            .header(USER_ID_HEADER, "alice")
            .header(USER_ROLE_HEADER, "admin")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, admin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);

        let (_, history) = call(
            &app,
            request(Method::GET, "/api/messages/bob", Some("alice"), None),
        )
        .await;
        assert_eq!(history, json!([]));
    }
}
