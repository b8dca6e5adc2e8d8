use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{ConversationId, ServiceId, UserId};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Default)]
struct Captured {
    resolve: Mutex<Vec<(String, Value, Option<String>)>>,
    history_queries: Mutex<Vec<(String, HashMap<String, String>)>>,
    send_bodies: Mutex<Vec<(String, Value)>>,
    read_paths: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
}

async fn handle_resolve(
    State(captured): State<Arc<Captured>>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured
        .resolve
        .lock()
        .await
        .push((provider_id, body, auth));
    Json(json!({"conversation": {"_id": "conv-9"}}))
}

async fn handle_history(
    State(captured): State<Arc<Captured>>,
    Path(conversation_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    captured
        .history_queries
        .lock()
        .await
        .push((conversation_id, params));
    Json(json!({
        "messages": [{
            "_id": "m1",
            "senderRole": "customer",
            "text": "is tomorrow ok?",
            "createdAt": "2025-03-10T09:00:00Z"
        }],
        "nextCursor": "older-1"
    }))
}

async fn handle_send(
    State(captured): State<Arc<Captured>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    captured
        .send_bodies
        .lock()
        .await
        .push((conversation_id, body.clone()));
    if captured.fail_sends.load(Ordering::SeqCst) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"code": "forbidden", "message": "customer has blocked this conversation"})),
        ));
    }
    Ok(Json(json!({
        "message": {
            "_id": "srv-1",
            "senderRole": "provider",
            "text": body["text"],
            "createdAt": "2025-03-10T12:00:00Z"
        }
    })))
}

async fn handle_read(
    State(captured): State<Arc<Captured>>,
    Path(conversation_id): Path<String>,
) -> Json<Value> {
    captured
        .read_paths
        .lock()
        .await
        .push(conversation_id);
    Json(json!({}))
}

async fn spawn_backend_server(captured: Arc<Captured>) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/conversations/with-service/:provider_id", post(handle_resolve))
        .route("/messages/:conversation_id", get(handle_history).post(handle_send))
        .route("/messages/:conversation_id/read", post(handle_read))
        .with_state(captured);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn backend_against(captured: Arc<Captured>) -> HttpBackend {
    let base_url = spawn_backend_server(captured).await.expect("spawn server");
    HttpBackend::new(BackendConfig {
        base_url,
        bearer_token: "secret-token".to_string(),
    })
}

#[tokio::test]
async fn resolve_posts_the_service_id_with_a_bearer_token() {
    let captured = Arc::new(Captured::default());
    let backend = backend_against(Arc::clone(&captured)).await;

    let id = backend
        .resolve_conversation(&UserId::new("prov-1"), &ServiceId::new("svc-2"))
        .await
        .expect("resolve");
    assert_eq!(id.as_str(), "conv-9");

    let calls = captured.resolve.lock().await;
    let (provider_id, body, auth) = &calls[0];
    assert_eq!(provider_id, "prov-1");
    assert_eq!(body["serviceId"], "svc-2");
    assert_eq!(auth.as_deref(), Some("Bearer secret-token"));
}

#[tokio::test]
async fn fetch_messages_passes_limit_and_optional_cursor() {
    let captured = Arc::new(Captured::default());
    let backend = backend_against(Arc::clone(&captured)).await;
    let conversation_id = ConversationId::new("conv-9");

    let page = backend
        .fetch_messages(&conversation_id, 25, None)
        .await
        .expect("latest page");
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.next_cursor.as_deref(), Some("older-1"));

    backend
        .fetch_messages(&conversation_id, 25, Some("older-1"))
        .await
        .expect("older page");

    let queries = captured.history_queries.lock().await;
    assert_eq!(queries[0].0, "conv-9");
    assert_eq!(queries[0].1.get("limit").map(String::as_str), Some("25"));
    assert!(!queries[0].1.contains_key("cursor"));
    assert_eq!(
        queries[1].1.get("cursor").map(String::as_str),
        Some("older-1")
    );
}

#[tokio::test]
async fn post_message_sends_the_text_body() {
    let captured = Arc::new(Captured::default());
    let backend = backend_against(Arc::clone(&captured)).await;

    let record = backend
        .post_message(&ConversationId::new("conv-9"), "see you then")
        .await
        .expect("post");
    assert_eq!(record.id.as_str(), "srv-1");
    assert_eq!(record.text.as_deref(), Some("see you then"));

    let bodies = captured.send_bodies.lock().await;
    assert_eq!(bodies[0].0, "conv-9");
    assert_eq!(bodies[0].1, json!({"text": "see you then"}));
}

#[tokio::test]
async fn mark_read_posts_to_the_read_path_and_ignores_the_body() {
    let captured = Arc::new(Captured::default());
    let backend = backend_against(Arc::clone(&captured)).await;

    backend
        .mark_read(&ConversationId::new("conv-9"))
        .await
        .expect("mark read");
    assert_eq!(captured.read_paths.lock().await.as_slice(), ["conv-9"]);
}

#[tokio::test]
async fn structured_error_bodies_surface_in_the_failure() {
    let captured = Arc::new(Captured::default());
    captured.fail_sends.store(true, Ordering::SeqCst);
    let backend = backend_against(Arc::clone(&captured)).await;

    let err = backend
        .post_message(&ConversationId::new("conv-9"), "hello")
        .await
        .expect_err("must fail");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("server rejected request"), "{rendered}");
    assert!(rendered.contains("blocked"), "{rendered}");
}
