//! HttpBackend against an in-process axum server.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use council_client::HttpBackend;
use council_core::{BackendError, ConversationId, CouncilBackend, PipelineEvent, StreamError};
use serde_json::{Value, json};

async fn list() -> Json<Value> {
    Json(json!([
        {"id": "c-1", "created_at": "2025-03-01T10:00:00.123456", "title": "Greetings", "message_count": 2},
        {"id": "c-2", "created_at": "2025-03-02T09:30:00", "message_count": 0}
    ]))
}

async fn create() -> Json<Value> {
    Json(json!({
        "id": "c-new",
        "created_at": "2025-03-03T08:00:00",
        "title": "New Conversation",
        "messages": []
    }))
}

async fn fetch(Path(id): Path<String>) -> Response {
    if id != "c-1" {
        return (StatusCode::NOT_FOUND, "Conversation not found").into_response();
    }
    Json(json!({
        "id": "c-1",
        "created_at": "2025-03-01T10:00:00",
        "title": "Greetings",
        "messages": [
            {"role": "user", "content": "hello"},
            {"role": "assistant",
             "stage1": [{"model": "org/modelA", "response": "Hi"}],
             "stage2": [{"model": "org/modelA", "ranking": "FINAL RANKING:\n1. Response A",
                         "parsed_ranking": ["Response A"]}],
             "stage3": {"model": "org/chair", "response": "Hi there"}}
        ]
    }))
    .into_response()
}

async fn stream(Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "pipeline crashed").into_response();
    }
    let content = body["content"].as_str().unwrap_or_default().to_string();
    let payloads = vec![
        json!({"type": "stage1_start"}),
        json!({"type": "stage1_token", "model": "org/modelA", "content": content}),
        json!({"type": "stage4_start"}),
        json!({"type": "stage1_complete", "data": [{"model": "org/modelA", "response": "Hi"}]}),
        json!({"type": "title_complete"}),
        json!({"type": "complete"}),
    ];
    let events = payloads
        .into_iter()
        .map(|p| Ok::<_, Infallible>(Event::default().data(p.to_string())));
    Sse::new(tokio_stream::iter(events)).into_response()
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/conversations", get(list).post(create))
        .route("/api/conversations/{id}", get(fetch))
        .route("/api/conversations/{id}/message/stream", post(stream));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn backend() -> HttpBackend {
    let addr = serve().await;
    HttpBackend::new(format!("http://{addr}/")).unwrap()
}

#[tokio::test]
async fn lists_conversations() {
    let backend = backend().await;
    let list = backend.list_conversations().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id.as_str(), "c-1");
    assert_eq!(list[0].title.as_deref(), Some("Greetings"));
    assert_eq!(list[1].title, None);
    assert!(backend.health_check().await.unwrap());
}

#[tokio::test]
async fn creates_conversation() {
    let backend = backend().await;
    let summary = backend.create_conversation().await.unwrap();
    assert_eq!(summary.id.as_str(), "c-new");
    assert_eq!(summary.message_count, 0);
}

#[tokio::test]
async fn fetches_conversation_with_stage_results() {
    let backend = backend().await;
    let conv = backend
        .get_conversation(&ConversationId::from("c-1"))
        .await
        .unwrap();
    assert_eq!(conv.messages.len(), 2);
    let msg = conv.last_assistant().unwrap();
    assert_eq!(msg.stage3.as_ref().unwrap().response, "Hi there");
    assert_eq!(msg.stage2.as_ref().unwrap()[0].parsed_ranking, vec!["Response A"]);
    assert!(!msg.is_in_flight());
}

#[tokio::test]
async fn missing_conversation_is_not_found() {
    let backend = backend().await;
    let err = backend
        .get_conversation(&ConversationId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotFound(id) if id == "nope"));
}

#[tokio::test]
async fn streams_events_in_order() {
    let backend = backend().await;
    let mut rx = backend
        .send_message_stream(&ConversationId::from("c-1"), "hello")
        .await
        .unwrap();

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }

    assert_eq!(items.len(), 6);
    assert_eq!(items[0], Ok(PipelineEvent::Stage1Start));
    assert_eq!(
        items[1],
        Ok(PipelineEvent::Stage1Token {
            model: "org/modelA".into(),
            content: "hello".into(),
        })
    );
    assert_eq!(items[2], Err(StreamError::UnknownEvent("stage4_start".into())));
    assert!(matches!(items[3], Ok(PipelineEvent::Stage1Complete { .. })));
    assert_eq!(items[4], Ok(PipelineEvent::TitleComplete));
    assert_eq!(items[5], Ok(PipelineEvent::Complete));
}

#[tokio::test]
async fn server_error_refuses_the_stream() {
    let backend = backend().await;
    let err = backend
        .send_message_stream(&ConversationId::from("broken"), "x")
        .await
        .unwrap_err();
    match err {
        BackendError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "pipeline crashed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let backend = HttpBackend::new("http://127.0.0.1:1").unwrap();
    let err = backend.list_conversations().await.unwrap_err();
    assert!(matches!(err, BackendError::Network(_) | BackendError::Timeout(_)));
}
