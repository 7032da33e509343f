use super::*;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde_json::json;
use shared::error::ConnectivityKind;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    docs: Arc<Mutex<Vec<Value>>>,
    next_id: Arc<Mutex<u32>>,
    last_query: Arc<Mutex<Option<HashMap<String, String>>>>,
}

async fn list_documents(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Value>> {
    *state.last_query.lock().await = Some(query);
    Json(state.docs.lock().await.clone())
}

async fn create_document(
    State(state): State<ServerState>,
    Json(fields): Json<Value>,
) -> axum::response::Response {
    if fields.get("name") == Some(&json!("")) {
        return (StatusCode::UNPROCESSABLE_ENTITY, "name must not be empty").into_response();
    }
    let id = {
        let mut next = state.next_id.lock().await;
        *next += 1;
        format!("srv-{}", *next)
    };
    let now = Utc::now();
    let doc = json!({
        "id": id,
        "created_at": now,
        "updated_at": now,
        "fields": fields,
    });
    state.docs.lock().await.push(doc.clone());
    Json(doc).into_response()
}

async fn update_document(
    Path((_collection, id)): Path<(String, String)>,
    State(state): State<ServerState>,
    Json(_partial): Json<Value>,
) -> StatusCode {
    let docs = state.docs.lock().await;
    if docs.iter().any(|doc| doc["id"] == json!(id)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_document(
    Path((_collection, id)): Path<(String, String)>,
    State(state): State<ServerState>,
) -> StatusCode {
    let mut docs = state.docs.lock().await;
    let before = docs.len();
    docs.retain(|doc| doc["id"] != json!(id));
    if docs.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route(
            "/collections/:collection/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/collections/:collection/documents/:id",
            patch(update_document).delete(delete_document),
        )
        .with_state(state)
}

async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn store_for(base_url: &str, timeout_seconds: u64) -> RestStore {
    RestStore::new(
        &RestSettings {
            base_url: base_url.to_string(),
            request_timeout_seconds: timeout_seconds,
        },
        "records",
    )
    .unwrap()
}

fn fields(name: &str) -> Document {
    let mut fields = Document::new();
    fields.insert("name".to_string(), json!(name));
    fields
}

#[tokio::test]
async fn add_then_get_all_roundtrip() {
    let state = ServerState::default();
    let base_url = spawn_server(router(state)).await;
    let store = store_for(&base_url, 5);

    let added = store.add(&fields("alpha")).await.unwrap();
    assert_eq!(added.id, EntityId::from("srv-1"));
    assert_eq!(added.fields.get("name"), Some(&json!("alpha")));

    let records = store.get_all(&[]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, added.id);
}

#[tokio::test]
async fn filter_predicates_travel_as_query_parameters() {
    let state = ServerState::default();
    let base_url = spawn_server(router(state.clone())).await;
    let store = store_for(&base_url, 5);

    store
        .get_all(&[FilterPredicate::eq("name", json!("alpha"))])
        .await
        .unwrap();

    let query = state.last_query.lock().await.clone().unwrap();
    assert_eq!(query.get("name"), Some(&"alpha".to_string()));
}

#[tokio::test]
async fn rejected_create_is_validation() {
    let state = ServerState::default();
    let base_url = spawn_server(router(state)).await;
    let store = store_for(&base_url, 5);

    let err = store.add(&fields("")).await.unwrap_err();
    match err {
        StoreError::Validation(message) => assert!(message.contains("name")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn update_unknown_document_is_not_found() {
    let state = ServerState::default();
    let base_url = spawn_server(router(state)).await;
    let store = store_for(&base_url, 5);

    let err = store
        .update(&EntityId::from("ghost"), &fields("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_roundtrip_and_unknown_delete_is_not_found() {
    let state = ServerState::default();
    let base_url = spawn_server(router(state)).await;
    let store = store_for(&base_url, 5);

    let added = store.add(&fields("alpha")).await.unwrap();
    store.remove(&added.id).await.unwrap();

    let err = store.remove(&added.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.get_all(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn connection_refused_is_classified_unreachable() {
    // Bind and drop to get a port with nothing listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = store_for(&format!("http://{addr}"), 5);
    let err = store.get_all(&[]).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Connectivity(ConnectivityKind::Unreachable)
    ));
}

#[tokio::test]
async fn connection_dropped_mid_request_is_classified_unreachable() {
    use tokio::io::AsyncReadExt;

    // Accepts, reads a little, then slams the connection shut before
    // any response bytes are written.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });

    let store = store_for(&format!("http://{addr}"), 5);
    let err = store.get_all(&[]).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Connectivity(ConnectivityKind::Unreachable)
    ));
}

#[tokio::test]
async fn slow_server_is_classified_timeout() {
    async fn slow_list() -> Json<Vec<Value>> {
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        Json(Vec::new())
    }
    let app = Router::new().route("/collections/:collection/documents", get(slow_list));
    let base_url = spawn_server(app).await;

    let store = store_for(&base_url, 1);
    let err = store.get_all(&[]).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Connectivity(ConnectivityKind::Timeout)
    ));
}
