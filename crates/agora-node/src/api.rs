//! HTTP API for Agora.

use crate::error::Error;
use crate::ingest;
use crate::models::Document;
use crate::node::NodeState;
use crate::session::SessionPhase;
use crate::threads::{self, ThreadView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Documents
        .route("/api/v1/documents", get(list_documents).post(create_document))
        .route("/api/v1/documents/:id", get(get_document))
        .route("/api/v1/documents/:id/read", post(mark_read))
        // Threads
        .route("/api/v1/threads", get(list_threads))
        // Node
        .route("/api/v1/identity", get(get_identity))
        .route("/api/v1/peers", get(list_peers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotReady | Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.session.phase() {
        SessionPhase::Ready => (StatusCode::OK, "OK"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
    }
}

// --- Document endpoints ---

async fn load_view(state: &NodeState) -> Result<ThreadView, Error> {
    let store = state.session.store().await?;
    let mut view = threads::list_threaded(store.as_ref()).await?;
    state.cache.load_read_marks(&mut view.documents)?;
    state.cache.load_read_marks(&mut view.roots)?;
    Ok(view)
}

async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, Error> {
    Ok(Json(load_view(&state).await?.documents))
}

async fn list_threads(State(state): State<AppState>) -> Result<Json<Vec<Document>>, Error> {
    Ok(Json(load_view(&state).await?.roots))
}

#[derive(Debug, Deserialize)]
struct CreateDocumentRequest {
    body: String,
    in_reply_to_id: Option<String>,
}

async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), Error> {
    let mut document = Document::new(req.body);
    if let Some(parent) = req.in_reply_to_id {
        document = document.in_reply_to(parent);
    }

    let store = state.session.store().await?;
    ingest::submit(store.as_ref(), &document).await?;

    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, Error> {
    let store = state.session.store().await?;
    let mut document = ingest::get_by_id(store.as_ref(), &id).await?;
    document.read = state.cache.is_read(&document.id)?;
    Ok(Json(document))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    let store = state.session.store().await?;
    ingest::get_by_id(store.as_ref(), &id).await?;
    state.cache.mark_read(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Node endpoints ---

#[derive(Debug, Serialize)]
struct IdentityResponse {
    id: String,
    public_key: String,
    address: Option<String>,
    phase: SessionPhase,
}

async fn get_identity(State(state): State<AppState>) -> Json<IdentityResponse> {
    let address = state.session.store().await.ok().map(|store| store.address());
    Json(IdentityResponse {
        id: state.session.own_identity(),
        public_key: hex::encode(state.session.own_public_key().as_bytes()),
        address,
        phase: state.session.phase(),
    })
}

#[derive(Debug, Serialize)]
struct PeerSummary {
    id: String,
    addr: String,
    connected_ms: u64,
}

async fn list_peers(State(state): State<AppState>) -> Json<Vec<PeerSummary>> {
    let peers = state
        .transport
        .connected_peers()
        .await
        .into_iter()
        .map(|peer| PeerSummary {
            id: peer.id,
            addr: peer.addr.to_string(),
            connected_ms: peer.connected_at.elapsed().as_millis() as u64,
        })
        .collect();
    Json(peers)
}
