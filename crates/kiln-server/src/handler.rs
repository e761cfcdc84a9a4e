use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use tracing::{debug, info};

use kiln_codec::Chunk;
use kiln_protocol::{
    validate_stream_id, DownloadResponse, ExistsResponse, HealthResponse, IdsRequest, ObjectEntry,
    UploadRequest, UploadResponse,
};
use kiln_types::ObjectId;

use crate::auth::{Action, Credentials, Identity};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

type AppStateRef = State<Arc<AppState>>;

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// `POST /v1/streams/:stream/objects`
pub async fn upload_handler(
    State(state): AppStateRef,
    Path(stream): Path<String>,
    headers: HeaderMap,
    Json(batch): Json<UploadRequest>,
) -> ServerResult<Json<UploadResponse>> {
    let identity = admit(&state, &headers, Action::Write { stream: stream.clone() }).await?;
    batch.check_size(state.config.max_batch_bytes)?;

    // Validate the whole batch before storing any of it.
    if state.config.verify_uploads {
        for entry in &batch.objects {
            verify_entry(entry)?;
        }
    }

    let store = state.stream_or_create(&stream);
    let stored = batch
        .objects
        .into_iter()
        .filter(|entry| store.insert(entry.id, entry.payload.clone()))
        .count();
    info!(stream = %stream, identity = %identity.name, stored, "upload accepted");
    Ok(Json(UploadResponse { stored }))
}

/// `GET /v1/streams/:stream/objects/:id`
pub async fn object_handler(
    State(state): AppStateRef,
    Path((stream, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    admit(&state, &headers, Action::Read { stream: stream.clone() }).await?;
    let id = ObjectId::from_hex(&id).map_err(|e| ServerError::InvalidId(e.to_string()))?;
    let payload = state
        .stream(&stream)
        .and_then(|store| store.payload(&id))
        .ok_or_else(|| ServerError::NotFound(format!("object {id} in stream {stream}")))?;
    Ok(([(CONTENT_TYPE, "application/json")], payload).into_response())
}

/// `POST /v1/streams/:stream/download`
pub async fn download_handler(
    State(state): AppStateRef,
    Path(stream): Path<String>,
    headers: HeaderMap,
    Json(request): Json<IdsRequest>,
) -> ServerResult<Json<DownloadResponse>> {
    admit(&state, &headers, Action::Read { stream: stream.clone() }).await?;
    let objects = match state.stream(&stream) {
        Some(store) => request
            .ids
            .iter()
            .filter_map(|id| store.payload(id).map(|payload| ObjectEntry::new(*id, payload)))
            .collect(),
        None => Vec::new(),
    };
    debug!(stream = %stream, requested = request.ids.len(), found = objects.len(), "download");
    Ok(Json(DownloadResponse { objects }))
}

/// `POST /v1/streams/:stream/exists`
pub async fn exists_handler(
    State(state): AppStateRef,
    Path(stream): Path<String>,
    headers: HeaderMap,
    Json(request): Json<IdsRequest>,
) -> ServerResult<Json<ExistsResponse>> {
    admit(&state, &headers, Action::Read { stream: stream.clone() }).await?;
    let present = match state.stream(&stream) {
        Some(store) => request
            .ids
            .into_iter()
            .filter(|id| store.payload(id).is_some())
            .collect(),
        None => Vec::new(),
    };
    Ok(Json(ExistsResponse { present }))
}

/// Check the stream name, authenticate the caller and authorize `action`.
async fn admit(state: &AppState, headers: &HeaderMap, action: Action) -> ServerResult<Identity> {
    validate_stream_id(action.stream())?;
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let credentials = Credentials::from_header(header);
    let identity = state.auth.authenticate(&credentials).await?;
    if !state.auth.authorize(&identity, &action).await? {
        return Err(if identity.anonymous {
            ServerError::AuthFailed(format!("{action} requires credentials"))
        } else {
            ServerError::AuthorizationDenied {
                action: action.to_string(),
            }
        });
    }
    Ok(identity)
}

/// Reject a payload that does not hash to the id it was sent under.
fn verify_entry(entry: &ObjectEntry) -> ServerResult<()> {
    let invalid = |reason: String| ServerError::InvalidObject {
        id: entry.id,
        reason,
    };
    let chunk = Chunk::decode(&entry.payload).map_err(|e| invalid(e.to_string()))?;
    chunk.verify(&entry.id).map_err(|e| invalid(e.to_string()))
}
