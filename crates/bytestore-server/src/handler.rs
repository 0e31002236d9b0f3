use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use bytestore_core::{
    Container, ContainerId, ContainerIndex, ObjectId, ObjectMeta, ReconcileSummary,
    StagedObject, StoreError, StoreResult,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::tokens::DownloadToken;

/// Multipart field carrying the payload; its filename becomes the object name.
const UPLOAD_FIELD: &str = "upload";
/// Multipart field carrying the opaque tag.
const TAG_FIELD: &str = "meta";
/// Body chunks buffered between the request and the payload writer.
const UPLOAD_QUEUE_DEPTH: usize = 8;

/// Run a blocking engine call off the async executor.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)
}

fn lookup(
    index: &ContainerIndex,
    container_id: &ContainerId,
    object_id: &ObjectId,
) -> ServerResult<(Arc<Container>, ObjectMeta)> {
    let container = index
        .get(container_id)
        .ok_or(StoreError::ContainerNotFound(*container_id))?;
    let meta = container
        .get(object_id)
        .ok_or(StoreError::ObjectNotFound(*object_id))?;
    Ok((container, meta))
}

fn resolve_container(state: &AppState, raw: &str) -> ServerResult<Arc<Container>> {
    let id = ContainerId::parse(raw)?;
    state
        .index
        .get(&id)
        .ok_or_else(|| StoreError::ContainerNotFound(id).into())
}

fn resolve_object(
    state: &AppState,
    raw_container: &str,
    raw_object: &str,
) -> ServerResult<(Arc<Container>, ObjectMeta)> {
    let container_id = ContainerId::parse(raw_container)?;
    let object_id = ObjectId::parse(raw_object)?;
    lookup(&state.index, &container_id, &object_id)
}

/// Strip characters that cannot appear inside a quoted header parameter.
fn attachment_header(name: &str) -> ServerResult<HeaderValue> {
    let safe: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_bytes(format!("attachment; filename=\"{safe}\"").as_bytes())
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn send_payload(container: &Container, meta: &ObjectMeta) -> ServerResult<Response> {
    let file = tokio::fs::File::open(container.payload_path(&meta.id)).await?;
    let size = file.metadata().await?.len();
    let headers = [
        (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
        (CONTENT_DISPOSITION, attachment_header(&meta.name)?),
        (CONTENT_LENGTH, HeaderValue::from(size)),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// Stream one multipart field into a staged payload.
///
/// Chunks travel through a bounded channel to a blocking writer, so only
/// [`UPLOAD_QUEUE_DEPTH`] chunks of the body are held in memory at a time.
async fn receive_payload(
    index: Arc<ContainerIndex>,
    container_id: ContainerId,
    name: String,
    field: &mut Field<'_>,
) -> ServerResult<(Arc<Container>, StagedObject)> {
    let (tx, mut rx) = mpsc::channel::<Bytes>(UPLOAD_QUEUE_DEPTH);
    let writer = tokio::task::spawn_blocking(move || -> StoreResult<_> {
        let container = index.get_or_create(container_id)?;
        let mut staged = container.stage(name)?;
        while let Some(chunk) = rx.blocking_recv() {
            staged.write_all(&chunk)?;
        }
        Ok((container, staged))
    });

    let mut received: ServerResult<()> = Ok(());
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                // Closed channel: the writer failed and reports why below.
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                received = Err(ServerError::BadRequest(e.to_string()));
                break;
            }
        }
    }
    drop(tx);

    let staged = writer
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    received?;
    Ok(staged)
}

/// Liveness check.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "bytestore",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /file/:container` -- store a multipart upload, creating the
/// container on first use.
pub async fn upload(
    State(state): State<AppState>,
    Path(container): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<Json<ObjectMeta>> {
    let container_id = ContainerId::parse(&container)?;

    let mut staged: Option<(Arc<Container>, StagedObject)> = None;
    let mut tag = String::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(UPLOAD_FIELD) => {
                if staged.is_some() {
                    return Err(ServerError::BadRequest(format!(
                        "duplicate `{UPLOAD_FIELD}` field"
                    )));
                }
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let index = Arc::clone(&state.index);
                staged = Some(receive_payload(index, container_id, file_name, &mut field).await?);
            }
            Some(TAG_FIELD) => {
                tag = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
            }
            _ => {}
        }
    }

    let Some((container, staged)) = staged else {
        return Err(ServerError::BadRequest(format!(
            "missing `{UPLOAD_FIELD}` field"
        )));
    };

    let meta = blocking(move || container.commit(staged, tag)).await?;

    tracing::info!(container = %meta.container_id, object = %meta.id, "upload stored");
    Ok(Json(meta))
}

/// `GET /file/:container/:file`
pub async fn download(
    State(state): State<AppState>,
    Path((container, file)): Path<(String, String)>,
) -> ServerResult<Response> {
    let (container, meta) = resolve_object(&state, &container, &file)?;
    send_payload(&container, &meta).await
}

/// `GET /downloadbytoken/:token` -- the token is consumed when the download
/// succeeds. It is put back only if serving failed on our side; a token
/// whose object is gone is dropped.
pub async fn download_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ServerResult<Response> {
    let grant = state.tokens.take(&token).ok_or(ServerError::TokenNotFound)?;

    let result = match lookup(&state.index, &grant.container_id, &grant.object_id) {
        Ok((container, meta)) => send_payload(&container, &meta).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        if e.status().is_server_error() {
            state.tokens.restore(grant);
        }
    }
    result
}

/// `POST /token/:container/:file`
pub async fn create_token(
    State(state): State<AppState>,
    Path((container, file)): Path<(String, String)>,
) -> ServerResult<Json<DownloadToken>> {
    let (container, meta) = resolve_object(&state, &container, &file)?;
    Ok(Json(state.tokens.issue(container.id(), meta.id)))
}

/// `GET /info`
pub async fn list_containers(State(state): State<AppState>) -> Json<Vec<ContainerId>> {
    Json(state.index.list(state.list_limit))
}

/// `GET /info/:container`
pub async fn list_objects(
    State(state): State<AppState>,
    Path(container): Path<String>,
) -> ServerResult<Json<Vec<ObjectId>>> {
    let container = resolve_container(&state, &container)?;
    Ok(Json(container.list(state.list_limit)))
}

/// `GET /info/:container/:file`
pub async fn object_info(
    State(state): State<AppState>,
    Path((container, file)): Path<(String, String)>,
) -> ServerResult<Json<ObjectMeta>> {
    let (_, meta) = resolve_object(&state, &container, &file)?;
    Ok(Json(meta))
}

/// `POST /reconcile` -- bring the index back in line with the disk.
pub async fn reconcile(State(state): State<AppState>) -> ServerResult<Json<ReconcileSummary>> {
    let index = Arc::clone(&state.index);
    let summary = blocking(move || index.reconcile()).await?;
    Ok(Json(summary))
}

/// `DELETE /file/:container/:file`
pub async fn delete_object(
    State(state): State<AppState>,
    Path((container, file)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let (container, meta) = resolve_object(&state, &container, &file)?;
    blocking(move || container.remove(&meta)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /file/:container`
pub async fn delete_container(
    State(state): State<AppState>,
    Path(container): Path<String>,
) -> ServerResult<StatusCode> {
    let container_id = ContainerId::parse(&container)?;
    let index = Arc::clone(&state.index);
    blocking(move || index.delete_container(&container_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
