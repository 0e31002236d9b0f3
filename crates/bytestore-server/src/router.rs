use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Management API: uploads, listings, deletes, token issuance, reconcile.
///
/// Uploads are not size-limited; they are streamed to disk.
pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/file/:container",
            post(handler::upload).delete(handler::delete_container),
        )
        .route(
            "/file/:container/:file",
            get(handler::download).delete(handler::delete_object),
        )
        .route("/info", get(handler::list_containers))
        .route("/info/:container", get(handler::list_objects))
        .route("/info/:container/:file", get(handler::object_info))
        .route("/token/:container/:file", post(handler::create_token))
        .route("/reconcile", post(handler::reconcile))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Public surface: token downloads only.
pub fn build_public_router(state: AppState) -> Router {
    Router::new()
        .route("/downloadbytoken/:token", get(handler::download_by_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
