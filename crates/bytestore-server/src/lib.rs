//! HTTP front end for the bytestore engine.
//!
//! Translates routes into [`bytestore_core`] calls and engine errors into
//! status codes. Two routers share one [`AppState`]: the management API and
//! the public token-download surface.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;
pub mod tokens;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::BytestoreServer;
pub use state::AppState;
pub use tokens::{DownloadToken, TokenRegistry};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use bytestore_core::{ContainerId, ContainerIndex, ObjectMeta};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "bytestore-test-boundary";

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(ContainerIndex::open(dir.path()).unwrap());
        (dir, AppState::new(index, 300))
    }

    fn multipart_body(file_name: &str, payload: &[u8], tag: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\n{tag}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"upload\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_body_tag_last(file_name: &str, payload: &[u8], tag: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"upload\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(
            format!(
                "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\n{tag}\r\n--{BOUNDARY}--\r\n"
            )
            .as_bytes(),
        );
        body
    }

    async fn post_multipart(app: &Router, container: &ContainerId, body: Vec<u8>) -> ObjectMeta {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/file/{container}"))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn upload(
        app: &Router,
        container: &ContainerId,
        name: &str,
        payload: &[u8],
        tag: &str,
    ) -> ObjectMeta {
        post_multipart(app, container, multipart_body(name, payload, tag)).await
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);
        let (status, _) = send(&app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_info_and_download() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();

        let meta = upload(&app, &c1, "report.pdf", b"%PDF-1.4 body", "v1").await;
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.tag, "v1");
        assert_eq!(meta.container_id, c1);

        let (status, body) = send(&app, "GET", &format!("/info/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::OK);
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["FileName"], "report.pdf");
        assert_eq!(info["Meta"], "v1");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/file/{c1}/{}", meta.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn listings() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();
        let a = upload(&app, &c1, "a", b"a", "").await;
        let b = upload(&app, &c1, "b", b"b", "").await;

        let (status, body) = send(&app, "GET", "/info").await;
        assert_eq!(status, StatusCode::OK);
        let containers: Vec<ContainerId> = serde_json::from_slice(&body).unwrap();
        assert_eq!(containers, vec![c1]);

        let (status, body) = send(&app, "GET", &format!("/info/{c1}")).await;
        assert_eq!(status, StatusCode::OK);
        let mut objects: Vec<bytestore_core::ObjectId> = serde_json::from_slice(&body).unwrap();
        objects.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(objects, expected);
    }

    #[tokio::test]
    async fn invalid_and_unknown_ids() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);

        let (status, _) = send(&app, "GET", "/info/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", &format!("/info/{}", ContainerId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let c1 = ContainerId::new();
        upload(&app, &c1, "a", b"a", "").await;
        let missing = bytestore_core::ObjectId::new();
        let (status, _) = send(&app, "GET", &format!("/file/{c1}/{missing}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\nv1\r\n--{BOUNDARY}--\r\n"
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/file/{}", ContainerId::new()))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_object_evicts_and_removes_files() {
        let (_dir, state) = test_state();
        let index = Arc::clone(&state.index);
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();
        let meta = upload(&app, &c1, "a", b"data", "").await;
        let payload = index.get(&c1).unwrap().payload_path(&meta.id);
        assert!(payload.exists());

        let (status, _) = send(&app, "DELETE", &format!("/file/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!payload.exists());

        let (status, _) = send(&app, "GET", &format!("/info/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_container_evicts_and_removes_directory() {
        let (_dir, state) = test_state();
        let index = Arc::clone(&state.index);
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();
        let meta = upload(&app, &c1, "a", b"data", "").await;
        let dir = index.get(&c1).unwrap().dir().to_path_buf();

        let (status, _) = send(&app, "DELETE", &format!("/file/{c1}")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!dir.exists());

        let (status, _) = send(&app, "GET", &format!("/info/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &format!("/file/{c1}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn token_download_is_single_use() {
        let (_dir, state) = test_state();
        let api = router::build_api_router(state.clone());
        let public = router::build_public_router(state);
        let c1 = ContainerId::new();
        let meta = upload(&api, &c1, "a.bin", b"secret bytes", "").await;

        let (status, body) = send(&api, "POST", &format!("/token/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::OK);
        let grant: DownloadToken = serde_json::from_slice(&body).unwrap();
        assert_eq!(grant.container_id, c1);
        assert_eq!(grant.object_id, meta.id);

        let uri = format!("/downloadbytoken/{}", grant.token);
        let (status, body) = send(&public, "GET", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"secret bytes");

        let (status, _) = send(&public, "GET", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn public_router_does_not_expose_api() {
        let (_dir, state) = test_state();
        let public = router::build_public_router(state);
        let (status, _) = send(&public, "GET", "/info").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn large_upload_streams_to_disk_and_back() {
        let (_dir, state) = test_state();
        let index = Arc::clone(&state.index);
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();
        let payload: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();

        let meta = upload(&app, &c1, "big.bin", &payload, "").await;
        let on_disk = std::fs::read(index.get(&c1).unwrap().payload_path(&meta.id)).unwrap();
        assert_eq!(on_disk.len(), payload.len());
        assert!(on_disk == payload);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/file/{c1}/{}", meta.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-length"],
            payload.len().to_string().as_str()
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body[..] == payload[..]);
    }

    #[tokio::test]
    async fn tag_field_may_follow_the_payload() {
        let (_dir, state) = test_state();
        let app = router::build_api_router(state);
        let c1 = ContainerId::new();

        let body = multipart_body_tag_last("late.txt", b"payload first", "v9");
        let meta = post_multipart(&app, &c1, body).await;
        assert_eq!(meta.name, "late.txt");
        assert_eq!(meta.tag, "v9");

        let (status, body) = send(&app, "GET", &format!("/file/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"payload first");
    }

    #[tokio::test]
    async fn token_for_deleted_object_is_dropped() {
        let (_dir, state) = test_state();
        let tokens = Arc::clone(&state.tokens);
        let api = router::build_api_router(state.clone());
        let public = router::build_public_router(state);
        let c1 = ContainerId::new();
        let meta = upload(&api, &c1, "a.bin", b"bytes", "").await;

        let (_, body) = send(&api, "POST", &format!("/token/{c1}/{}", meta.id)).await;
        let grant: DownloadToken = serde_json::from_slice(&body).unwrap();
        let (status, _) = send(&api, "DELETE", &format!("/file/{c1}/{}", meta.id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let uri = format!("/downloadbytoken/{}", grant.token);
        let (status, _) = send(&public, "GET", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn token_survives_server_side_failure() {
        let (_dir, state) = test_state();
        let tokens = Arc::clone(&state.tokens);
        let index = Arc::clone(&state.index);
        let api = router::build_api_router(state.clone());
        let public = router::build_public_router(state);
        let c1 = ContainerId::new();
        let meta = upload(&api, &c1, "a.bin", b"bytes", "").await;

        let (_, body) = send(&api, "POST", &format!("/token/{c1}/{}", meta.id)).await;
        let grant: DownloadToken = serde_json::from_slice(&body).unwrap();
        // Indexed but unreadable: the payload vanished out of band.
        std::fs::remove_file(index.get(&c1).unwrap().payload_path(&meta.id)).unwrap();

        let uri = format!("/downloadbytoken/{}", grant.token);
        let (status, _) = send(&public, "GET", &uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(tokens.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_endpoint_picks_up_disk_changes() {
        let (dir, state) = test_state();
        let app = router::build_api_router(state);
        let added = ContainerId::new();
        std::fs::create_dir(dir.path().join(added.to_string())).unwrap();

        let (status, body) = send(&app, "POST", "/reconcile").await;
        assert_eq!(status, StatusCode::OK);
        let summary: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["containers_added"], 1);
        assert_eq!(summary["containers_evicted"], 0);

        let (status, body) = send(&app, "GET", "/info").await;
        assert_eq!(status, StatusCode::OK);
        let containers: Vec<ContainerId> = serde_json::from_slice(&body).unwrap();
        assert_eq!(containers, vec![added]);
    }
}
