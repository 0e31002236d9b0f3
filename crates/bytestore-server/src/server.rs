use std::sync::Arc;

use bytestore_core::ContainerIndex;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::{build_api_router, build_public_router};
use crate::state::AppState;

/// Bytestore HTTP server: one API listener and one public download listener
/// sharing a single index.
pub struct BytestoreServer {
    config: ServerConfig,
    state: AppState,
}

impl BytestoreServer {
    /// Wrap an index that has already been opened (and rebuilt) by the caller.
    pub fn new(config: ServerConfig, index: Arc<ContainerIndex>) -> Self {
        let state = AppState::new(index, config.list_limit);
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the API router (useful for testing).
    pub fn api_router(&self) -> axum::Router {
        build_api_router(self.state.clone())
    }

    /// Build the public router (useful for testing).
    pub fn public_router(&self) -> axum::Router {
        build_public_router(self.state.clone())
    }

    /// Bind both listeners and serve until one of them fails.
    pub async fn serve(self) -> ServerResult<()> {
        let api_listener = TcpListener::bind(self.config.api_addr).await?;
        let public_listener = TcpListener::bind(self.config.public_addr).await?;
        tracing::info!(
            api = %self.config.api_addr,
            public = %self.config.public_addr,
            root = %self.config.root.display(),
            "bytestore server listening"
        );

        let api = axum::serve(api_listener, self.api_router());
        let public = axum::serve(public_listener, self.public_router());
        tokio::try_join!(async { api.await }, async { public.await })?;
        Ok(())
    }
}
