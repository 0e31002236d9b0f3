use std::sync::Arc;

use bytestore_core::ContainerIndex;

use crate::tokens::TokenRegistry;

/// Shared state handed to every request handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub index: Arc<ContainerIndex>,
    pub tokens: Arc<TokenRegistry>,
    /// Cap on ids returned by listing endpoints.
    pub list_limit: usize,
}

impl AppState {
    pub fn new(index: Arc<ContainerIndex>, list_limit: usize) -> Self {
        Self {
            index,
            tokens: Arc::new(TokenRegistry::new()),
            list_limit,
        }
    }
}
