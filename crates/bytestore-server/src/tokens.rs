//! Single-use download tokens.
//!
//! A token maps an unguessable string to one stored object. It is valid
//! until a download through it succeeds or the process restarts. Tokens are
//! not persisted and carry no expiry.

use std::collections::HashMap;
use std::sync::Mutex;

use bytestore_core::{ContainerId, ObjectId};
use serde::{Deserialize, Serialize};

/// A download grant for one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    #[serde(rename = "FileId")]
    pub object_id: ObjectId,
    #[serde(rename = "ContainerId")]
    pub container_id: ContainerId,
    #[serde(rename = "Token")]
    pub token: String,
}

/// In-memory token table.
#[derive(Default)]
pub struct TokenRegistry {
    tokens: Mutex<HashMap<String, DownloadToken>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.tokens.lock().expect("token mutex poisoned").len()
    }

    /// Returns `true` if no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issue a new token for `object` in `container`.
    pub fn issue(&self, container_id: ContainerId, object_id: ObjectId) -> DownloadToken {
        let grant = DownloadToken {
            object_id,
            container_id,
            token: new_token(),
        };
        self.tokens
            .lock()
            .expect("token mutex poisoned")
            .insert(grant.token.clone(), grant.clone());
        grant
    }

    /// Remove and return the grant for `token`.
    ///
    /// Taking the grant out before serving makes two concurrent downloads
    /// with the same token impossible. Call [`restore`](Self::restore) if
    /// the download then fails.
    pub fn take(&self, token: &str) -> Option<DownloadToken> {
        self.tokens.lock().expect("token mutex poisoned").remove(token)
    }

    /// Put back a grant whose download did not complete.
    pub fn restore(&self, grant: DownloadToken) {
        self.tokens
            .lock()
            .expect("token mutex poisoned")
            .insert(grant.token.clone(), grant);
    }
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("outstanding", &self.len())
            .finish()
    }
}

/// 32 random bytes, hex-encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}
