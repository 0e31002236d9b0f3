use std::path::PathBuf;

use crate::id::{ContainerId, ObjectId};

/// Errors from storage engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested container is not in the index.
    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// The requested object is not in the container's index.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The object belongs to a different container than the one addressed.
    #[error("object {object} is not in container {container}")]
    NotOwned {
        object: ObjectId,
        container: ContainerId,
    },

    /// Text that is not a canonical identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    /// A metadata sidecar could not be decoded or contradicts its location.
    #[error("corrupt sidecar {path:?}: {reason}")]
    CorruptSidecar { path: PathBuf, reason: String },

    /// Serialization failure while encoding a sidecar.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for failures caused by the caller's request (unknown
    /// or malformed identifiers, ownership mismatch) rather than by the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound(_)
                | Self::ObjectNotFound(_)
                | Self::NotOwned { .. }
                | Self::InvalidId(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
