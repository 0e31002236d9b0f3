use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::id::{ContainerId, ObjectId};

/// Metadata record of one stored object.
///
/// Serialized as the `<id>.json` sidecar next to the payload. The field
/// names are part of the on-disk format and must not change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(rename = "Id")]
    pub id: ObjectId,
    /// Caller-supplied display name. Not unique.
    #[serde(rename = "FileName")]
    pub name: String,
    #[serde(rename = "ContainerId")]
    pub container_id: ContainerId,
    /// Opaque caller-supplied tag.
    #[serde(rename = "Meta")]
    pub tag: String,
    #[serde(rename = "CreatedDate")]
    pub created_at: DateTime<Utc>,
}

impl ObjectMeta {
    /// Create a record for a new object with a fresh id, stamped now.
    pub fn new(container_id: ContainerId, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            container_id,
            tag: tag.into(),
            created_at: Utc::now(),
        }
    }

    /// Encode as sidecar file content.
    pub fn to_sidecar(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode sidecar file content read from `path`.
    pub fn from_sidecar(path: &Path, data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|e| StoreError::CorruptSidecar {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
