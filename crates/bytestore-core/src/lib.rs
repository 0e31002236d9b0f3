//! Filesystem-backed object storage engine.
//!
//! Payloads are grouped into containers. Each container is one directory
//! under the store root; each object is a payload file plus a JSON metadata
//! sidecar sharing its basename:
//!
//! ```text
//! <root>/<container-id>/<object-id>.bin
//! <root>/<container-id>/<object-id>.json
//! ```
//!
//! # Key Types
//!
//! - [`ContainerIndex`] -- in-memory map of all containers, rebuilt from disk
//!   at startup
//! - [`Container`] -- in-memory map of one container's objects
//! - [`ObjectMeta`] -- metadata record stored in the sidecar
//! - [`ConsistencyReport`] -- findings of the offline [`fsck::check`]
//!
//! # Design Rules
//!
//! 1. Disk is the source of truth; the index is a rebuildable cache.
//! 2. Adds write the payload, then the sidecar, then the index entry.
//! 3. Deletes evict the index entry, then remove the files.
//! 4. The index lock and a container's lock are never held together.
//! 5. Container directories are created and removed only under the index
//!    lock.
//! 6. Failures while rebuilding are returned so startup can abort; failures
//!    during normal operations are returned to the caller.

pub mod container;
pub mod error;
pub mod fsck;
pub mod id;
pub mod index;
pub mod layout;
pub mod meta;

// Re-export primary types at crate root for ergonomic imports.
pub use container::{Container, StagedObject};
pub use error::{StoreError, StoreResult};
pub use fsck::ConsistencyReport;
pub use id::{ContainerId, ObjectId};
pub use index::{ContainerIndex, ReconcileSummary};
pub use meta::ObjectMeta;
