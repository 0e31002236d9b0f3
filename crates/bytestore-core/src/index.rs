use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::container::Container;
use crate::error::{StoreError, StoreResult};
use crate::id::ContainerId;

/// Outcome of [`ContainerIndex::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Indexed containers whose directory no longer exists.
    pub containers_evicted: usize,
    /// Container directories found on disk that were not indexed.
    pub containers_added: usize,
    /// Objects indexed across all containers after the pass.
    pub objects_indexed: usize,
}

/// In-memory index of all containers under one store root.
///
/// The container map is guarded by a single lock that is never held while
/// a container's own lock is taken. Handles returned by [`get`] and
/// [`get_or_create`] are shared `Arc`s and need no index lock once obtained.
///
/// [`get`]: ContainerIndex::get
/// [`get_or_create`]: ContainerIndex::get_or_create
pub struct ContainerIndex {
    root: PathBuf,
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
}

impl ContainerIndex {
    /// Create an empty index over `root`. Performs no I/O.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Startup entry point: create the root if absent, then rebuild the
    /// index from what is on disk.
    ///
    /// Any error here means the index cannot be trusted and the caller
    /// should not start serving.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let index = Self::new(root);
        fs::create_dir_all(&index.root)?;
        index.rebuild_from_disk()?;
        Ok(index)
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of indexed containers.
    pub fn len(&self) -> usize {
        self.containers.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no containers are indexed.
    pub fn is_empty(&self) -> bool {
        self.containers.read().expect("lock poisoned").is_empty()
    }

    fn container_dir(&self, id: &ContainerId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Look up a container. Never creates one.
    pub fn get(&self, id: &ContainerId) -> Option<Arc<Container>> {
        self.containers.read().expect("lock poisoned").get(id).cloned()
    }

    /// Return the container for `id`, creating it and its directory if it
    /// is not indexed yet. Concurrent callers for the same id receive the
    /// same instance.
    pub fn get_or_create(&self, id: ContainerId) -> StoreResult<Arc<Container>> {
        if let Some(container) = self.get(&id) {
            return Ok(container);
        }

        // Container directories are only created or removed under the write
        // lock, so an indexed container always has its directory.
        let mut map = self.containers.write().expect("lock poisoned");
        if let Some(container) = map.get(&id) {
            return Ok(Arc::clone(container));
        }
        let dir = self.container_dir(&id);
        fs::create_dir_all(&dir)?;
        let container = Arc::new(Container::new(id, dir));
        map.insert(id, Arc::clone(&container));
        debug!(container = %id, "container created");
        Ok(container)
    }

    /// Up to `limit` container ids, in no particular order.
    pub fn list(&self, limit: usize) -> Vec<ContainerId> {
        self.containers
            .read()
            .expect("lock poisoned")
            .keys()
            .take(limit)
            .copied()
            .collect()
    }

    /// Delete a container and everything in it.
    ///
    /// The index entry is evicted first, then the directory is removed
    /// recursively. A directory that is already gone counts as removed.
    /// Both steps happen under the write lock so a concurrent
    /// [`get_or_create`](Self::get_or_create) for the same id waits and then
    /// starts from an empty directory.
    pub fn delete_container(&self, id: &ContainerId) -> StoreResult<()> {
        let mut map = self.containers.write().expect("lock poisoned");
        let Some(container) = map.remove(id) else {
            return Err(StoreError::ContainerNotFound(*id));
        };

        match fs::remove_dir_all(container.dir()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        drop(map);

        info!(container = %id, "container deleted");
        Ok(())
    }

    /// Replace the index with the containers found under the root.
    ///
    /// Every subdirectory whose name is a container id is registered and
    /// rebuilt. Entries with other names are skipped. Failure to read the
    /// root or any container is returned.
    pub fn rebuild_from_disk(&self) -> StoreResult<()> {
        let mut containers = HashMap::new();
        let mut objects = 0;

        for (id, dir) in self.scan_root()? {
            let container = Container::new(id, dir);
            objects += container.rebuild_from_disk()?;
            containers.insert(id, Arc::new(container));
        }

        info!(
            root = %self.root.display(),
            containers = containers.len(),
            objects,
            "index rebuilt from disk"
        );
        *self.containers.write().expect("lock poisoned") = containers;
        Ok(())
    }

    /// Bring a live index back in line with the disk.
    ///
    /// Unlike [`rebuild_from_disk`](Self::rebuild_from_disk), existing
    /// container handles are kept and refreshed in place, so callers holding
    /// them observe the reconciled state. Containers created or deleted
    /// while the pass runs are left as those calls made them.
    pub fn reconcile(&self) -> StoreResult<ReconcileSummary> {
        let on_disk: HashMap<ContainerId, PathBuf> = self.scan_root()?.into_iter().collect();

        let current: Vec<(ContainerId, Arc<Container>)> = self
            .containers
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(id, c)| (*id, Arc::clone(c)))
            .collect();

        let mut vanished = Vec::new();
        for (id, container) in &current {
            if !on_disk.contains_key(id) {
                vanished.push(*id);
                continue;
            }
            match container.rebuild_from_disk() {
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    vanished.push(*id)
                }
                result => {
                    result?;
                }
            }
        }

        let mut discovered = Vec::new();
        for (id, dir) in on_disk {
            if current.iter().any(|(known, _)| *known == id) {
                continue;
            }
            let container = Container::new(id, dir);
            match container.rebuild_from_disk() {
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                result => {
                    result?;
                }
            }
            discovered.push(Arc::new(container));
        }

        let mut summary = ReconcileSummary::default();
        let mut map = self.containers.write().expect("lock poisoned");
        for id in vanished {
            // Re-check under the lock: the id may have been re-created since
            // the scan.
            if !self.container_dir(&id).is_dir() && map.remove(&id).is_some() {
                summary.containers_evicted += 1;
            }
        }
        for container in discovered {
            if !container.dir().is_dir() {
                continue;
            }
            if let Entry::Vacant(slot) = map.entry(container.id()) {
                slot.insert(container);
                summary.containers_added += 1;
            }
        }
        let live: Vec<Arc<Container>> = map.values().cloned().collect();
        drop(map);

        summary.objects_indexed = live.iter().map(|c| c.len()).sum();
        info!(?summary, "index reconciled");
        Ok(summary)
    }

    /// Container directories directly under the root.
    fn scan_root(&self) -> StoreResult<Vec<(ContainerId, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_dir() {
                warn!(path = %path.display(), "skipping non-directory in store root");
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(ContainerId::parse) {
                Some(Ok(id)) => found.push((id, path)),
                _ => warn!(path = %path.display(), "skipping directory with invalid container id"),
            }
        }
        Ok(found)
    }
}

impl std::fmt::Debug for ContainerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerIndex")
            .field("root", &self.root)
            .field("container_count", &self.len())
            .finish()
    }
}
