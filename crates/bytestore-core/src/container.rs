use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::id::{ContainerId, ObjectId};
use crate::layout;
use crate::meta::ObjectMeta;

#[derive(Default)]
struct ObjectTable {
    live: HashMap<ObjectId, ObjectMeta>,
    /// Evicted objects whose files are still being deleted.
    removing: HashSet<ObjectId>,
}

/// A named group of stored objects backed by one directory.
///
/// The object map is guarded by the container's own lock. File I/O happens
/// outside the lock, so concurrent writers to the same container proceed in
/// parallel and only contend on the map update.
pub struct Container {
    id: ContainerId,
    dir: PathBuf,
    objects: RwLock<ObjectTable>,
}

/// A payload being written for an object that has no sidecar or index
/// entry yet.
///
/// Created by [`Container::stage`], written through [`Write`], and finished
/// by [`Container::commit`]. Dropping it uncommitted deletes the partial
/// payload.
#[derive(Debug)]
pub struct StagedObject {
    meta: ObjectMeta,
    path: PathBuf,
    file: File,
    size: u64,
    committed: bool,
}

impl StagedObject {
    pub fn id(&self) -> ObjectId {
        self.meta.id
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Write for StagedObject {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match layout::remove_file_if_exists(&self.path) {
            Ok(()) => debug!(object = %self.meta.id, "abandoned payload discarded"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot discard abandoned payload"),
        }
    }
}

impl Container {
    /// Create an empty container handle for `dir`. Performs no I/O.
    pub fn new(id: ContainerId, dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            dir: dir.into(),
            objects: RwLock::new(ObjectTable::default()),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// The directory holding this container's payloads and sidecars.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").live.len()
    }

    /// Returns `true` if no objects are indexed.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").live.is_empty()
    }

    /// Where the payload of `object` lives. Pure path derivation.
    pub fn payload_path(&self, object: &ObjectId) -> PathBuf {
        layout::payload_path(&self.dir, object)
    }

    /// Where the metadata sidecar of `object` lives. Pure path derivation.
    pub fn meta_path(&self, object: &ObjectId) -> PathBuf {
        layout::sidecar_path(&self.dir, object)
    }

    fn files_exist(&self, object: &ObjectId) -> bool {
        self.payload_path(object).is_file() && self.meta_path(object).is_file()
    }

    /// Store a new object.
    ///
    /// The payload is streamed to `<id>.bin`, then the sidecar is written to
    /// `<id>.json`, then the record is indexed. There is no rollback: if the
    /// sidecar write fails the payload stays behind as an orphan with no
    /// index entry.
    pub fn add<R: Read + ?Sized>(
        &self,
        name: impl Into<String>,
        tag: impl Into<String>,
        payload: &mut R,
    ) -> StoreResult<ObjectMeta> {
        let mut staged = self.stage(name)?;
        io::copy(payload, &mut staged)?;
        self.commit(staged, tag)
    }

    /// Allocate a fresh object id and open its payload file for writing.
    ///
    /// Nothing is indexed until [`commit`](Self::commit). Lets a caller
    /// stream the payload before it knows the tag.
    pub fn stage(&self, name: impl Into<String>) -> StoreResult<StagedObject> {
        let meta = ObjectMeta::new(self.id, name, "");
        let path = self.payload_path(&meta.id);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(StagedObject {
            meta,
            path,
            file,
            size: 0,
            committed: false,
        })
    }

    /// Flush a staged payload, write its sidecar and index it.
    pub fn commit(
        &self,
        mut staged: StagedObject,
        tag: impl Into<String>,
    ) -> StoreResult<ObjectMeta> {
        if staged.meta.container_id != self.id {
            return Err(StoreError::NotOwned {
                object: staged.meta.id,
                container: self.id,
            });
        }
        staged.file.sync_all()?;
        // Payload is durable; any failure past this point leaves an orphan.
        staged.committed = true;

        let mut meta = staged.meta.clone();
        meta.tag = tag.into();

        let sidecar = meta.to_sidecar()?;
        let meta_path = self.meta_path(&meta.id);
        let temp = layout::temp_path(&meta_path);
        {
            let mut file = File::create(&temp)?;
            file.write_all(&sidecar)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &meta_path)?;

        self.objects
            .write()
            .expect("lock poisoned")
            .live
            .insert(meta.id, meta.clone());

        debug!(container = %self.id, object = %meta.id, size = staged.size, "object stored");
        Ok(meta)
    }

    /// Look up an indexed object.
    pub fn get(&self, object: &ObjectId) -> Option<ObjectMeta> {
        self.objects
            .read()
            .expect("lock poisoned")
            .live
            .get(object)
            .cloned()
    }

    /// Up to `limit` object ids, in no particular order.
    pub fn list(&self, limit: usize) -> Vec<ObjectId> {
        self.objects
            .read()
            .expect("lock poisoned")
            .live
            .keys()
            .take(limit)
            .copied()
            .collect()
    }

    /// Delete an object.
    ///
    /// The index entry is evicted first, then both files are removed. A file
    /// that is already gone counts as removed. If a deletion fails the entry
    /// stays evicted and the leftover file is reported by fsck. If the
    /// process dies between the two steps, the next rebuild re-indexes the
    /// object.
    pub fn remove(&self, meta: &ObjectMeta) -> StoreResult<()> {
        if meta.container_id != self.id {
            return Err(StoreError::NotOwned {
                object: meta.id,
                container: self.id,
            });
        }

        {
            let mut table = self.objects.write().expect("lock poisoned");
            if table.live.remove(&meta.id).is_none() {
                return Err(StoreError::ObjectNotFound(meta.id));
            }
            table.removing.insert(meta.id);
        }

        let payload = layout::remove_file_if_exists(&self.payload_path(&meta.id));
        let sidecar = layout::remove_file_if_exists(&self.meta_path(&meta.id));
        self.objects
            .write()
            .expect("lock poisoned")
            .removing
            .remove(&meta.id);
        payload?;
        sidecar?;

        debug!(container = %self.id, object = %meta.id, "object removed");
        Ok(())
    }

    /// Bring the object map in line with the container directory.
    ///
    /// Files with unparsable names are skipped. A sidecar that cannot be read
    /// or decoded, or that names a different object or container, is an
    /// error: the directory is not in a state the index can trust. Sidecars
    /// without a payload are reported and left unindexed; payloads without a
    /// sidecar are reported.
    ///
    /// Safe to run while the container is in use: the listing is merged into
    /// the live map, so objects added during the scan stay indexed and
    /// objects being removed are not brought back. Returns the number of
    /// indexed objects.
    pub fn rebuild_from_disk(&self) -> StoreResult<usize> {
        let listing = layout::list_dir(&self.dir)?;
        let mut found = HashMap::with_capacity(listing.sidecars.len());

        for (id, path) in &listing.sidecars {
            let meta = match layout::read_sidecar(path, id, &self.id) {
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(container = %self.id, object = %id, "sidecar removed during scan");
                    continue;
                }
                result => result?,
            };
            if !listing.payloads.contains_key(id) {
                warn!(container = %self.id, object = %id, "sidecar without payload; not indexed");
                continue;
            }
            found.insert(*id, meta);
        }

        for (id, path) in &listing.payloads {
            if !listing.sidecars.contains_key(id) {
                warn!(container = %self.id, path = %path.display(), "payload without sidecar");
            }
        }
        for path in listing.strays.iter().chain(&listing.temp_files) {
            warn!(container = %self.id, path = %path.display(), "skipping unrecognized entry");
        }

        let mut table = self.objects.write().expect("lock poisoned");
        let ObjectTable { live, removing } = &mut *table;
        live.retain(|id, _| found.contains_key(id) || self.files_exist(id));
        for (id, meta) in found {
            if removing.contains(&id) {
                continue;
            }
            // Listed files may have been removed since the scan.
            if !live.contains_key(&id) && !self.files_exist(&id) {
                continue;
            }
            live.insert(id, meta);
        }
        let count = live.len();
        drop(table);

        debug!(container = %self.id, objects = count, "container rebuilt");
        Ok(count)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("dir", &self.dir)
            .field("object_count", &self.len())
            .finish()
    }
}
