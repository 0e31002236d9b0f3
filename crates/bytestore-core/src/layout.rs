//! On-disk layout of a container directory.
//!
//! ```text
//! <root>/<container-id>/<object-id>.bin        payload bytes
//! <root>/<container-id>/<object-id>.json       metadata sidecar
//! <root>/<container-id>/<object-id>.json.tmp   sidecar being written
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::id::{ContainerId, ObjectId};
use crate::meta::ObjectMeta;

/// Extension of payload files.
pub const PAYLOAD_EXT: &str = "bin";
/// Extension of metadata sidecar files.
pub const SIDECAR_EXT: &str = "json";
/// Suffix appended to a sidecar while it is being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path of the payload file for `object` inside `dir`.
pub fn payload_path(dir: &Path, object: &ObjectId) -> PathBuf {
    dir.join(format!("{object}.{PAYLOAD_EXT}"))
}

/// Path of the metadata sidecar for `object` inside `dir`.
pub fn sidecar_path(dir: &Path, object: &ObjectId) -> PathBuf {
    dir.join(format!("{object}.{SIDECAR_EXT}"))
}

/// Path a sidecar is staged at before being renamed into place.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Classified contents of one container directory.
#[derive(Debug, Default)]
pub(crate) struct DirListing {
    pub sidecars: BTreeMap<ObjectId, PathBuf>,
    pub payloads: BTreeMap<ObjectId, PathBuf>,
    /// Leftover `*.tmp` files from interrupted writes.
    pub temp_files: Vec<PathBuf>,
    /// Everything else: unparsable names, unknown extensions, subdirectories.
    pub strays: Vec<PathBuf>,
}

/// Read and classify the immediate entries of a container directory.
pub(crate) fn list_dir(dir: &Path) -> io::Result<DirListing> {
    let mut listing = DirListing::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            listing.strays.push(path);
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            listing.strays.push(path);
            continue;
        };

        if name.ends_with(TEMP_SUFFIX) {
            listing.temp_files.push(path);
            continue;
        }

        let Some((stem, ext)) = name.rsplit_once('.') else {
            listing.strays.push(path);
            continue;
        };

        let target = match ext {
            PAYLOAD_EXT => &mut listing.payloads,
            SIDECAR_EXT => &mut listing.sidecars,
            _ => {
                listing.strays.push(path);
                continue;
            }
        };

        match ObjectId::parse(stem) {
            Ok(id) => {
                target.insert(id, path);
            }
            Err(_) => listing.strays.push(path),
        }
    }

    listing.temp_files.sort();
    listing.strays.sort();
    Ok(listing)
}

/// Read a sidecar and check it describes the object its location implies.
pub(crate) fn read_sidecar(
    path: &Path,
    expected_id: &ObjectId,
    container: &ContainerId,
) -> StoreResult<ObjectMeta> {
    let data = fs::read(path)?;
    let meta = ObjectMeta::from_sidecar(path, &data)?;

    if meta.id != *expected_id {
        return Err(StoreError::CorruptSidecar {
            path: path.to_path_buf(),
            reason: format!("records id {}, file name says {expected_id}", meta.id),
        });
    }
    if meta.container_id != *container {
        return Err(StoreError::CorruptSidecar {
            path: path.to_path_buf(),
            reason: format!(
                "records container {}, stored under {container}",
                meta.container_id
            ),
        });
    }
    Ok(meta)
}

/// Remove a file, treating an already-missing file as removed.
pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
