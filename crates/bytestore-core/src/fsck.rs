//! Offline consistency check of a store root.
//!
//! [`check`] only reads. It never fails on a bad sidecar: every problem is
//! recorded in the [`ConsistencyReport`] so an operator sees all of them at
//! once. [`prune`] deletes the files the report marks as safe to remove.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::StoreResult;
use crate::id::ContainerId;
use crate::layout;

/// Findings of a consistency check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Container directories examined.
    pub containers: usize,
    /// Objects with a payload and a valid sidecar.
    pub objects: usize,
    /// Payload files with no sidecar (e.g. an add interrupted after the
    /// payload write).
    pub orphan_payloads: Vec<PathBuf>,
    /// Sidecars with no payload (e.g. a remove interrupted halfway).
    pub orphan_sidecars: Vec<PathBuf>,
    /// Sidecars that cannot be decoded or describe another object, with the
    /// reason. These block startup and need manual attention.
    pub corrupt_sidecars: Vec<(PathBuf, String)>,
    /// Sidecars left half-written by an interrupted add.
    pub temp_files: Vec<PathBuf>,
    /// Entries the store does not recognize. Reported, never pruned.
    pub stray_entries: Vec<PathBuf>,
}

impl ConsistencyReport {
    /// Returns `true` if nothing needs attention.
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    /// Total number of findings.
    pub fn issue_count(&self) -> usize {
        self.orphan_payloads.len()
            + self.orphan_sidecars.len()
            + self.corrupt_sidecars.len()
            + self.temp_files.len()
            + self.stray_entries.len()
    }

    /// Files [`prune`] would delete.
    pub fn prunable(&self) -> impl Iterator<Item = &PathBuf> {
        self.orphan_payloads
            .iter()
            .chain(&self.orphan_sidecars)
            .chain(&self.temp_files)
    }
}

/// Scan every container directory under `root` and report inconsistencies.
pub fn check(root: &Path) -> StoreResult<ConsistencyReport> {
    let mut report = ConsistencyReport::default();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();

        let container = match entry.file_name().to_str().map(ContainerId::parse) {
            Some(Ok(id)) if entry.file_type().is_dir() => id,
            _ => {
                report.stray_entries.push(path.to_path_buf());
                continue;
            }
        };

        report.containers += 1;
        check_container(path, &container, &mut report)?;
    }

    info!(
        root = %root.display(),
        containers = report.containers,
        objects = report.objects,
        issues = report.issue_count(),
        "consistency check complete"
    );
    Ok(report)
}

fn check_container(
    dir: &Path,
    container: &ContainerId,
    report: &mut ConsistencyReport,
) -> StoreResult<()> {
    let listing = layout::list_dir(dir)?;

    for (id, path) in &listing.sidecars {
        if let Err(e) = layout::read_sidecar(path, id, container) {
            report.corrupt_sidecars.push((path.clone(), e.to_string()));
            continue;
        }
        if listing.payloads.contains_key(id) {
            report.objects += 1;
        } else {
            report.orphan_sidecars.push(path.clone());
        }
    }

    for (id, path) in listing.payloads {
        if !listing.sidecars.contains_key(&id) {
            report.orphan_payloads.push(path);
        }
    }
    report.temp_files.extend(listing.temp_files);
    report.stray_entries.extend(listing.strays);
    Ok(())
}

/// Delete orphan payloads, orphan sidecars and leftover temporary files.
///
/// Corrupt sidecars and stray entries are left alone. Returns the number of
/// files removed.
pub fn prune(report: &ConsistencyReport) -> StoreResult<usize> {
    let mut removed = 0;
    for path in report.prunable() {
        layout::remove_file_if_exists(path)?;
        debug!(path = %path.display(), "pruned");
        removed += 1;
    }
    info!(removed, "prune complete");
    Ok(removed)
}
