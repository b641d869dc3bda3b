//! Local artifact collection and content hashing

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::validate_artifact_path;
use crate::error::{Error, Result};

/// A local file queued for upload at a run-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingArtifact {
    pub source: PathBuf,
    pub path: String,
}

/// Expand a local file or directory into the files to store.
///
/// The entry named by `local_path` keeps its base name and lands below
/// `artifact_path` (or the artifact root); directories keep their layout.
pub(crate) fn collect_artifact_files(
    local_path: &Path,
    artifact_path: Option<&str>,
) -> Result<Vec<PendingArtifact>> {
    if let Some(prefix) = artifact_path {
        validate_artifact_path(prefix)?;
    }
    let resolved = fs::canonicalize(local_path).map_err(|e| Error::artifact_io(local_path, e))?;
    // A symlink keeps its own name; `.` and `..` take the resolved directory's.
    let base = local_path
        .file_name()
        .or_else(|| resolved.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::InvalidKey(format!("{} has no file name", local_path.display()))
        })?;
    let prefix = match artifact_path {
        Some(prefix) => format!("{prefix}/{base}"),
        None => base,
    };

    let metadata = fs::metadata(&resolved).map_err(|e| Error::artifact_io(local_path, e))?;
    let pending = if metadata.is_dir() {
        walk_files(&resolved)
            .map_err(|e| Error::artifact_io(local_path, e))?
            .into_iter()
            .map(|(relative, source)| PendingArtifact {
                source,
                path: format!("{prefix}/{relative}"),
            })
            .collect()
    } else {
        vec![PendingArtifact {
            source: resolved,
            path: prefix,
        }]
    };

    for artifact in &pending {
        validate_artifact_path(&artifact.path)?;
    }
    Ok(pending)
}

/// Every regular file below `dir`, as (`/`-joined relative path, absolute path), sorted.
fn walk_files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![(String::new(), dir.to_path_buf())];
    while let Some((prefix, current)) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let path = entry.path();
            if fs::metadata(&path)?.is_dir() {
                pending.push((relative, path));
            } else {
                files.push((relative, path));
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read an artifact source file.
pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::artifact_io(path, e))
}

/// `sha256:<hex>` digest of artifact content.
pub(crate) fn cas_hash(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}
