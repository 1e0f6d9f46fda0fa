//! Applies relayed mutations to the destination root.
//!
//! Every operation validates the target, performs the mutation, and reports
//! an [`Ack`] or a typed [`ApplyError`]. Nothing is held between calls.
//!
//! There is no locking: two requests touching the same path race at the
//! filesystem and the last write wins (or a write is partially overwritten).

use crate::config::DestinationRoot;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use tracing::{debug, info};
use treemirror_types::{Ack, ApplyError, ApplyResult, EntryKind, RelativePath};

#[derive(Debug, Clone)]
pub struct MutationApplier {
    root: DestinationRoot,
}

impl MutationApplier {
    pub fn new(root: DestinationRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &DestinationRoot {
        &self.root
    }

    /// Write `bytes` to `path`, creating parent directories and replacing any
    /// existing file.
    pub async fn save_file(&self, path: &RelativePath, bytes: &[u8]) -> ApplyResult<Ack> {
        let target = self.root.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ApplyError::storage(format!("failed to create parent directories for '{}'", path), e)
            })?;
        }

        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| ApplyError::storage(format!("failed to write '{}'", path), e))?;

        info!("Saved {} ({} bytes)", path, bytes.len());
        Ok(Ack::new(
            format!("File '{}' uploaded successfully", path.file_name()),
            vec![path.to_string()],
        ))
    }

    /// Remove whatever currently lives at `path`.
    ///
    /// Directories are removed recursively, files and symlinks singly. The
    /// decision is made from the destination's own metadata, never from what
    /// the client believed the entry was.
    pub async fn delete_entry(&self, path: &RelativePath) -> ApplyResult<Ack> {
        let target = self.root.resolve(path);
        let metadata = inspect(path, &target)
            .await?
            .ok_or_else(|| ApplyError::not_found(format!("'{}' does not exist", path)))?;

        let file_type = metadata.file_type();
        let removed = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| ApplyError::storage(format!("failed to delete directory '{}'", path), e))?;
            EntryKind::Directory
        } else if file_type.is_file() || file_type.is_symlink() {
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| ApplyError::storage(format!("failed to delete file '{}'", path), e))?;
            EntryKind::File
        } else {
            return Err(ApplyError::UnsupportedKind(path.to_string()));
        };

        info!("Deleted {} {}", removed, path);
        Ok(Ack::new(
            format!("Deleted {} '{}'", removed, path),
            vec![path.to_string()],
        ))
    }

    /// Move `from` to `to`, creating missing parents of `to`.
    ///
    /// With `expected == Directory` the source must be a directory; any
    /// other kind only requires the source to exist.
    pub async fn rename_entry(
        &self,
        from: &RelativePath,
        to: &RelativePath,
        expected: EntryKind,
    ) -> ApplyResult<Ack> {
        let source = self.root.resolve(from);
        let destination = self.root.resolve(to);

        let metadata = inspect(from, &source)
            .await?
            .ok_or_else(|| ApplyError::not_found(format!("'{}' does not exist", from)))?;
        if expected == EntryKind::Directory && !metadata.is_dir() {
            return Err(ApplyError::not_found(format!("'{}' is not a directory", from)));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ApplyError::storage(format!("failed to create parent directories for '{}'", to), e)
            })?;
        }

        tokio::fs::rename(&source, &destination).await.map_err(|e| {
            ApplyError::storage(format!("failed to rename '{}' to '{}'", from, to), e)
        })?;

        info!("Renamed {} -> {}", from, to);
        Ok(Ack::new(
            format!("Renamed '{}' to '{}'", from, to),
            vec![from.to_string(), to.to_string()],
        ))
    }

    /// Create `path` and any missing parents. Succeeds if it already exists
    /// as a directory; fails with a conflict if a non-directory is there.
    pub async fn create_directory(&self, path: &RelativePath) -> ApplyResult<Ack> {
        let target = self.root.resolve(path);
        match inspect(path, &target).await? {
            Some(metadata) if metadata.is_dir() => {
                debug!("Directory {} already exists", path);
                return Ok(Ack::new(
                    format!("Directory '{}' already exists", path),
                    vec![path.to_string()],
                ));
            }
            Some(_) => {
                return Err(ApplyError::conflict(format!(
                    "a file already exists at '{}'",
                    path
                )));
            }
            None => {}
        }

        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| ApplyError::storage(format!("failed to create directory '{}'", path), e))?;

        info!("Created directory {}", path);
        Ok(Ack::new(
            format!("Created directory '{}'", path),
            vec![path.to_string()],
        ))
    }
}

/// Metadata for `target` without following symlinks, or `None` if absent.
async fn inspect(path: &RelativePath, target: &Path) -> ApplyResult<Option<Metadata>> {
    match tokio::fs::symlink_metadata(target).await {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApplyError::storage(format!("failed to inspect '{}'", path), e)),
    }
}
