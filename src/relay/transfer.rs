//! Transfer-strategy selection for file uploads.
//!
//! The declared Content-Length of an upload must match the bytes actually
//! streamed even while the source is being rewritten. Small files are read
//! whole into memory; the buffer is what gets sent. Files at or above the
//! threshold are first copied to a private scratch directory (keeping the
//! modification time) and the copy is streamed instead. The scratch directory
//! is removed when the payload is dropped, whether or not the send succeeded.

use reqwest::multipart::Part;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use tracing::debug;

/// Files of this many bytes or more are staged (10,000 bytes).
pub const DEFAULT_THRESHOLD: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Whole file read into a buffer.
    InMemory,
    /// File copied to a scratch location and the copy streamed.
    Staged,
}

impl TransferStrategy {
    pub fn select(size: u64, threshold: u64) -> Self {
        if size < threshold {
            TransferStrategy::InMemory
        } else {
            TransferStrategy::Staged
        }
    }
}

/// A private snapshot of a source file.
#[derive(Debug)]
pub struct StagedCopy {
    scratch: TempDir,
    path: PathBuf,
    len: u64,
}

impl StagedCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Bytes ready to upload, fixed at preparation time.
#[derive(Debug)]
pub enum Payload {
    InMemory(Vec<u8>),
    Staged(StagedCopy),
}

impl Payload {
    /// Snapshot `source` using the strategy its current size calls for.
    pub async fn prepare(source: &Path, threshold: u64) -> io::Result<Self> {
        let size = tokio::fs::metadata(source).await?.len();
        match TransferStrategy::select(size, threshold) {
            TransferStrategy::InMemory => {
                let bytes = tokio::fs::read(source).await?;
                debug!(
                    "Read {} into memory ({} bytes)",
                    source.display(),
                    bytes.len()
                );
                Ok(Payload::InMemory(bytes))
            }
            TransferStrategy::Staged => {
                let source = source.to_path_buf();
                let staged = tokio::task::spawn_blocking(move || stage_copy(&source))
                    .await
                    .map_err(io::Error::other)??;
                debug!(
                    "Staged {} bytes at {}",
                    staged.len,
                    staged.path.display()
                );
                Ok(Payload::Staged(staged))
            }
        }
    }

    pub fn strategy(&self) -> TransferStrategy {
        match self {
            Payload::InMemory(_) => TransferStrategy::InMemory,
            Payload::Staged(_) => TransferStrategy::Staged,
        }
    }

    /// Number of bytes that will be sent.
    pub fn len(&self) -> u64 {
        match self {
            Payload::InMemory(bytes) => bytes.len() as u64,
            Payload::Staged(copy) => copy.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the multipart part for this payload.
    ///
    /// For staged payloads the returned [`StagedCopy`] must be held until the
    /// request has completed; dropping it deletes the scratch copy.
    pub async fn into_part(self, file_name: &str) -> io::Result<(Part, Option<StagedCopy>)> {
        match self {
            Payload::InMemory(bytes) => {
                Ok((Part::bytes(bytes).file_name(file_name.to_string()), None))
            }
            Payload::Staged(copy) => {
                let file = tokio::fs::File::open(&copy.path).await?;
                let part = Part::stream_with_length(reqwest::Body::from(file), copy.len)
                    .file_name(file_name.to_string());
                Ok((part, Some(copy)))
            }
        }
    }
}

fn stage_copy(source: &Path) -> io::Result<StagedCopy> {
    let scratch = tempfile::Builder::new()
        .prefix("treemirror-stage-")
        .tempdir()?;
    let name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "staged".into());
    let path = scratch.path().join(name);

    let modified = std::fs::metadata(source)?.modified()?;
    std::fs::copy(source, &path)?;

    if let Err(e) = preserve_modified(&path, modified) {
        debug!(
            "Could not preserve modification time on {}: {}",
            path.display(),
            e
        );
    }
    let len = std::fs::metadata(&path)?.len();

    Ok(StagedCopy { scratch, path, len })
}

fn preserve_modified(path: &Path, modified: SystemTime) -> io::Result<()> {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)?
        .set_modified(modified)
}
