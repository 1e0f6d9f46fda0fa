//! Change operations produced by the watcher and consumed by the relay.

use crate::path::RelativePath;
use std::fmt;
use std::path::PathBuf;

/// What kind of filesystem entry an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    /// The platform could not say. Only produced for deletes, where the
    /// server decides by inspecting its own copy.
    Unknown,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
            EntryKind::Unknown => f.write_str("entry"),
        }
    }
}

/// A single change to replay on the server.
///
/// Each operation is delivered at most once; nothing is queued or retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    /// New entry. `source` is the absolute local path the content is read from.
    Create {
        path: RelativePath,
        kind: EntryKind,
        source: PathBuf,
    },
    /// Existing file rewritten.
    Modify {
        path: RelativePath,
        kind: EntryKind,
        source: PathBuf,
    },
    Delete {
        path: RelativePath,
        kind: EntryKind,
    },
    /// Rename or move within the watched root.
    Move {
        from: RelativePath,
        to: RelativePath,
        kind: EntryKind,
    },
}

impl ChangeOperation {
    pub fn kind(&self) -> EntryKind {
        match self {
            ChangeOperation::Create { kind, .. }
            | ChangeOperation::Modify { kind, .. }
            | ChangeOperation::Delete { kind, .. }
            | ChangeOperation::Move { kind, .. } => *kind,
        }
    }

    /// The path the operation acts on (the destination for moves).
    pub fn path(&self) -> &RelativePath {
        match self {
            ChangeOperation::Create { path, .. }
            | ChangeOperation::Modify { path, .. }
            | ChangeOperation::Delete { path, .. } => path,
            ChangeOperation::Move { to, .. } => to,
        }
    }

    /// Short tag used in log lines.
    pub fn action(&self) -> &'static str {
        match self {
            ChangeOperation::Create { .. } => "create",
            ChangeOperation::Modify { .. } => "modify",
            ChangeOperation::Delete { .. } => "delete",
            ChangeOperation::Move { .. } => "move",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Move { from, to, kind } => {
                write!(f, "move {} {} -> {}", kind, from, to)
            }
            other => write!(f, "{} {} {}", other.action(), other.kind(), other.path()),
        }
    }
}
