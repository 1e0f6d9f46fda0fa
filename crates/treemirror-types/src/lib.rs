//! Shared types for the treemirror client and server.
//!
//! Everything that crosses the HTTP boundary lives here: root-relative paths,
//! the change operations produced by the watcher, the error taxonomy, and the
//! JSON/form payloads exchanged with the server.

pub mod change;
pub mod error;
pub mod path;
pub mod wire;

pub use change::{ChangeOperation, EntryKind};
pub use error::{ApplyError, ApplyResult, PathError};
pub use path::{strip_path, RelativePath};
pub use wire::{Ack, ErrorDetail, Greeting, RenameForm, SubPathForm};
