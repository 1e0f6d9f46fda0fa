//! Turns raw `notify` events into [`ChangeOperation`]s.
//!
//! Paths are stripped to be root-relative and run through the ignore filter
//! before anything else. Deletes keep whatever kind the platform reported;
//! where it could not tell, the kind is [`EntryKind::Unknown`] and the server
//! decides from its own copy.
//!
//! Renames may arrive as separate `From` and `To` halves. The halves are
//! paired by tracker (or, without one, in arrival order). A `To` with no
//! partner is a move into the root and becomes a create. A `From` still
//! unpaired after [`RENAME_PAIR_WINDOW`] is a move out and becomes a delete.

use crate::relay::ignore::IgnoreFilter;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error};
use treemirror_types::{strip_path, ChangeOperation, EntryKind, PathError, RelativePath};

/// Result of reducing one absolute event path.
#[derive(Debug, PartialEq, Eq)]
enum Reduced {
    Tracked(RelativePath),
    Ignored,
    /// The root itself, or a path that could not be reduced.
    Outside,
}

/// How long a rename `From` half waits for its `To` partner.
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(250);

/// A rename source seen without its destination yet.
#[derive(Debug, Clone)]
struct PendingFrom {
    tracker: Option<usize>,
    path: PathBuf,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    root_name: String,
    filter: IgnoreFilter,
    pending: Vec<PendingFrom>,
    /// Trackers already turned into a move from their halves; the combined
    /// `Both` event that follows is skipped.
    paired: Vec<(usize, Instant)>,
}

impl EventClassifier {
    pub fn new(root_name: impl Into<String>, filter: IgnoreFilter) -> Self {
        Self {
            root_name: root_name.into(),
            filter,
            pending: Vec::new(),
            paired: Vec::new(),
        }
    }

    pub fn classify(&mut self, event: &Event) -> Vec<ChangeOperation> {
        self.classify_at(event, Instant::now())
    }

    /// Classify `event` as if it arrived at `now`.
    pub fn classify_at(&mut self, event: &Event, now: Instant) -> Vec<ChangeOperation> {
        self.paired.retain(|(_, deadline)| *deadline > now);
        let mut ops = Vec::new();
        match event.kind {
            EventKind::Create(create_kind) => {
                for path in &event.paths {
                    if let Reduced::Tracked(rel) = self.reduce(path) {
                        let kind = match create_kind {
                            CreateKind::File => EntryKind::File,
                            CreateKind::Folder => EntryKind::Directory,
                            _ => kind_on_disk(path),
                        };
                        ops.push(ChangeOperation::Create {
                            path: rel,
                            kind,
                            source: path.clone(),
                        });
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.classify_rename(mode, event, now, &mut ops)
            }
            // Metadata-only changes (permissions, atime) carry no content.
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Modify(_) => {
                for path in &event.paths {
                    // Directory modify events fire for unrelated changes beneath them.
                    if path.is_dir() {
                        continue;
                    }
                    if let Reduced::Tracked(rel) = self.reduce(path) {
                        ops.push(ChangeOperation::Modify {
                            path: rel,
                            kind: EntryKind::File,
                            source: path.clone(),
                        });
                    }
                }
            }
            EventKind::Remove(remove_kind) => {
                let kind = match remove_kind {
                    RemoveKind::File => EntryKind::File,
                    RemoveKind::Folder => EntryKind::Directory,
                    _ => EntryKind::Unknown,
                };
                for path in &event.paths {
                    if let Reduced::Tracked(rel) = self.reduce(path) {
                        ops.push(ChangeOperation::Delete { path: rel, kind });
                    }
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }

        for op in &ops {
            debug!("Classified {:?} as {}", event.kind, op);
        }
        ops
    }

    /// Earliest moment an unpaired `From` half will expire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Turn every `From` half whose window has passed into a delete.
    pub fn expire_pending(&mut self, now: Instant) -> Vec<ChangeOperation> {
        self.paired.retain(|(_, deadline)| *deadline > now);
        let (expired, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.deadline <= now);
        self.pending = waiting;
        self.moved_out(expired)
    }

    /// Turn every outstanding `From` half into a delete, regardless of age.
    pub fn drain_pending(&mut self) -> Vec<ChangeOperation> {
        self.paired.clear();
        let pending = std::mem::take(&mut self.pending);
        self.moved_out(pending)
    }

    fn moved_out(&self, halves: Vec<PendingFrom>) -> Vec<ChangeOperation> {
        let mut ops = Vec::new();
        for half in halves {
            if let Reduced::Tracked(path) = self.reduce(&half.path) {
                debug!("Unpaired rename source {}, treating as moved out", path);
                ops.push(ChangeOperation::Delete {
                    path,
                    kind: EntryKind::Unknown,
                });
            }
        }
        ops
    }

    fn classify_rename(
        &mut self,
        mode: RenameMode,
        event: &Event,
        now: Instant,
        ops: &mut Vec<ChangeOperation>,
    ) {
        let tracker = event.attrs.tracker();
        match mode {
            RenameMode::Both => {
                let [from_abs, to_abs] = match event.paths.as_slice() {
                    [from, to] => [from, to],
                    other => {
                        debug!("Rename event with {} paths, skipping", other.len());
                        return;
                    }
                };
                if let Some(t) = tracker {
                    if let Some(i) = self.paired.iter().position(|(p, _)| *p == t) {
                        self.paired.remove(i);
                        return;
                    }
                    self.pending.retain(|p| p.tracker != Some(t));
                }
                self.classify_move(from_abs, to_abs, ops);
            }
            RenameMode::From => {
                for path in &event.paths {
                    self.pending.push(PendingFrom {
                        tracker,
                        path: path.clone(),
                        deadline: now + RENAME_PAIR_WINDOW,
                    });
                }
            }
            RenameMode::To => {
                for path in &event.paths {
                    match self.pending.iter().position(|p| p.tracker == tracker) {
                        Some(i) => {
                            let from = self.pending.remove(i);
                            if let Some(t) = tracker {
                                self.paired.push((t, now + RENAME_PAIR_WINDOW));
                            }
                            self.classify_move(&from.path, path, ops);
                        }
                        None => {
                            // Moved in from outside the watched root.
                            if let Reduced::Tracked(rel) = self.reduce(path) {
                                ops.push(ChangeOperation::Create {
                                    path: rel,
                                    kind: kind_on_disk(path),
                                    source: path.clone(),
                                });
                            }
                        }
                    }
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in &event.paths {
                    let Reduced::Tracked(rel) = self.reduce(path) else {
                        continue;
                    };
                    if path.exists() {
                        ops.push(ChangeOperation::Create {
                            path: rel,
                            kind: kind_on_disk(path),
                            source: path.clone(),
                        });
                    } else {
                        ops.push(ChangeOperation::Delete {
                            path: rel,
                            kind: EntryKind::Unknown,
                        });
                    }
                }
            }
        }
    }

    fn classify_move(&self, from_abs: &Path, to_abs: &Path, ops: &mut Vec<ChangeOperation>) {
        let kind = kind_on_disk(to_abs);
        match (self.reduce(from_abs), self.reduce(to_abs)) {
            (Reduced::Tracked(from), Reduced::Tracked(to)) => {
                ops.push(ChangeOperation::Move { from, to, kind });
            }
            // Scratch file renamed over a real one (atomic save).
            (_, Reduced::Tracked(to)) => {
                ops.push(ChangeOperation::Create {
                    path: to,
                    kind,
                    source: to_abs.to_path_buf(),
                });
            }
            // Real file renamed to a backup/scratch name.
            (Reduced::Tracked(from), _) => {
                ops.push(ChangeOperation::Delete { path: from, kind });
            }
            _ => {}
        }
    }

    fn reduce(&self, path: &Path) -> Reduced {
        match strip_path(path, &self.root_name) {
            Ok(rel) if self.filter.is_ignored(&rel) => {
                debug!("Ignoring {}", rel);
                Reduced::Ignored
            }
            Ok(rel) => Reduced::Tracked(rel),
            Err(PathError::Empty) => Reduced::Outside,
            Err(e) => {
                error!("Dropping event for {}: {}", path.display(), e);
                Reduced::Outside
            }
        }
    }
}

fn kind_on_disk(path: &Path) -> EntryKind {
    if path.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}
