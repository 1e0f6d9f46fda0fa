//! Root-relative paths.
//!
//! A [`RelativePath`] is the only identifier that crosses the wire. It is
//! always stored with `/` separators so client and server agree regardless of
//! OS, and it can never name the root itself or escape it.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A non-empty path relative to the watched or destination root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Parse a wire-format path.
    ///
    /// Segments are `/`-separated; empty and `.` segments are dropped.
    /// Absolute paths and `..` segments are rejected. On Windows a backslash
    /// is also a separator and a drive prefix counts as absolute; elsewhere
    /// both are ordinary filename characters.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        #[cfg(windows)]
        let normalized = raw.replace('\\', "/");
        #[cfg(not(windows))]
        let normalized = raw;

        if normalized.starts_with('/') {
            return Err(PathError::Absolute(raw.to_string()));
        }

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            validate_segment(segment, raw)?;
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Build a path from already-split segments, such as the components of
    /// a local path. Each segment is checked on its own and kept verbatim.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() || segment == "." || segment.contains('/') {
                return Err(PathError::Absolute(segment.to_string()));
            }
            validate_segment(segment, segment)?;
            if !joined.is_empty() {
                joined.push('/');
            }
            joined.push_str(segment);
        }

        if joined.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Final segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Parent path, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<RelativePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| RelativePath(parent.to_string()))
    }

    /// True if `self` is `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &RelativePath) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with('/'))
    }

    /// Resolve against a root directory using the platform separator.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in self.segments() {
            out.push(segment);
        }
        out
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

fn validate_segment(segment: &str, raw: &str) -> Result<(), PathError> {
    if segment == ".." {
        return Err(PathError::ParentSegment(raw.to_string()));
    }
    #[cfg(windows)]
    if segment.contains('\\') || (segment.len() == 2 && segment.ends_with(':')) {
        return Err(PathError::Absolute(raw.to_string()));
    }
    Ok(())
}

/// Reduce an absolute path to the part below the watched root.
///
/// `root_name` is the base name of the watched root. The first segment equal
/// to it is taken as the root and every later segment is returned. If the
/// root's name also appears deeper in the tree the first match still wins;
/// watching a root whose name recurs in its own ancestry is not supported.
///
/// Returns [`PathError::Empty`] when `absolute` is the root itself and
/// [`PathError::RootNotInPath`] when the name never appears.
pub fn strip_path(absolute: &Path, root_name: &str) -> Result<RelativePath, PathError> {
    let mut components = absolute.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy()),
        _ => None,
    });

    if !components.any(|c| c == root_name) {
        return Err(PathError::RootNotInPath {
            root: root_name.to_string(),
            path: absolute.display().to_string(),
        });
    }

    let rest: Vec<_> = components.collect();
    if rest.is_empty() {
        return Err(PathError::Empty);
    }
    RelativePath::from_segments(rest)
}
