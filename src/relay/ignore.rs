//! Denylist of scratch/backup paths that must never be relayed.

use globset::{Glob, GlobSet, GlobSetBuilder};
use treemirror_types::RelativePath;

/// Editor swap, backup and temp-directory patterns applied unless disabled.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "*.swp",
    "*.swo",
    "*.swx",
    "*~",
    "*.tmp",
    "*.temp",
    "**/.#*",
    "**/~$*",
    "**/4913",
    "**/tmp",
    "**/tmp/**",
    "**/temp",
    "**/temp/**",
];

/// Compiled ignore patterns, matched against root-relative paths.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn with_defaults() -> Result<Self, globset::Error> {
        Self::new(DEFAULT_IGNORE_PATTERNS)
    }

    pub fn is_ignored(&self, path: &RelativePath) -> bool {
        self.set.is_match(path.as_str())
    }
}
