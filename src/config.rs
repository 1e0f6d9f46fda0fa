//! Startup configuration for both sides.
//!
//! The client merges CLI flags over an optional JSON file over built-in
//! defaults. Both sides validate their directory before accepting traffic.

use crate::cli::{ClientArgs, ServerArgs};
use crate::relay::ignore::{IgnoreFilter, DEFAULT_IGNORE_PATTERNS};
use crate::relay::transfer::DEFAULT_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use treemirror_types::RelativePath;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Default multipart body limit for uploads (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("directory at \"{0}\" cannot be found")]
    NotFound(PathBuf),

    #[error("\"{0}\" is not a directory")]
    NotADirectory(PathBuf),

    #[error("cannot stat \"{path}\": {source}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no read permissions for directory at \"{path}\": {source}")]
    NotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no write permissions for directory at \"{path}\": {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("watched root {0} has no usable base name")]
    UnnamedRoot(PathBuf),
}

/// Check that `path` is an existing, readable, writable directory.
///
/// Returns the canonicalized path. Writability is checked by creating and
/// removing a scratch file inside the directory.
pub fn validate_directory(path: &Path) -> Result<PathBuf, ConfigError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ConfigError::Inaccessible {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory(path.to_path_buf()));
    }

    std::fs::read_dir(path).map_err(|source| ConfigError::NotReadable {
        path: path.to_path_buf(),
        source,
    })?;

    tempfile::Builder::new()
        .prefix(".treemirror-write-check-")
        .tempfile_in(path)
        .map_err(|source| ConfigError::NotWritable {
            path: path.to_path_buf(),
            source,
        })?;

    path.canonicalize()
        .map_err(|source| ConfigError::Inaccessible {
            path: path.to_path_buf(),
            source,
        })
}

/// Server-side root that every relative path is resolved against.
///
/// Only constructible through validation.
#[derive(Debug, Clone)]
pub struct DestinationRoot {
    path: PathBuf,
}

impl DestinationRoot {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = validate_directory(path.as_ref())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolve(&self, relative: &RelativePath) -> PathBuf {
        relative.resolve(&self.path)
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub destination: DestinationRoot,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        Ok(Self {
            destination: DestinationRoot::new(&args.path)?,
            host: args.host,
            port: args.port,
            max_upload_bytes: args.max_upload_bytes,
        })
    }
}

/// Optional JSON config file for the client. Every field may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ignores: Option<bool>,
}

impl ClientConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Canonicalized watched root.
    pub root: PathBuf,
    /// Base name of the watched root, used to strip event paths.
    pub root_name: String,
    pub server_url: String,
    pub threshold: u64,
    pub ignore_patterns: Vec<String>,
}

impl ClientConfig {
    /// Merge CLI flags over the config file (if any) over defaults, and
    /// validate the watched root.
    pub fn resolve(args: ClientArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => ClientConfigFile::load(path)?,
            None => ClientConfigFile::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: ClientArgs, file: ClientConfigFile) -> Result<Self, ConfigError> {
        let root = validate_directory(&args.path)?;
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ConfigError::UnnamedRoot(root.clone()))?;

        let server_url = args
            .server
            .or(file.server)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let threshold = args.threshold.or(file.threshold).unwrap_or(DEFAULT_THRESHOLD);

        let use_defaults = !args.no_default_ignores && file.default_ignores.unwrap_or(true);
        let mut ignore_patterns: Vec<String> = if use_defaults {
            DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
        } else {
            Vec::new()
        };
        ignore_patterns.extend(file.ignore);
        ignore_patterns.extend(args.ignore);

        let config = Self {
            root,
            root_name,
            server_url,
            threshold,
            ignore_patterns,
        };
        // Surface bad globs at startup rather than on the first event.
        config.ignore_filter()?;
        Ok(config)
    }

    pub fn ignore_filter(&self) -> Result<IgnoreFilter, ConfigError> {
        Ok(IgnoreFilter::new(&self.ignore_patterns)?)
    }
}
