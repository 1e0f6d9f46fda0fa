//! Client side: watch a source tree and relay each change to the server.

pub mod classify;
pub mod client;
pub mod ignore;
pub mod transfer;
pub mod watcher;

pub use classify::EventClassifier;
pub use client::{RelayClient, RelayOutcome};
pub use ignore::IgnoreFilter;
pub use transfer::{Payload, TransferStrategy};
pub use watcher::{relay_events, watch_and_relay, RelayStats};

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;
use treemirror_types::PathError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    #[error("failed to prepare {path} for upload: {source}")]
    Transfer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
