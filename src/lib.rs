//! Mirror a local directory tree to a remote destination over HTTP.
//!
//! The client half ([`relay`]) watches a source root and relays each change
//! as one HTTP request. The server half ([`server`]) applies those requests
//! to a destination root.

pub mod cli;
pub mod config;
pub mod relay;
pub mod server;
pub mod signal;

use axum::Router;
use config::DestinationRoot;
use server::MutationApplier;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use treemirror_types as types;

/// Configuration for creating a router.
pub struct RouterConfig {
    /// Validated destination root every request is resolved against.
    pub destination: DestinationRoot,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

/// Create the server router with request tracing.
pub fn create_router(config: RouterConfig) -> Router {
    let applier = Arc::new(MutationApplier::new(config.destination));
    server::router(applier, config.max_upload_bytes).layer(TraceLayer::new_for_http())
}
