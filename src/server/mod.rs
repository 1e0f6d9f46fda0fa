//! Server side: the mutation applier and its HTTP surface.

pub mod applier;
pub mod handlers;

pub use applier::MutationApplier;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use treemirror_types::wire;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ServerState {
    pub applier: Arc<MutationApplier>,
}

/// Create a router for the mutation endpoints.
pub fn router(applier: Arc<MutationApplier>, max_upload_bytes: usize) -> Router {
    let state = ServerState { applier };

    Router::new()
        .route(wire::ROOT, get(handlers::root))
        .route(wire::HEALTH, get(handlers::health_check))
        .route(wire::UPLOAD_FILE, post(handlers::upload_file))
        .route(wire::DELETE_FILE, delete(handlers::delete_file))
        .route(wire::DELETE_DIRECTORY, delete(handlers::delete_directory))
        .route(wire::RENAME_FILE, put(handlers::rename_file))
        .route(wire::RENAME_DIRECTORY, put(handlers::rename_directory))
        .route(wire::CREATE_DIRECTORY, post(handlers::create_directory))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
