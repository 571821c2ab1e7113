// UBI community directory backend
// Community records live in Postgres; beneficiary and funding metrics live in
// an external chain indexer keyed by contract address.

pub mod address;
pub mod assembler;
pub mod config;
pub mod decimal;
pub mod error;
pub mod filter;
pub mod geo;
pub mod governance;
pub mod handlers;
pub mod indexer;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod projection;
pub mod ranking;
pub mod service;
pub mod sort;
pub mod store;
pub mod sync;

use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::Directory;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<Directory>,
}

/// Builds the HTTP router over a ready directory.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/communities",
            get(handlers::list_communities).post(handlers::create_community),
        )
        .route("/api/communities/count", get(handlers::count_communities))
        .route(
            "/api/communities/:key",
            get(handlers::get_community)
                .put(handlers::update_community)
                .delete(handlers::remove_community),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
