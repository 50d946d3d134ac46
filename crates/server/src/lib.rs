//! Engine host: runs a UCI engine per HTTP request and streams its output.

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;

pub fn app(config: Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/engine/analyse", post(routes::analyse::analyse))
        .layer(Extension(Arc::new(config)))
        .layer(cors)
}
