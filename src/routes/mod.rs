// HTTP status routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::queue::JobQueue;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) queue: Arc<dyn JobQueue>,
}

pub fn app(queue: Arc<dyn JobQueue>) -> Router {
    let state = AppState { queue };
    Router::new()
        .route("/", get(|| async { "rollupd: calendar rollup scheduler" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/jobs/{name}/delayed", get(http::delayed_jobs_handler)) // GET /jobs/{name}/delayed
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
