pub mod auth;
pub mod endpoints;
pub mod error;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use crate::core::context::Context;

pub fn router(ctx: Arc<Context>) -> Router {
    Router::new()
        .route("/health", get(endpoints::health::handler))
        .route("/list", get(endpoints::list::handler))
        .route("/files/{file_id}/content", get(endpoints::read::handler))
        .route("/write", post(endpoints::write::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
