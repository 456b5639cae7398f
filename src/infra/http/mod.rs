mod middleware;
mod render;
pub mod response;

use std::sync::Arc;

use axum::{Router, http::StatusCode, middleware as axum_middleware, routing::get};

use crate::application::score::ScoreRenderService;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub scores: Arc<ScoreRenderService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/render", get(render::render_score))
        .route("/_health/live", get(live_health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn live_health() -> StatusCode {
    StatusCode::NO_CONTENT
}
