use std::sync::Arc;

use axum::{Router, middleware};

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

pub mod api;
pub mod media;
pub mod twilio;

/// All routes with state applied. Process-level layers (CORS, rate
/// limiting, security headers) are added by the binary.
///
/// Layer order on the media route (outer to inner): connection_limit -> handler
pub fn create_router(state: Arc<AppState>) -> Router {
    let media_routes = media::create_media_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    api::create_api_router()
        .merge(twilio::create_twilio_router())
        .merge(media_routes)
        .with_state(state)
}
