//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /media-stream?callSid=CA...` - WebSocket upgrade for the carrier's
/// bidirectional audio stream. A missing or blank `callSid` is accepted and
/// immediately closed with a policy-violation close frame.
///
/// Frames are relayed as opaque payloads in both directions.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
