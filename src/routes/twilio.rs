use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::twilio;
use crate::state::AppState;
use std::sync::Arc;

/// Create the carrier webhook router
///
/// - `POST /twilio/voice` - answers with media stream instructions
/// - `POST /twilio/voice/status` - call status callbacks
pub fn create_twilio_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/twilio/voice", post(twilio::voice_webhook))
        .route("/twilio/voice/status", post(twilio::status_webhook))
        .layer(TraceLayer::new_for_http())
}
