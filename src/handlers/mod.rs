//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `calls` - Outbound call trigger
//! - `media` - Carrier media-stream WebSocket
//! - `twilio` - Carrier voice and status webhooks

pub mod api;
pub mod calls;
pub mod media;
pub mod twilio;

// Re-export commonly used handlers for convenient access
pub use api::health_check;
pub use calls::outbound_call;
pub use media::media_stream_handler;
pub use twilio::{status_webhook, voice_webhook};
