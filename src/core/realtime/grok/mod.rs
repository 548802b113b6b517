//! Grok voice agent provider.
//!
//! Bridges call audio to xAI's realtime voice agent over a WebSocket.

mod client;
mod config;
pub mod messages;

pub use client::{GrokVoiceConnector, GrokVoiceLeg};
pub use config::{DEFAULT_CONNECT_TIMEOUT, GROK_VOICE_MODEL, GROK_VOICE_URL, GrokConfig, GrokVoice};
