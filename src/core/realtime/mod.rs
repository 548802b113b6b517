//! Realtime voice-AI leg.
//!
//! # Architecture
//!
//! - `VoiceAiConnector` opens one connection per call (shared, behind `Arc`)
//! - `VoiceAiLeg` is the per-call send/disconnect handle
//! - events flow back over an mpsc channel in arrival order
//!
//! # Supported Providers
//!
//! - **Grok voice agent** - server VAD, base64 audio in JSON envelopes

mod base;
pub mod grok;

pub use base::{
    ConnectionState, Persona, RealtimeError, RealtimeEvent, RealtimeEvents, RealtimeResult,
    ToolDefinition, TurnDetectionConfig, VoiceAiConnection, VoiceAiConnector, VoiceAiLeg,
};
pub use grok::{
    DEFAULT_CONNECT_TIMEOUT, GROK_VOICE_MODEL, GROK_VOICE_URL, GrokConfig, GrokVoice,
    GrokVoiceConnector,
};
