//! Base traits and types for the voice-AI leg of a call.
//!
//! A voice-AI leg is one outbound duplex connection to a realtime voice
//! service. The call session pushes caller audio into it and consumes a single
//! ordered stream of [`RealtimeEvent`]s out of it.
//!
//! Providers implement two traits:
//! - [`VoiceAiConnector`] - process-wide factory that opens a connection per call
//! - [`VoiceAiLeg`] - the per-call handle owned by exactly one session

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the voice-AI leg.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RealtimeError {
    /// The connection could not be established (transport failure or rejected auth)
    #[error("Connect failed: {0}")]
    ConnectError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error event reported by the provider
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Result type for voice-AI operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Persona Types
// =============================================================================

/// Server-side turn detection parameters sent with the session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side voice activity detection
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        threshold: f32,
        /// Audio kept before detected speech (ms)
        prefix_padding_ms: u32,
        /// Silence before the turn ends (ms)
        silence_duration_ms: u32,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Tool the voice model may call. Passed through to the provider untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (normally "function")
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    /// Tool name
    pub name: String,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Everything the voice service needs to act as a given agent on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    /// System instructions
    pub instructions: String,
    /// Voice identity
    pub voice: String,
    /// Spoken language, when the agent pins one
    pub language: Option<String>,
    /// Callable tools
    pub tools: Vec<ToolDefinition>,
    /// Turn detection parameters
    pub turn_detection: TurnDetectionConfig,
}

impl Persona {
    /// Instructions as sent to the provider, with the language directive appended.
    pub fn full_instructions(&self) -> String {
        match self.language.as_deref().map(str::trim) {
            Some(lang) if !lang.is_empty() => {
                format!("{}\n\nAlways speak in {}.", self.instructions, lang)
            }
            _ => self.instructions.clone(),
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            instructions: "You are a helpful voice assistant.".to_string(),
            voice: "Ara".to_string(),
            language: None,
            tools: Vec::new(),
            turn_detection: TurnDetectionConfig::default(),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a voice-AI leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connected and ready
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events demultiplexed from the provider stream, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Decoded audio chunk to play to the caller
    AudioDelta(Bytes),
    /// The model finished an audio response
    AudioDone,
    /// Transcript text fragment
    TranscriptDelta(String),
    /// Error reported by the provider; fatal to the call
    Error(RealtimeError),
    /// Provider acknowledged the session
    SessionCreated,
    /// Provider applied the session configuration
    SessionUpdated,
    /// Transport closed. Emitted exactly once per connection.
    Closed,
}

/// Receiving half of a leg's event stream.
pub type RealtimeEvents = mpsc::Receiver<RealtimeEvent>;

// =============================================================================
// Traits
// =============================================================================

/// Per-call handle on an open voice-AI connection.
#[async_trait]
pub trait VoiceAiLeg: Send {
    /// Append caller audio. Never fails and never reopens a closed connection;
    /// audio sent while the leg is not active is dropped with a warning.
    async fn send_audio(&mut self, audio: Bytes);

    /// Close the connection. Calling it more than once is a no-op.
    async fn disconnect(&mut self);

    /// True while the transport is open and the leg has not been disconnected.
    fn is_active(&self) -> bool;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState {
        if self.is_active() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

/// An open voice-AI connection: the leg handle plus its event stream.
pub struct VoiceAiConnection {
    pub leg: Box<dyn VoiceAiLeg>,
    pub events: RealtimeEvents,
}

impl fmt::Debug for VoiceAiConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceAiConnection")
            .field("active", &self.leg.is_active())
            .finish()
    }
}

/// Opens voice-AI connections. Shared process-wide.
#[async_trait]
pub trait VoiceAiConnector: Send + Sync {
    /// Open a connection for `call_sid` and configure it with `persona`.
    ///
    /// Returns once the transport is open and the session configuration has
    /// been queued ahead of any audio. Does not wait for the provider's
    /// acknowledgment.
    async fn connect(&self, call_sid: &str, persona: &Persona)
    -> RealtimeResult<VoiceAiConnection>;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}
