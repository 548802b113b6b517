//! Wire messages for the Grok voice agent WebSocket protocol.
//!
//! Every envelope is a JSON object with a `type` discriminator. Audio travels
//! base64-encoded inside the envelope.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::realtime::base::{Persona, ToolDefinition, TurnDetectionConfig};

// =============================================================================
// Client Events
// =============================================================================

/// Session configuration sent in `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub voice: String,
    pub model: String,
    pub tools: Vec<ToolDefinition>,
    pub turn_detection: TurnDetectionConfig,
}

impl SessionConfig {
    pub fn from_persona(persona: &Persona, model: &str) -> Self {
        Self {
            instructions: persona.full_instructions(),
            voice: persona.voice.clone(),
            model: model.to_string(),
            tools: persona.tools.clone(),
            turn_detection: persona.turn_detection.clone(),
        }
    }
}

/// Events sent from the gateway to the voice service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configure the session
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append caller audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64 encoded audio
        audio: String,
    },
}

impl ClientEvent {
    /// Build an `input_audio_buffer.append` event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Error payload of an `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Build an error from whatever the `error` field carries.
    ///
    /// Missing payloads, bare strings and objects without `message` all
    /// still produce a description.
    pub fn from_payload(payload: Option<&serde_json::Value>) -> Self {
        let mut error = match payload {
            Some(serde_json::Value::String(text)) => ApiError {
                message: text.clone(),
                ..Default::default()
            },
            Some(serde_json::Value::Object(fields)) => {
                let field = |key: &str| match fields.get(key) {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(text)) => Some(text.clone()),
                    Some(other) => Some(other.to_string()),
                };
                ApiError {
                    error_type: field("type"),
                    code: field("code"),
                    message: field("message").unwrap_or_default(),
                }
            }
            _ => ApiError::default(),
        };

        if error.message.is_empty() {
            error.message = match (&error.code, payload) {
                (Some(code), _) => code.clone(),
                (None, Some(value)) if !value.is_null() => value.to_string(),
                _ => "unspecified voice service error".to_string(),
            };
        }
        error
    }
}

/// Events received from the voice service that the gateway acts on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Option<serde_json::Value>,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Option<serde_json::Value>,
    },

    /// Base64 audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        delta: String,
        #[serde(default)]
        response_id: Option<String>,
    },

    #[serde(rename = "response.audio.done")]
    AudioDone {
        #[serde(default)]
        response_id: Option<String>,
    },

    /// Transcript fragment
    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },
}

const KNOWN_EVENT_TYPES: &[&str] = &[
    "session.created",
    "session.updated",
    "response.audio.delta",
    "response.audio.done",
    "response.text.delta",
    "error",
];

/// Outcome of parsing one text frame from the voice service.
#[derive(Debug, PartialEq)]
pub enum ParsedServerMessage {
    Event(ServerEvent),
    /// Well-formed envelope with a type the gateway ignores
    Unhandled(String),
    /// Not JSON, no type, or a known type with a bad payload
    Malformed(String),
}

/// Parse a text frame into a [`ParsedServerMessage`].
pub fn parse_server_message(text: &str) -> ParsedServerMessage {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return ParsedServerMessage::Malformed(e.to_string()),
    };

    let Some(event_type) = value.get("type").and_then(|t| t.as_str()).map(str::to_owned) else {
        return ParsedServerMessage::Malformed("missing type field".to_string());
    };

    if !KNOWN_EVENT_TYPES.contains(&event_type.as_str()) {
        return ParsedServerMessage::Unhandled(event_type);
    }

    if event_type == "error" {
        return ParsedServerMessage::Event(ServerEvent::Error {
            error: ApiError::from_payload(value.get("error")),
        });
    }

    match serde_json::from_value::<ServerEvent>(value) {
        Ok(event) => ParsedServerMessage::Event(event),
        Err(e) => ParsedServerMessage::Malformed(format!("{event_type}: {e}")),
    }
}
