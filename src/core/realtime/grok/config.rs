//! Grok voice agent configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// Grok voice agent WebSocket endpoint.
pub const GROK_VOICE_URL: &str = "wss://api.x.ai/v1/voice";

/// Default voice agent model.
pub const GROK_VOICE_MODEL: &str = "grok-voice-agent";

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Voices
// =============================================================================

/// Voices offered by the Grok voice agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrokVoice {
    /// Ara (default)
    #[default]
    Ara,
    /// Eve
    Eve,
    /// Leo
    Leo,
}

impl GrokVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ara => "Ara",
            Self::Eve => "Eve",
            Self::Leo => "Leo",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ara" => Self::Ara,
            "eve" => Self::Eve,
            "leo" => Self::Leo,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for GrokVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Connector configuration
// =============================================================================

/// Connection settings shared by every call.
///
/// The API key is redacted from `Debug` output and zeroized on drop.
#[derive(Clone)]
pub struct GrokConfig {
    /// Bearer token for the voice API
    pub api_key: String,
    /// WebSocket endpoint
    pub url: String,
    /// Model identifier sent in `session.update`
    pub model: String,
    /// Handshake timeout
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for GrokConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrokConfig")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for GrokConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}

impl GrokConfig {
    /// Create a config with the default endpoint, model and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: GROK_VOICE_URL.to_string(),
            model: GROK_VOICE_MODEL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check that the settings can produce a connection.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "voice API key is required".to_string(),
            ));
        }
        let parsed = url::Url::parse(&self.url).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("invalid voice API URL '{}': {e}", self.url))
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "voice API URL must use ws:// or wss://, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }
}
