use serde::Deserialize;
use std::path::PathBuf;

use crate::core::agents::AgentProfile;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   public_url: "https://relay.example.com"
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// twilio:
///   account_sid: "ACxxxxxxxx"
///   auth_token: "your-auth-token"
///
/// voice_ai:
///   api_key: "your-grok-key"
///   model: "grok-voice-agent"
///   connect_timeout_seconds: 10
///   default_system_prompt: "You are a helpful voice assistant."
///   default_voice: "Ara"
///   turn_detection:
///     threshold: 0.5
///     prefix_padding_ms: 300
///     silence_duration_ms: 500
///
/// agents:
///   - id: "support"
///     user_id: "user-123"
///     phone_number: "+15557654321"
///     system_prompt: "You are the support line."
///     voice: "Eve"
///
/// billing:
///   voice_ai_rate_per_minute: 0.05
///   carrier_rate_per_minute: 0.013
///
/// supabase:
///   url: "https://project.supabase.co"
///   service_role_key: "service-role-key"
///
/// security:
///   cors_allowed_origins: "*"
///   max_media_connections: 500
///
/// shutdown:
///   drain_timeout_seconds: 30
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub twilio: Option<TwilioYaml>,
    pub voice_ai: Option<VoiceAiYaml>,
    pub agents: Option<Vec<AgentProfile>>,
    pub billing: Option<BillingYaml>,
    pub supabase: Option<SupabaseYaml>,
    pub security: Option<SecurityYaml>,
    pub shutdown: Option<ShutdownYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Base URL the carrier uses to reach the webhooks
    pub public_url: Option<String>,
    /// Base WebSocket URL for media streams (derived from public_url when absent)
    pub public_ws_url: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Twilio credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub api_base_url: Option<String>,
}

/// Voice-AI connection and default persona from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceAiYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub default_system_prompt: Option<String>,
    /// "Ara", "Eve" or "Leo"
    pub default_voice: Option<String>,
    pub default_language: Option<String>,
    pub turn_detection: Option<TurnDetectionYaml>,
}

/// Server VAD parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnDetectionYaml {
    /// Set to false to disable server-side turn detection
    pub enabled: Option<bool>,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

/// Per-minute rates from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BillingYaml {
    pub voice_ai_rate_per_minute: Option<f64>,
    pub carrier_rate_per_minute: Option<f64>,
}

/// Supabase call store and wallet from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SupabaseYaml {
    pub url: Option<String>,
    pub service_role_key: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent media-stream connections
    pub max_media_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ShutdownYaml {
    pub drain_timeout_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
