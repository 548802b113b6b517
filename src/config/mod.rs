//! Configuration module for the call relay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `pricing`: Per-minute rates and call cost
//!
//! # Example
//! ```rust,no_run
//! use callrelay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
pub mod pricing;
mod validation;
mod yaml;

pub use pricing::{CallCost, CallRates, ModelPricing, PricingUnit};

use crate::core::agents::AgentProfile;
use crate::core::realtime::{GrokConfig, GrokVoice, Persona, TurnDetectionConfig};

/// Instructions used when no agent matches a call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant.";

/// Voice used when no agent matches a call.
pub const DEFAULT_VOICE: &str = "Ara";

pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

pub const DEFAULT_DRAIN_TIMEOUT_SECONDS: u64 = 30;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS, public URLs)
/// - Carrier credentials (Twilio)
/// - Voice-AI connection and default persona (Grok)
/// - Agents and billing rates
/// - Call store and wallet (Supabase, optional)
/// - Security settings (CORS, rate limiting, connection limits)
///
/// Secrets are redacted from `Debug` output and zeroized on drop.
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Base URL the carrier reaches the webhooks on, e.g. `https://relay.example.com`
    pub public_url: String,
    /// Base WebSocket URL for media streams. Derived from `public_url` when unset.
    pub public_ws_url: Option<String>,

    // Carrier
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_api_base_url: String,

    // Voice-AI
    pub grok_api_key: Option<String>,
    pub grok_voice_url: String,
    pub grok_voice_model: String,
    pub voice_ai_connect_timeout_seconds: u64,

    // Default persona
    pub default_system_prompt: String,
    pub default_voice: String,
    pub default_language: Option<String>,
    pub turn_detection: TurnDetectionConfig,

    /// Agents calls can be routed to
    pub agents: Vec<AgentProfile>,

    // Billing
    pub voice_ai_rate_per_minute: f64,
    pub carrier_rate_per_minute: f64,

    // Call store and wallet; in-memory when unset
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent media-stream connections
    /// Default: None (unlimited)
    pub max_media_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,

    /// Time live sessions get to finish teardown on shutdown
    pub drain_timeout_seconds: u64,
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("public_url", &self.public_url)
            .field("public_ws_url", &self.public_ws_url)
            .field("twilio_account_sid", &self.twilio_account_sid)
            .field("twilio_auth_token", &redacted(&self.twilio_auth_token))
            .field("twilio_api_base_url", &self.twilio_api_base_url)
            .field("grok_api_key", &redacted(&self.grok_api_key))
            .field("grok_voice_url", &self.grok_voice_url)
            .field("grok_voice_model", &self.grok_voice_model)
            .field(
                "voice_ai_connect_timeout_seconds",
                &self.voice_ai_connect_timeout_seconds,
            )
            .field("default_system_prompt", &self.default_system_prompt)
            .field("default_voice", &self.default_voice)
            .field("default_language", &self.default_language)
            .field("turn_detection", &self.turn_detection)
            .field("agents", &self.agents)
            .field("voice_ai_rate_per_minute", &self.voice_ai_rate_per_minute)
            .field("carrier_rate_per_minute", &self.carrier_rate_per_minute)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_key", &redacted(&self.supabase_service_key))
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "rate_limit_requests_per_second",
                &self.rate_limit_requests_per_second,
            )
            .field("rate_limit_burst_size", &self.rate_limit_burst_size)
            .field("max_media_connections", &self.max_media_connections)
            .field("max_connections_per_ip", &self.max_connections_per_ip)
            .field("drain_timeout_seconds", &self.drain_timeout_seconds)
            .finish()
    }
}

/// Zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
        if let Some(ref mut key) = self.grok_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.supabase_service_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` is loaded in `main` before this is called, so real environment
    /// variables override `.env` values.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_required_credentials(self)?;
        validation::validate_public_urls(&self.public_url, self.public_ws_url.as_deref())?;
        validation::validate_supabase(&self.supabase_url, &self.supabase_service_key)?;
        validation::validate_rates(self.voice_ai_rate_per_minute, self.carrier_rate_per_minute)?;
        validation::validate_agents(&self.agents)?;
        validation::validate_timeouts(
            self.voice_ai_connect_timeout_seconds,
            self.drain_timeout_seconds,
        )?;
        Ok(())
    }

    /// Get the server address as a string ("host:port")
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Base WebSocket URL, explicit or derived from the public URL.
    pub fn public_ws_url(&self) -> String {
        if let Some(ws_url) = &self.public_ws_url {
            return ws_url.trim_end_matches('/').to_string();
        }
        let base = self.public_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }

    /// Media stream endpoint the carrier connects to, without the call query.
    pub fn media_stream_url(&self) -> String {
        format!("{}/media-stream", self.public_ws_url())
    }

    /// Voice webhook the carrier fetches instructions from on outbound calls.
    pub fn voice_webhook_url(&self) -> String {
        format!("{}/twilio/voice", self.public_url.trim_end_matches('/'))
    }

    pub fn call_rates(&self) -> CallRates {
        CallRates::new(self.voice_ai_rate_per_minute, self.carrier_rate_per_minute)
    }

    pub fn has_supabase(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_key.is_some()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.voice_ai_connect_timeout_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// Voice-AI connector settings.
    pub fn grok_config(&self) -> Result<GrokConfig, String> {
        let api_key = self
            .grok_api_key
            .clone()
            .ok_or_else(|| "GROK_API_KEY is not configured".to_string())?;

        Ok(GrokConfig::new(api_key)
            .with_url(self.grok_voice_url.clone())
            .with_model(self.grok_voice_model.clone())
            .with_connect_timeout(self.connect_timeout()))
    }

    /// Persona used when no agent matches a call.
    pub fn default_persona(&self) -> Persona {
        Persona {
            instructions: self.default_system_prompt.clone(),
            voice: GrokVoice::from_str_or_default(&self.default_voice)
                .as_str()
                .to_string(),
            language: self.default_language.clone(),
            tools: Vec::new(),
            turn_detection: self.turn_detection.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A complete configuration with fake credentials and no database.
    pub fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3001,
            tls: None,
            public_url: "https://relay.example.com".to_string(),
            public_ws_url: None,
            twilio_account_sid: Some("AC_test".to_string()),
            twilio_auth_token: Some("auth-token".to_string()),
            twilio_api_base_url: "https://api.twilio.com".to_string(),
            grok_api_key: Some("grok-key".to_string()),
            grok_voice_url: "wss://api.x.ai/v1/voice".to_string(),
            grok_voice_model: "grok-voice-agent".to_string(),
            voice_ai_connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_voice: DEFAULT_VOICE.to_string(),
            default_language: None,
            turn_detection: TurnDetectionConfig::default(),
            agents: Vec::new(),
            voice_ai_rate_per_minute: 0.05,
            carrier_rate_per_minute: 0.013,
            supabase_url: None,
            supabase_service_key: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_media_connections: None,
            max_connections_per_ip: 100,
            drain_timeout_seconds: DEFAULT_DRAIN_TIMEOUT_SECONDS,
        }
    }
}
