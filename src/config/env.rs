//! Environment variable loading.
//!
//! Every setting has a default except the credentials, which stay `None`
//! until validation decides whether their absence is fatal.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::agents::AgentProfile;
use crate::core::realtime::{GROK_VOICE_MODEL, GROK_VOICE_URL, TurnDetectionConfig};
use crate::core::telephony::twilio::TWILIO_API_BASE_URL;

use super::pricing::CallRates;
use super::{
    DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_DRAIN_TIMEOUT_SECONDS, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_VOICE, ServerConfig, TlsConfig,
};

type ConfigResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Non-empty value of an environment variable.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})").into()),
        None => Ok(None),
    }
}

fn parse_bool(name: &str) -> ConfigResult<Option<bool>> {
    match var(name).map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(Some(false)),
        Some(v) => Err(format!("Invalid value for {name}: '{v}' (expected true or false)").into()),
        None => Ok(None),
    }
}

fn load_tls() -> ConfigResult<Option<TlsConfig>> {
    let cert_path = var("TLS_CERT_PATH").map(PathBuf::from);
    let key_path = var("TLS_KEY_PATH").map(PathBuf::from);
    let enabled = parse_bool("TLS_ENABLED")?.unwrap_or(cert_path.is_some() || key_path.is_some());

    if !enabled {
        return Ok(None);
    }
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        _ => Err("TLS requires both TLS_CERT_PATH and TLS_KEY_PATH".into()),
    }
}

fn load_turn_detection() -> ConfigResult<TurnDetectionConfig> {
    if var("TURN_DETECTION_TYPE").is_some_and(|t| t.eq_ignore_ascii_case("none")) {
        return Ok(TurnDetectionConfig::None);
    }

    let TurnDetectionConfig::ServerVad {
        threshold,
        prefix_padding_ms,
        silence_duration_ms,
    } = TurnDetectionConfig::default()
    else {
        return Ok(TurnDetectionConfig::default());
    };

    Ok(TurnDetectionConfig::ServerVad {
        threshold: parse_var("TURN_DETECTION_THRESHOLD")?.unwrap_or(threshold),
        prefix_padding_ms: parse_var("TURN_DETECTION_PREFIX_PADDING_MS")?
            .unwrap_or(prefix_padding_ms),
        silence_duration_ms: parse_var("TURN_DETECTION_SILENCE_DURATION_MS")?
            .unwrap_or(silence_duration_ms),
    })
}

/// Parse the `AGENTS_JSON` array.
pub(crate) fn parse_agents_json(raw: &str) -> ConfigResult<Vec<AgentProfile>> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid AGENTS_JSON: {e}").into())
}

/// Build a configuration from environment variables and defaults.
pub(super) fn load() -> ConfigResult<ServerConfig> {
    let agents = match var("AGENTS_JSON") {
        Some(raw) => parse_agents_json(&raw)?,
        None => Vec::new(),
    };
    let default_rates = CallRates::default();

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        port: parse_var("PORT")?.unwrap_or(3001),
        tls: load_tls()?,
        public_url: var("PUBLIC_URL").unwrap_or_else(|| "http://localhost:3001".to_string()),
        public_ws_url: var("PUBLIC_WS_URL"),

        twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
        twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
        twilio_api_base_url: var("TWILIO_API_BASE_URL")
            .unwrap_or_else(|| TWILIO_API_BASE_URL.to_string()),

        grok_api_key: var("GROK_API_KEY"),
        grok_voice_url: var("GROK_VOICE_API_URL").unwrap_or_else(|| GROK_VOICE_URL.to_string()),
        grok_voice_model: var("GROK_VOICE_MODEL").unwrap_or_else(|| GROK_VOICE_MODEL.to_string()),
        voice_ai_connect_timeout_seconds: parse_var("VOICE_AI_CONNECT_TIMEOUT_SECONDS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),

        default_system_prompt: var("DEFAULT_SYSTEM_PROMPT")
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        default_voice: var("DEFAULT_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        default_language: var("DEFAULT_LANGUAGE"),
        turn_detection: load_turn_detection()?,
        agents,

        voice_ai_rate_per_minute: parse_var("VOICE_AI_RATE_PER_MINUTE")?
            .unwrap_or(default_rates.voice_ai_per_minute),
        carrier_rate_per_minute: parse_var("CARRIER_RATE_PER_MINUTE")?
            .unwrap_or(default_rates.carrier_per_minute),

        supabase_url: var("SUPABASE_URL"),
        supabase_service_key: var("SUPABASE_SERVICE_ROLE_KEY"),

        cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?
            .unwrap_or(60),
        rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?.unwrap_or(10),
        max_media_connections: parse_var("MAX_MEDIA_CONNECTIONS")?,
        max_connections_per_ip: parse_var("MAX_CONNECTIONS_PER_IP")?.unwrap_or(100),

        drain_timeout_seconds: parse_var("DRAIN_TIMEOUT_SECONDS")?
            .unwrap_or(DEFAULT_DRAIN_TIMEOUT_SECONDS),
    })
}
