//! Configuration validation logic.

use std::collections::HashSet;

use url::Url;

use crate::core::agents::AgentProfile;

use super::ServerConfig;

type ValidationResult = Result<(), Box<dyn std::error::Error>>;

/// Credentials without which no call can be relayed.
pub fn validate_required_credentials(config: &ServerConfig) -> ValidationResult {
    let missing: Vec<&str> = [
        ("TWILIO_ACCOUNT_SID", config.twilio_account_sid.is_none()),
        ("TWILIO_AUTH_TOKEN", config.twilio_auth_token.is_none()),
        ("GROK_API_KEY", config.grok_api_key.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Missing required configuration: {}", missing.join(", ")).into())
    }
}

/// The public URL must be absolute http(s); an explicit WebSocket URL must be ws(s).
pub fn validate_public_urls(public_url: &str, public_ws_url: Option<&str>) -> ValidationResult {
    let parsed = Url::parse(public_url).map_err(|e| format!("Invalid PUBLIC_URL '{public_url}': {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("PUBLIC_URL must use http or https, got '{}'", parsed.scheme()).into());
    }

    if let Some(ws_url) = public_ws_url {
        let parsed =
            Url::parse(ws_url).map_err(|e| format!("Invalid PUBLIC_WS_URL '{ws_url}': {e}"))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(
                format!("PUBLIC_WS_URL must use ws or wss, got '{}'", parsed.scheme()).into(),
            );
        }
    }
    Ok(())
}

/// The call store and wallet need both values or neither.
pub fn validate_supabase(url: &Option<String>, service_key: &Option<String>) -> ValidationResult {
    match (url, service_key) {
        (Some(url), Some(_)) => {
            Url::parse(url).map_err(|e| format!("Invalid SUPABASE_URL '{url}': {e}"))?;
            Ok(())
        }
        (None, None) => Ok(()),
        (Some(_), None) => Err("SUPABASE_URL is set but SUPABASE_SERVICE_ROLE_KEY is missing".into()),
        (None, Some(_)) => Err("SUPABASE_SERVICE_ROLE_KEY is set but SUPABASE_URL is missing".into()),
    }
}

pub fn validate_rates(voice_ai_rate: f64, carrier_rate: f64) -> ValidationResult {
    for (name, rate) in [
        ("VOICE_AI_RATE_PER_MINUTE", voice_ai_rate),
        ("CARRIER_RATE_PER_MINUTE", carrier_rate),
    ] {
        if !rate.is_finite() || rate < 0.0 {
            return Err(format!("{name} must be a non-negative number, got {rate}").into());
        }
    }
    Ok(())
}

/// Agent ids and routed phone numbers must be unique.
pub fn validate_agents(agents: &[AgentProfile]) -> ValidationResult {
    let mut ids = HashSet::new();
    let mut numbers = HashSet::new();

    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err("Agent id cannot be empty".into());
        }
        if !ids.insert(agent.id.as_str()) {
            return Err(format!("Duplicate agent id '{}'", agent.id).into());
        }
        if let Some(number) = agent.phone_number.as_deref()
            && !numbers.insert(number)
        {
            return Err(format!("Phone number {number} is assigned to more than one agent").into());
        }
    }
    Ok(())
}

pub fn validate_timeouts(connect_timeout_seconds: u64, drain_timeout_seconds: u64) -> ValidationResult {
    if connect_timeout_seconds == 0 {
        return Err("VOICE_AI_CONNECT_TIMEOUT_SECONDS must be greater than zero".into());
    }
    if drain_timeout_seconds == 0 {
        return Err("DRAIN_TIMEOUT_SECONDS must be greater than zero".into());
    }
    Ok(())
}
