//! Environment base with YAML overrides.

use std::path::PathBuf;

use crate::core::realtime::TurnDetectionConfig;

use super::yaml::{TurnDetectionYaml, YamlConfig};
use super::{ServerConfig, TlsConfig, env};

type ConfigResult<T> = Result<T, Box<dyn std::error::Error>>;

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn override_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn merge_turn_detection(base: &TurnDetectionConfig, yaml: TurnDetectionYaml) -> TurnDetectionConfig {
    if yaml.enabled == Some(false) {
        return TurnDetectionConfig::None;
    }

    let (threshold, prefix_padding_ms, silence_duration_ms) = match base {
        TurnDetectionConfig::ServerVad {
            threshold,
            prefix_padding_ms,
            silence_duration_ms,
        } => (*threshold, *prefix_padding_ms, *silence_duration_ms),
        TurnDetectionConfig::None => match TurnDetectionConfig::default() {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => (threshold, prefix_padding_ms, silence_duration_ms),
            TurnDetectionConfig::None => (0.5, 300, 500),
        },
    };

    TurnDetectionConfig::ServerVad {
        threshold: yaml.threshold.unwrap_or(threshold),
        prefix_padding_ms: yaml.prefix_padding_ms.unwrap_or(prefix_padding_ms),
        silence_duration_ms: yaml.silence_duration_ms.unwrap_or(silence_duration_ms),
    }
}

/// Load the environment, then apply every value the YAML file sets.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> ConfigResult<ServerConfig> {
    let mut config = env::load()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        override_with(&mut config.host, server.host);
        override_with(&mut config.port, server.port);
        override_with(&mut config.public_url, server.public_url);
        override_opt(&mut config.public_ws_url, server.public_ws_url);

        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else if tls.cert_path.is_some() || tls.key_path.is_some() {
                let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path) else {
                    return Err("TLS requires both cert_path and key_path".into());
                };
                config.tls = Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            } else if tls.enabled == Some(true) && config.tls.is_none() {
                return Err("TLS requires both cert_path and key_path".into());
            }
        }
    }

    if let Some(twilio) = yaml.twilio {
        override_opt(&mut config.twilio_account_sid, twilio.account_sid);
        override_opt(&mut config.twilio_auth_token, twilio.auth_token);
        override_with(&mut config.twilio_api_base_url, twilio.api_base_url);
    }

    if let Some(voice_ai) = yaml.voice_ai {
        override_opt(&mut config.grok_api_key, voice_ai.api_key);
        override_with(&mut config.grok_voice_url, voice_ai.url);
        override_with(&mut config.grok_voice_model, voice_ai.model);
        override_with(
            &mut config.voice_ai_connect_timeout_seconds,
            voice_ai.connect_timeout_seconds,
        );
        override_with(
            &mut config.default_system_prompt,
            voice_ai.default_system_prompt,
        );
        override_with(&mut config.default_voice, voice_ai.default_voice);
        override_opt(&mut config.default_language, voice_ai.default_language);
        if let Some(turn_detection) = voice_ai.turn_detection {
            config.turn_detection = merge_turn_detection(&config.turn_detection, turn_detection);
        }
    }

    override_with(&mut config.agents, yaml.agents);

    if let Some(billing) = yaml.billing {
        override_with(
            &mut config.voice_ai_rate_per_minute,
            billing.voice_ai_rate_per_minute,
        );
        override_with(
            &mut config.carrier_rate_per_minute,
            billing.carrier_rate_per_minute,
        );
    }

    if let Some(supabase) = yaml.supabase {
        override_opt(&mut config.supabase_url, supabase.url);
        override_opt(&mut config.supabase_service_key, supabase.service_role_key);
    }

    if let Some(security) = yaml.security {
        override_opt(
            &mut config.cors_allowed_origins,
            security.cors_allowed_origins,
        );
        override_with(
            &mut config.rate_limit_requests_per_second,
            security.rate_limit_requests_per_second,
        );
        override_with(
            &mut config.rate_limit_burst_size,
            security.rate_limit_burst_size,
        );
        override_opt(
            &mut config.max_media_connections,
            security.max_media_connections,
        );
        override_with(
            &mut config.max_connections_per_ip,
            security.max_connections_per_ip,
        );
    }

    if let Some(shutdown) = yaml.shutdown {
        override_with(
            &mut config.drain_timeout_seconds,
            shutdown.drain_timeout_seconds,
        );
    }

    Ok(config)
}
