//! Process-wide application state shared by every handler.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::agents::AgentDirectory;
use crate::core::ledger::{CallLedger, LedgerError, SupabaseCallStore, SupabaseClient, SupabaseWallet};
use crate::core::realtime::{GrokVoiceConnector, RealtimeError, VoiceAiConnector};
use crate::core::session::{SessionContext, SessionTracker};
use crate::core::telephony::{CarrierClient, TelephonyError, TwilioClient};

/// Why a media connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// Failures while building the state from configuration.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Telephony(#[from] TelephonyError),

    #[error(transparent)]
    VoiceAi(#[from] RealtimeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct AppState {
    pub config: ServerConfig,
    pub carrier: Arc<dyn CarrierClient>,
    pub voice_ai: Arc<dyn VoiceAiConnector>,
    pub ledger: CallLedger,
    pub agents: Arc<AgentDirectory>,
    pub sessions: SessionTracker,
    media_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, usize>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("carrier", &self.carrier.provider_name())
            .field("voice_ai", &self.voice_ai.provider_name())
            .field("agents", &self.agents.len())
            .field("active_sessions", &self.sessions.active_sessions())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build the production collaborators from configuration.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let (Some(account_sid), Some(auth_token)) = (
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
        ) else {
            return Err(StateError::Config(
                "Twilio account SID and auth token are required".to_string(),
            ));
        };
        let carrier = TwilioClient::new(account_sid, auth_token, &config.twilio_api_base_url)?;

        let grok_config = config.grok_config().map_err(StateError::Config)?;
        let voice_ai = GrokVoiceConnector::new(grok_config)?;

        let ledger = match (&config.supabase_url, &config.supabase_service_key) {
            (Some(url), Some(key)) => {
                let client = Arc::new(SupabaseClient::new(url, key.clone())?);
                info!("Using Supabase call store and wallet");
                CallLedger::new(
                    Arc::new(SupabaseCallStore::new(client.clone())),
                    Arc::new(SupabaseWallet::new(client)),
                    config.call_rates(),
                )
            }
            _ => {
                info!("Supabase not configured, using in-memory call store and wallet");
                CallLedger::in_memory(config.call_rates())
            }
        };

        Ok(Self::with_components(
            config,
            Arc::new(carrier),
            Arc::new(voice_ai),
            ledger,
        ))
    }

    /// Build the state around explicit collaborators.
    pub fn with_components(
        config: ServerConfig,
        carrier: Arc<dyn CarrierClient>,
        voice_ai: Arc<dyn VoiceAiConnector>,
        ledger: CallLedger,
    ) -> Arc<Self> {
        let agents = Arc::new(AgentDirectory::new(
            config.agents.clone(),
            config.default_persona(),
        ));

        Arc::new(Self {
            config,
            carrier,
            voice_ai,
            ledger,
            agents,
            sessions: SessionTracker::new(),
            media_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            carrier: Arc::clone(&self.carrier),
            voice_ai: Arc::clone(&self.voice_ai),
            ledger: self.ledger.clone(),
            agents: Arc::clone(&self.agents),
        }
    }

    /// Reserve a media connection slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let max_global = self.config.max_media_connections.unwrap_or(usize::MAX);
        self.media_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_global).then_some(n + 1)
            })
            .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;

        let max_per_ip = self.config.max_connections_per_ip as usize;
        match self.ip_connections.entry(ip) {
            Entry::Occupied(mut entry) if *entry.get() < max_per_ip => *entry.get_mut() += 1,
            Entry::Vacant(entry) if max_per_ip > 0 => {
                entry.insert(1);
            }
            _ => {
                self.media_connections.fetch_sub(1, Ordering::SeqCst);
                return Err(ConnectionLimitError::PerIpLimitReached);
            }
        }
        Ok(())
    }

    /// Give back a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .media_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if let Entry::Occupied(mut entry) = self.ip_connections.entry(ip) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    pub fn media_connection_count(&self) -> usize {
        self.media_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}
