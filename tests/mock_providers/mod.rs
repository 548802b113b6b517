//! In-process stand-ins for the carrier and the voice AI service.
//!
//! - `FakeCarrier`: scripted call metadata, records hang-ups and dials
//! - `ScriptedVoiceAi`: hands the test the provider side of every connection
//! - `FakeTransport`: plays the media-stream socket for a telephony leg
//! - `grok_mock`: a real WebSocket server speaking the Grok envelope protocol

#![allow(dead_code)]

pub mod grok_mock;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use callrelay_gateway::ServerConfig;
use callrelay_gateway::config::{CallRates, DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE};
use callrelay_gateway::core::agents::AgentProfile;
use callrelay_gateway::core::ledger::{CallLedger, InMemoryCallStore, InMemoryWallet};
use callrelay_gateway::core::realtime::{
    Persona, RealtimeError, RealtimeEvent, RealtimeResult, VoiceAiConnection, VoiceAiConnector,
    VoiceAiLeg,
};
use callrelay_gateway::core::telephony::{
    CallDirection, CallMetadata, CallStatus, CarrierClient, MediaStreamHandle, OriginatedCall,
    TelephonyCommand, TelephonyError, TelephonyEvent, TelephonyResult,
};
use callrelay_gateway::core::realtime::TurnDetectionConfig;
use callrelay_gateway::state::AppState;

pub const CALLER: &str = "+15551234567";
pub const AGENT_NUMBER: &str = "+15557654321";

/// Poll `check` every 10ms until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Synchronous variant of [`eventually`].
pub async fn wait_until<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn standard_rates() -> CallRates {
    CallRates::new(0.05, 0.013)
}

/// Ledger over in-memory storage, with the wallet exposed for assertions.
pub fn memory_ledger(wallet: Arc<InMemoryWallet>) -> CallLedger {
    CallLedger::new(Arc::new(InMemoryCallStore::new()), wallet, standard_rates())
}

pub fn support_agent() -> AgentProfile {
    AgentProfile {
        id: "agent-support".to_string(),
        user_id: Some("user-1".to_string()),
        phone_number: Some(AGENT_NUMBER.to_string()),
        system_prompt: "You are the support line for Acme.".to_string(),
        voice: Some("eve".to_string()),
        language: None,
        tools: Vec::new(),
    }
}

/// Complete configuration with fake credentials, one agent and no database.
pub fn relay_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        public_url: "https://relay.example.com".to_string(),
        public_ws_url: None,
        twilio_account_sid: Some("AC_test".to_string()),
        twilio_auth_token: Some("auth-token".to_string()),
        twilio_api_base_url: "https://api.twilio.com".to_string(),
        grok_api_key: Some("grok-key".to_string()),
        grok_voice_url: "wss://api.x.ai/v1/voice".to_string(),
        grok_voice_model: "grok-voice-agent".to_string(),
        voice_ai_connect_timeout_seconds: 10,
        default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        default_voice: DEFAULT_VOICE.to_string(),
        default_language: None,
        turn_detection: TurnDetectionConfig::default(),
        agents: vec![support_agent()],
        voice_ai_rate_per_minute: 0.05,
        carrier_rate_per_minute: 0.013,
        supabase_url: None,
        supabase_service_key: None,
        cors_allowed_origins: None,
        rate_limit_requests_per_second: 60,
        rate_limit_burst_size: 10,
        max_media_connections: None,
        max_connections_per_ip: 100,
        drain_timeout_seconds: 5,
    }
}

/// Application state around fakes, with a funded wallet for `user-1`.
pub fn relay_state(
    config: ServerConfig,
    carrier: Arc<FakeCarrier>,
    voice_ai: Arc<ScriptedVoiceAi>,
) -> (Arc<AppState>, Arc<InMemoryWallet>) {
    let wallet = Arc::new(InMemoryWallet::new().with_balance("user-1", 5.0));
    let state = AppState::with_components(config, carrier, voice_ai, memory_ledger(wallet.clone()));
    (state, wallet)
}

pub fn inbound_metadata(call_sid: &str) -> CallMetadata {
    CallMetadata {
        call_sid: call_sid.to_string(),
        from: CALLER.to_string(),
        to: AGENT_NUMBER.to_string(),
        direction: CallDirection::Inbound,
        status: CallStatus::InProgress,
    }
}

// =============================================================================
// Carrier
// =============================================================================

#[derive(Default)]
pub struct FakeCarrier {
    calls: Mutex<HashMap<String, CallMetadata>>,
    terminated: Mutex<Vec<String>>,
    originated: Mutex<Vec<(String, String, String)>>,
    refuse_origination: bool,
}

impl FakeCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call(self, metadata: CallMetadata) -> Self {
        self.calls
            .lock()
            .unwrap()
            .insert(metadata.call_sid.clone(), metadata);
        self
    }

    pub fn refusing_origination() -> Self {
        Self {
            refuse_origination: true,
            ..Self::default()
        }
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }

    /// `(to, from, instructions_url)` of every dial request.
    pub fn originated(&self) -> Vec<(String, String, String)> {
        self.originated.lock().unwrap().clone()
    }
}

#[async_trait]
impl CarrierClient for FakeCarrier {
    async fn fetch_call_metadata(&self, call_sid: &str) -> TelephonyResult<CallMetadata> {
        self.calls
            .lock()
            .unwrap()
            .get(call_sid)
            .cloned()
            .ok_or_else(|| TelephonyError::CarrierLookupError {
                call_sid: call_sid.to_string(),
                message: "HTTP 404".to_string(),
            })
    }

    async fn originate_call(
        &self,
        to: &str,
        from: &str,
        instructions_url: &str,
    ) -> TelephonyResult<OriginatedCall> {
        if self.refuse_origination {
            return Err(TelephonyError::OriginationError(
                "HTTP 400 (Twilio 21211): Invalid 'To' Phone Number".to_string(),
            ));
        }
        self.originated.lock().unwrap().push((
            to.to_string(),
            from.to_string(),
            instructions_url.to_string(),
        ));
        Ok(OriginatedCall {
            call_sid: "CA_OUTBOUND_1".to_string(),
            status: CallStatus::Initiated,
        })
    }

    async fn terminate(&self, call_sid: &str) -> TelephonyResult<()> {
        self.terminated.lock().unwrap().push(call_sid.to_string());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake-carrier"
    }
}

// =============================================================================
// Voice AI
// =============================================================================

pub enum ConnectBehavior {
    Open,
    Refuse(RealtimeError),
    /// Fail the handshake once the delay has passed
    RefuseAfter(Duration, RealtimeError),
    /// Hold the connect until the gate is notified
    Gated(Arc<Notify>),
}

/// Provider side of one scripted connection.
#[derive(Clone)]
pub struct ScriptedRemote {
    pub call_sid: String,
    pub persona: Persona,
    pub events: mpsc::Sender<RealtimeEvent>,
    pub received: Arc<Mutex<Vec<Bytes>>>,
    pub disconnects: Arc<AtomicUsize>,
}

impl ScriptedRemote {
    pub async fn emit(&self, event: RealtimeEvent) {
        self.events.send(event).await.unwrap();
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().unwrap().clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct ScriptedVoiceAi {
    behavior: ConnectBehavior,
    remotes: Mutex<Vec<ScriptedRemote>>,
    attempts: AtomicUsize,
}

impl ScriptedVoiceAi {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            remotes: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next connection to open and return its provider side.
    pub async fn remote(&self) -> ScriptedRemote {
        for _ in 0..200 {
            if let Some(remote) = self.remotes.lock().unwrap().first().cloned() {
                return remote;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("voice AI connection never opened");
    }
}

#[async_trait]
impl VoiceAiConnector for ScriptedVoiceAi {
    async fn connect(
        &self,
        call_sid: &str,
        persona: &Persona,
    ) -> RealtimeResult<VoiceAiConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ConnectBehavior::Open => {}
            ConnectBehavior::Refuse(e) => return Err(e.clone()),
            ConnectBehavior::RefuseAfter(delay, e) => {
                tokio::time::sleep(*delay).await;
                return Err(e.clone());
            }
            ConnectBehavior::Gated(gate) => gate.notified().await,
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(AtomicUsize::new(0));

        self.remotes.lock().unwrap().push(ScriptedRemote {
            call_sid: call_sid.to_string(),
            persona: persona.clone(),
            events: events_tx,
            received: received.clone(),
            disconnects: disconnects.clone(),
        });

        Ok(VoiceAiConnection {
            leg: Box::new(ScriptedLeg {
                received,
                disconnects,
                active: true,
            }),
            events: events_rx,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedLeg {
    received: Arc<Mutex<Vec<Bytes>>>,
    disconnects: Arc<AtomicUsize>,
    active: bool,
}

#[async_trait]
impl VoiceAiLeg for ScriptedLeg {
    async fn send_audio(&mut self, audio: Bytes) {
        if self.active {
            self.received.lock().unwrap().push(audio);
        }
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// Media transport
// =============================================================================

/// Carrier side of a telephony leg.
pub struct FakeTransport {
    /// Push frames (or `Closed`) as if they came from the carrier socket
    pub inbound: mpsc::Sender<TelephonyEvent>,
    /// Audio the session wrote towards the caller
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    /// Resolves once the session asked the transport to close
    pub closed: JoinHandle<bool>,
}

impl FakeTransport {
    pub async fn frame(&self, data: &'static [u8]) {
        self.inbound
            .send(TelephonyEvent::Frame(Bytes::from_static(data)))
            .await
            .unwrap();
    }

    pub async fn hang_up(&self) {
        self.inbound.send(TelephonyEvent::Closed).await.unwrap();
    }
}

/// Drive a media handle like the socket relay does: forward audio, confirm close.
pub fn spawn_transport(handle: MediaStreamHandle) -> FakeTransport {
    let MediaStreamHandle {
        events,
        mut commands,
        ..
    } = handle;
    let inbound = events.clone();
    let (audio_tx, outbound) = mpsc::unbounded_channel();

    let closed = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                TelephonyCommand::Audio(frame) => {
                    let _ = audio_tx.send(frame);
                }
                TelephonyCommand::Close => {
                    let _ = events.send(TelephonyEvent::Closed).await;
                    return true;
                }
            }
        }
        false
    });

    FakeTransport {
        inbound,
        outbound,
        closed,
    }
}
