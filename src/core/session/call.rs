//! One call: a telephony leg paired with a voice-AI leg.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::agents::AgentDirectory;
use crate::core::ledger::{CallLedger, CallOutcome, LedgerEntry, LedgerError, NewCall};
use crate::core::realtime::{RealtimeError, RealtimeEvent, VoiceAiConnector, VoiceAiLeg};
use crate::core::telephony::{
    CarrierClient, TelephonyError, TelephonyEvent, TelephonyEvents, TelephonyLeg,
};

/// How long teardown waits for the media transport to confirm its close.
const TELEPHONY_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// How long teardown waits for queued transcript text to be written.
const TRANSCRIPT_FLUSH_GRACE: Duration = Duration::from_secs(5);

/// Failures that end a session before it relays any audio.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Telephony(#[from] TelephonyError),

    #[error(transparent)]
    VoiceAi(#[from] RealtimeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Why the session left INITIALIZING or ACTIVE.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Metadata lookup or ledger open failed; no entry to finalize
    SetupFailed(SessionError),
    /// The voice-AI leg never opened
    ConnectFailed(RealtimeError),
    /// The carrier media stream ended
    TelephonyClosed,
    /// The voice-AI service closed the connection
    VoiceAiClosed,
    /// The voice-AI service reported an error
    VoiceAiError(RealtimeError),
}

impl CloseReason {
    fn outcome(&self) -> (Option<u64>, CallOutcome) {
        match self {
            Self::ConnectFailed(_) => (Some(0), CallOutcome::Failed),
            _ => (None, CallOutcome::Completed),
        }
    }
}

/// Frame counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_to_voice_ai: u64,
    pub frames_to_caller: u64,
    pub early_frames_dropped: u64,
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub call_sid: String,
    pub state: SessionState,
    pub reason: CloseReason,
    /// The ledger entry this session finalized, if it was the one to do so
    pub entry: Option<LedgerEntry>,
    pub stats: RelayStats,
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub carrier: Arc<dyn CarrierClient>,
    pub voice_ai: Arc<dyn VoiceAiConnector>,
    pub ledger: CallLedger,
    pub agents: Arc<AgentDirectory>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("carrier", &self.carrier.provider_name())
            .field("voice_ai", &self.voice_ai.provider_name())
            .field("ledger", &self.ledger)
            .finish()
    }
}

/// Orchestrates one call from media-stream accept to ledger finalization.
///
/// The session owns both legs exclusively. All relay decisions happen in
/// [`run`](Self::run), a single task that selects over the two legs' event
/// channels.
pub struct CallSession {
    call_sid: String,
    state: SessionState,
    context: SessionContext,
    telephony: TelephonyLeg,
    voice: Option<Box<dyn VoiceAiLeg>>,
    stats: RelayStats,
}

impl CallSession {
    pub fn new(context: SessionContext, telephony: TelephonyLeg) -> Self {
        Self {
            call_sid: telephony.call_sid().to_string(),
            state: SessionState::Initializing,
            context,
            telephony,
            voice: None,
            stats: RelayStats::default(),
        }
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(
                call_sid = %self.call_sid,
                from = self.state.as_str(),
                to = next.as_str(),
                "Session state change"
            );
            self.state = next;
        }
    }

    /// Drive the call to completion. Never panics on leg failures; every
    /// error ends in a [`SessionReport`].
    pub async fn run(mut self, mut telephony_events: TelephonyEvents) -> SessionReport {
        info!(call_sid = %self.call_sid, "Call session started");

        let metadata = match self.context.carrier.fetch_call_metadata(&self.call_sid).await {
            Ok(metadata) => metadata,
            Err(e) => return self.abort(e.into()).await,
        };

        let agent = self.context.agents.resolve(&metadata);
        let call = NewCall::from_metadata(&metadata)
            .with_owner(agent.agent_id.clone(), agent.user_id.clone());

        // Relay must not start until the entry exists.
        if let Err(e) = self.context.ledger.open_entry(call).await {
            return self.abort(e.into()).await;
        }

        let connector = Arc::clone(&self.context.voice_ai);
        let call_sid = self.call_sid.clone();
        let connected = {
            let connect = connector.connect(&call_sid, &agent.persona);
            tokio::pin!(connect);
            loop {
                select! {
                    result = &mut connect => break Some(result),
                    event = telephony_events.recv() => match event {
                        Some(TelephonyEvent::Frame(_)) => {
                            self.stats.early_frames_dropped += 1;
                            warn!(
                                call_sid = %call_sid,
                                "Dropping caller frame received before the voice-AI leg is ready"
                            );
                        }
                        Some(TelephonyEvent::Closed) | None => break None,
                    },
                }
            }
        };

        let connection = match connected {
            Some(Ok(connection)) => connection,
            Some(Err(e)) => {
                error!(call_sid = %self.call_sid, "Voice-AI connect failed: {}", e);
                return self
                    .close(CloseReason::ConnectFailed(e), &mut telephony_events, None)
                    .await;
            }
            None => {
                info!(call_sid = %self.call_sid, "Caller left before the voice-AI leg opened");
                return self
                    .close(CloseReason::TelephonyClosed, &mut telephony_events, None)
                    .await;
            }
        };

        let mut voice_events = connection.events;
        self.voice = Some(connection.leg);
        self.transition(SessionState::Active);
        info!(
            call_sid = %self.call_sid,
            provider = self.context.voice_ai.provider_name(),
            "Call session active"
        );

        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let transcript_writer = spawn_transcript_writer(
            self.context.ledger.clone(),
            self.call_sid.clone(),
            transcript_rx,
        );

        let reason = loop {
            select! {
                event = telephony_events.recv() => match event {
                    Some(TelephonyEvent::Frame(frame)) => {
                        if let Some(voice) = self.voice.as_mut() {
                            voice.send_audio(frame).await;
                            self.stats.frames_to_voice_ai += 1;
                        }
                    }
                    Some(TelephonyEvent::Closed) | None => break CloseReason::TelephonyClosed,
                },
                event = voice_events.recv() => match event {
                    Some(RealtimeEvent::AudioDelta(audio)) => {
                        if self.telephony.emit_audio_frame(audio).await {
                            self.stats.frames_to_caller += 1;
                        }
                    }
                    Some(RealtimeEvent::TranscriptDelta(text)) => {
                        let _ = transcript_tx.send(text);
                    }
                    Some(RealtimeEvent::Error(e)) => {
                        error!(call_sid = %self.call_sid, "Voice-AI error: {}", e);
                        break CloseReason::VoiceAiError(e);
                    }
                    Some(RealtimeEvent::Closed) | None => break CloseReason::VoiceAiClosed,
                    Some(other) => {
                        debug!(call_sid = %self.call_sid, event = ?other, "Voice-AI event");
                    }
                },
            }
        };

        drop(transcript_tx);
        self.close(reason, &mut telephony_events, Some(transcript_writer))
            .await
    }

    /// Setup failed before anything billable existed.
    async fn abort(mut self, cause: SessionError) -> SessionReport {
        error!(call_sid = %self.call_sid, "Call session aborted: {}", cause);
        self.transition(SessionState::Closing);
        self.telephony.close().await;
        self.transition(SessionState::Closed);

        SessionReport {
            call_sid: self.call_sid,
            state: self.state,
            reason: CloseReason::SetupFailed(cause),
            entry: None,
            stats: self.stats,
        }
    }

    /// Tear down both legs, then finalize the ledger entry exactly once.
    async fn close(
        mut self,
        reason: CloseReason,
        telephony_events: &mut TelephonyEvents,
        transcript_writer: Option<JoinHandle<()>>,
    ) -> SessionReport {
        self.transition(SessionState::Closing);

        if let Some(mut voice) = self.voice.take() {
            voice.disconnect().await;
        }

        let carrier_gone = reason == CloseReason::TelephonyClosed;
        if !carrier_gone {
            if let Err(e) = self.context.carrier.terminate(&self.call_sid).await {
                warn!(call_sid = %self.call_sid, "Failed to terminate call: {}", e);
            }
            self.telephony.close().await;
            wait_for_telephony_close(&self.call_sid, telephony_events).await;
        } else {
            self.telephony.close().await;
        }

        if let Some(writer) = transcript_writer
            && tokio::time::timeout(TRANSCRIPT_FLUSH_GRACE, writer).await.is_err()
        {
            warn!(call_sid = %self.call_sid, "Transcript flush timed out");
        }

        let (duration, outcome) = reason.outcome();
        let entry = match self
            .context
            .ledger
            .close_entry(&self.call_sid, duration, outcome)
            .await
        {
            Ok(entry) => Some(entry),
            Err(LedgerError::AlreadyFinalized(_)) => {
                info!(call_sid = %self.call_sid, "Ledger entry already finalized by status callback");
                None
            }
            Err(e) => {
                error!(call_sid = %self.call_sid, "Failed to finalize ledger entry: {}", e);
                None
            }
        };

        self.transition(SessionState::Closed);
        info!(
            call_sid = %self.call_sid,
            reason = ?reason,
            frames_to_voice_ai = self.stats.frames_to_voice_ai,
            frames_to_caller = self.stats.frames_to_caller,
            "Call session closed"
        );

        SessionReport {
            call_sid: self.call_sid,
            state: self.state,
            reason,
            entry,
            stats: self.stats,
        }
    }
}

async fn wait_for_telephony_close(call_sid: &str, events: &mut TelephonyEvents) {
    let drained = tokio::time::timeout(TELEPHONY_CLOSE_GRACE, async {
        while let Some(event) = events.recv().await {
            if event == TelephonyEvent::Closed {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(call_sid = %call_sid, "Media transport did not confirm close");
    }
}

/// Writes transcript deltas in arrival order, coalescing whatever is queued.
fn spawn_transcript_writer(
    ledger: CallLedger,
    call_sid: String,
    mut deltas: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut text) = deltas.recv().await {
            while let Ok(more) = deltas.try_recv() {
                text.push_str(&more);
            }
            ledger.append_transcript(&call_sid, &text).await;
        }
    })
}
