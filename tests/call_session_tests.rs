//! Call session lifecycle tests.
//!
//! Each test drives a real `CallSession` against a fake carrier, a scripted
//! voice AI and an in-memory ledger, playing the media socket through the
//! leg's channels.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::Notify;

use callrelay_gateway::core::agents::AgentDirectory;
use callrelay_gateway::core::ledger::{CallOutcome, DebitOutcome, InMemoryWallet};
use callrelay_gateway::core::realtime::{
    GrokConfig, GrokVoiceConnector, Persona, RealtimeError, RealtimeEvent,
};
use callrelay_gateway::core::session::{
    CallSession, CloseReason, SessionContext, SessionError, SessionReport, SessionState,
    SessionTracker,
};
use callrelay_gateway::core::telephony::{CallStatus, TelephonyError, media_channel};

use mock_providers::grok_mock::{GrokMock, MockReply};
use mock_providers::{
    ConnectBehavior, FakeCarrier, FakeTransport, ScriptedVoiceAi, eventually,
    inbound_metadata, memory_ledger, spawn_transport, support_agent, wait_until,
};

const CALL_SID: &str = "CA123";

struct Harness {
    context: SessionContext,
    carrier: Arc<FakeCarrier>,
    voice_ai: Arc<ScriptedVoiceAi>,
    wallet: Arc<InMemoryWallet>,
}

fn harness(behavior: ConnectBehavior) -> Harness {
    let carrier = Arc::new(FakeCarrier::new().with_call(inbound_metadata(CALL_SID)));
    harness_with_carrier(carrier, behavior)
}

fn harness_with_carrier(carrier: Arc<FakeCarrier>, behavior: ConnectBehavior) -> Harness {
    let voice_ai = Arc::new(ScriptedVoiceAi::new(behavior));
    let wallet = Arc::new(InMemoryWallet::new().with_balance("user-1", 5.0));
    let agents = Arc::new(AgentDirectory::new(
        vec![support_agent()],
        Persona::default(),
    ));

    let context = SessionContext {
        carrier: carrier.clone(),
        voice_ai: voice_ai.clone(),
        ledger: memory_ledger(wallet.clone()),
        agents,
    };

    Harness {
        context,
        carrier,
        voice_ai,
        wallet,
    }
}

fn start(harness: &Harness) -> (tokio::task::JoinHandle<SessionReport>, FakeTransport) {
    let (leg, events, handle) = media_channel(CALL_SID);
    let transport = spawn_transport(handle);
    let session = CallSession::new(harness.context.clone(), leg);
    assert_eq!(session.state(), SessionState::Initializing);
    (tokio::spawn(session.run(events)), transport)
}

async fn finish(task: tokio::task::JoinHandle<SessionReport>) -> SessionReport {
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("session did not finish")
        .expect("session panicked")
}

#[tokio::test]
async fn test_inbound_call_relays_audio_both_ways() {
    let h = harness(ConnectBehavior::Open);
    let (task, mut transport) = start(&h);

    let remote = h.voice_ai.remote().await;
    assert_eq!(remote.call_sid, CALL_SID);
    assert_eq!(remote.persona.instructions, "You are the support line for Acme.");
    assert_eq!(remote.persona.voice, "Eve");

    let record = h
        .context
        .ledger
        .call_record(CALL_SID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, CallStatus::InProgress);
    assert_eq!(record.agent_id.as_deref(), Some("agent-support"));
    assert_eq!(record.user_id.as_deref(), Some("user-1"));
    assert!(record.ended_at.is_none());

    transport.frame(b"caller-1").await;
    transport.frame(b"caller-2").await;
    assert!(wait_until(|| remote.received().len() == 2).await);
    assert_eq!(
        remote.received(),
        vec![Bytes::from_static(b"caller-1"), Bytes::from_static(b"caller-2")]
    );

    remote
        .emit(RealtimeEvent::AudioDelta(Bytes::from_static(b"agent-1")))
        .await;
    let played = tokio::time::timeout(Duration::from_secs(2), transport.outbound.recv())
        .await
        .unwrap();
    assert_eq!(played, Some(Bytes::from_static(b"agent-1")));

    remote
        .emit(RealtimeEvent::TranscriptDelta("Hello, ".to_string()))
        .await;
    remote
        .emit(RealtimeEvent::TranscriptDelta("how can I help?".to_string()))
        .await;
    let ledger = h.context.ledger.clone();
    assert!(
        eventually(|| {
            let ledger = ledger.clone();
            async move {
                ledger
                    .call_record(CALL_SID)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|r| r.transcript)
                    .as_deref()
                    == Some("Hello, how can I help?")
            }
        })
        .await
    );

    transport.hang_up().await;
    let report = finish(task).await;

    assert_eq!(report.state, SessionState::Closed);
    assert_eq!(report.reason, CloseReason::TelephonyClosed);
    assert_eq!(report.stats.frames_to_voice_ai, 2);
    assert_eq!(report.stats.frames_to_caller, 1);
    assert_eq!(report.stats.early_frames_dropped, 0);
    assert_eq!(remote.disconnect_calls(), 1);
    // The caller hung up, so there is nothing to terminate.
    assert!(h.carrier.terminated().is_empty());

    let entry = report.entry.expect("session finalizes the entry");
    assert_eq!(entry.status, CallStatus::Completed);
    assert_eq!(entry.cost.duration_seconds, entry.duration_seconds());
}

#[tokio::test]
async fn test_voice_ai_error_hangs_up_the_call() {
    let h = harness(ConnectBehavior::Open);
    let (task, transport) = start(&h);

    let remote = h.voice_ai.remote().await;
    remote
        .emit(RealtimeEvent::Error(RealtimeError::ProviderError(
            "model overloaded".to_string(),
        )))
        .await;

    let report = finish(task).await;
    assert_eq!(
        report.reason,
        CloseReason::VoiceAiError(RealtimeError::ProviderError("model overloaded".to_string()))
    );
    assert_eq!(h.carrier.terminated(), vec![CALL_SID.to_string()]);
    assert!(transport.closed.await.unwrap(), "media stream was not closed");
    assert_eq!(remote.disconnect_calls(), 1);

    let entry = report.entry.unwrap();
    assert_eq!(entry.status, CallStatus::Completed);
    let record = h
        .context
        .ledger
        .call_record(CALL_SID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn test_error_envelope_without_details_hangs_up_the_call() {
    let mut mock = GrokMock::start().await;
    let mut h = harness(ConnectBehavior::Open);
    h.context.voice_ai = Arc::new(
        GrokVoiceConnector::new(GrokConfig::new("xai-test-key").with_url(&mock.url)).unwrap(),
    );
    let (task, transport) = start(&h);

    let first = mock.next_message().await.unwrap();
    assert_eq!(first["type"], "session.update");
    mock.reply(MockReply::Json(json!({"type": "error"})));

    let report = finish(task).await;
    assert!(matches!(
        report.reason,
        CloseReason::VoiceAiError(RealtimeError::ProviderError(_))
    ));
    assert_eq!(h.carrier.terminated(), vec![CALL_SID.to_string()]);
    assert!(transport.closed.await.unwrap());
    assert_eq!(report.entry.unwrap().status, CallStatus::Completed);
}

#[tokio::test]
async fn test_voice_ai_close_ends_the_call() {
    let h = harness(ConnectBehavior::Open);
    let (task, transport) = start(&h);

    let remote = h.voice_ai.remote().await;
    remote.emit(RealtimeEvent::SessionUpdated).await;
    remote.emit(RealtimeEvent::Closed).await;

    let report = finish(task).await;
    assert_eq!(report.reason, CloseReason::VoiceAiClosed);
    assert_eq!(h.carrier.terminated(), vec![CALL_SID.to_string()]);
    assert!(transport.closed.await.unwrap());
}

#[tokio::test]
async fn test_frames_before_voice_ai_ready_are_dropped() {
    let gate = Arc::new(Notify::new());
    let h = harness(ConnectBehavior::Gated(gate.clone()));
    let (task, transport) = start(&h);

    assert!(wait_until(|| h.voice_ai.attempts() == 1).await);
    transport.frame(b"early-1").await;
    transport.frame(b"early-2").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    gate.notify_one();
    let remote = h.voice_ai.remote().await;
    transport.frame(b"live").await;
    assert!(wait_until(|| remote.received().len() == 1).await);

    transport.hang_up().await;
    let report = finish(task).await;

    assert_eq!(report.stats.early_frames_dropped, 2);
    assert_eq!(report.stats.frames_to_voice_ai, 1);
    assert_eq!(remote.received(), vec![Bytes::from_static(b"live")]);
}

#[tokio::test]
async fn test_connect_failure_closes_entry_as_failed_at_zero_cost() {
    let h = harness(ConnectBehavior::Refuse(RealtimeError::ConnectError(
        "handshake rejected with HTTP 401 Unauthorized".to_string(),
    )));
    let (task, transport) = start(&h);

    let report = finish(task).await;
    assert!(matches!(report.reason, CloseReason::ConnectFailed(_)));
    assert_eq!(report.state, SessionState::Closed);
    assert_eq!(h.carrier.terminated(), vec![CALL_SID.to_string()]);
    assert!(transport.closed.await.unwrap());

    let entry = report.entry.unwrap();
    assert_eq!(entry.status, CallStatus::Failed);
    assert_eq!(entry.cost.duration_seconds, 0);
    assert_eq!(entry.cost.total, 0.0);
    assert_eq!(entry.debit, DebitOutcome::Skipped("zero cost"));
    assert!(h.wallet.debits_for("user-1").is_empty());
    assert_eq!(h.wallet.balance("user-1"), 5.0);
}

#[tokio::test]
async fn test_slow_connect_failure_records_consistent_end_time() {
    let h = harness(ConnectBehavior::RefuseAfter(
        Duration::from_millis(1200),
        RealtimeError::ConnectError("timed out".to_string()),
    ));
    let (task, _transport) = start(&h);

    let report = finish(task).await;
    let entry = report.entry.unwrap();
    assert_eq!(entry.status, CallStatus::Failed);
    assert_eq!(entry.duration_seconds(), 0);
    assert_eq!(entry.ended_at, entry.started_at);

    let record = h
        .context
        .ledger
        .call_record(CALL_SID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.duration_seconds, Some(0));
    assert_eq!(record.ended_at, Some(record.started_at));
}

#[tokio::test]
async fn test_caller_leaving_during_connect_completes_the_call() {
    let gate = Arc::new(Notify::new());
    let h = harness(ConnectBehavior::Gated(gate));
    let (task, transport) = start(&h);

    assert!(wait_until(|| h.voice_ai.attempts() == 1).await);
    transport.hang_up().await;

    let report = finish(task).await;
    assert_eq!(report.reason, CloseReason::TelephonyClosed);
    assert_eq!(report.entry.unwrap().status, CallStatus::Completed);
    assert!(h.carrier.terminated().is_empty());
}

#[tokio::test]
async fn test_metadata_failure_aborts_without_ledger_entry() {
    let h = harness_with_carrier(Arc::new(FakeCarrier::new()), ConnectBehavior::Open);
    let (task, transport) = start(&h);

    let report = finish(task).await;
    assert!(matches!(
        report.reason,
        CloseReason::SetupFailed(SessionError::Telephony(
            TelephonyError::CarrierLookupError { .. }
        ))
    ));
    assert!(report.entry.is_none());
    assert_eq!(h.voice_ai.attempts(), 0);
    assert!(transport.closed.await.unwrap());
    assert!(
        h.context
            .ledger
            .call_record(CALL_SID)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_status_callback_wins_finalization_race() {
    let h = harness(ConnectBehavior::Open);
    let (task, transport) = start(&h);
    let _remote = h.voice_ai.remote().await;

    // Carrier reports the call as over before the media stream closes.
    let entry = h
        .context
        .ledger
        .close_entry(CALL_SID, Some(90), CallOutcome::Completed)
        .await
        .unwrap();
    assert_eq!(entry.cost.total, 0.0945);
    assert_eq!(entry.debit, DebitOutcome::Debited);

    transport.hang_up().await;
    let report = finish(task).await;

    assert!(report.entry.is_none());
    let record = h
        .context
        .ledger
        .call_record(CALL_SID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.duration_seconds, Some(90));
    assert_eq!(record.cost_usd, Some(0.0945));
    assert_eq!(h.wallet.debits_for("user-1").len(), 1);
    assert!((h.wallet.balance("user-1") - 4.9055).abs() < 1e-9);
}

#[tokio::test]
async fn test_tracker_counts_and_drains_sessions() {
    let h = harness(ConnectBehavior::Open);
    let tracker = SessionTracker::new();

    let (leg, events, handle) = media_channel(CALL_SID);
    let transport = spawn_transport(handle);
    let report = tracker.spawn(CallSession::new(h.context.clone(), leg), events);

    let _remote = h.voice_ai.remote().await;
    assert_eq!(tracker.active_sessions(), 1);

    let token = tracker.shutdown_token();
    let inbound = transport.inbound.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        let _ = inbound
            .send(callrelay_gateway::core::telephony::TelephonyEvent::Closed)
            .await;
    });

    assert!(tracker.drain(Duration::from_secs(5)).await);
    assert!(tracker.is_shutting_down());
    assert_eq!(tracker.active_sessions(), 0);
    assert_eq!(report.await.unwrap().reason, CloseReason::TelephonyClosed);
}
