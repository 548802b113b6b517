//! Grok voice agent client against a local WebSocket server.

mod mock_providers;

use std::time::Duration;

use base64::prelude::*;
use bytes::Bytes;
use serde_json::json;

use callrelay_gateway::core::realtime::{
    ConnectionState, GrokConfig, GrokVoiceConnector, Persona, RealtimeError, RealtimeEvent,
    VoiceAiConnector,
};

use mock_providers::grok_mock::{GrokMock, MockReply};

fn connector(url: &str) -> GrokVoiceConnector {
    GrokVoiceConnector::new(
        GrokConfig::new("xai-test-key")
            .with_url(url)
            .with_connect_timeout(Duration::from_secs(2)),
    )
    .unwrap()
}

fn persona() -> Persona {
    Persona {
        instructions: "You answer questions about opening hours.".to_string(),
        voice: "Leo".to_string(),
        language: Some("fr".to_string()),
        ..Persona::default()
    }
}

async fn next_event(events: &mut callrelay_gateway::core::realtime::RealtimeEvents) -> RealtimeEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_session_update_precedes_audio() {
    let mut mock = GrokMock::start().await;
    let connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();
    let mut leg = connection.leg;

    // Sent immediately, without waiting for the server to acknowledge.
    leg.send_audio(Bytes::from_static(b"\x00\x01\x02")).await;

    let first = mock.next_message().await.unwrap();
    assert_eq!(first["type"], "session.update");
    assert_eq!(first["session"]["voice"], "Leo");
    assert_eq!(first["session"]["model"], "grok-voice-agent");
    assert_eq!(first["session"]["turn_detection"]["type"], "server_vad");
    let instructions = first["session"]["instructions"].as_str().unwrap();
    assert!(instructions.starts_with("You answer questions about opening hours."));
    assert!(instructions.contains("fr"));

    let second = mock.next_message().await.unwrap();
    assert_eq!(second["type"], "input_audio_buffer.append");
    assert_eq!(second["audio"], BASE64_STANDARD.encode(b"\x00\x01\x02"));

    assert_eq!(mock.authorization().as_deref(), Some("Bearer xai-test-key"));
    leg.disconnect().await;
}

#[tokio::test]
async fn test_server_events_arrive_in_order() {
    let mock = GrokMock::start().await;
    let mut connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();

    mock.reply(MockReply::Json(json!({"type": "session.created", "session": {}})));
    mock.reply(MockReply::Json(json!({"type": "session.updated"})));
    mock.reply(MockReply::Json(json!({
        "type": "response.audio.delta",
        "delta": BASE64_STANDARD.encode(b"pcm-1"),
        "response_id": "resp_1"
    })));
    mock.reply(MockReply::Raw("not json".to_string()));
    mock.reply(MockReply::Json(json!({"type": "input_audio_buffer.speech_started"})));
    mock.reply(MockReply::Json(json!({"type": "response.text.delta", "delta": "Bonjour"})));
    mock.reply(MockReply::Json(json!({"type": "response.audio.done"})));

    let events = &mut connection.events;
    assert_eq!(next_event(events).await, RealtimeEvent::SessionCreated);
    assert_eq!(next_event(events).await, RealtimeEvent::SessionUpdated);
    assert_eq!(
        next_event(events).await,
        RealtimeEvent::AudioDelta(Bytes::from_static(b"pcm-1"))
    );
    assert_eq!(
        next_event(events).await,
        RealtimeEvent::TranscriptDelta("Bonjour".to_string())
    );
    assert_eq!(next_event(events).await, RealtimeEvent::AudioDone);

    connection.leg.disconnect().await;
}

#[tokio::test]
async fn test_provider_error_is_surfaced() {
    let mock = GrokMock::start().await;
    let mut connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();

    mock.reply(MockReply::Json(json!({
        "type": "error",
        "error": {"type": "server_error", "code": "overloaded", "message": "try later"}
    })));

    assert_eq!(
        next_event(&mut connection.events).await,
        RealtimeEvent::Error(RealtimeError::ProviderError("try later".to_string()))
    );
}

#[tokio::test]
async fn test_incomplete_error_envelopes_are_still_errors() {
    let mock = GrokMock::start().await;
    let mut connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();

    mock.reply(MockReply::Json(json!({"type": "error", "error": {"code": "rate_limited"}})));
    mock.reply(MockReply::Json(json!({"type": "error", "error": "boom"})));
    mock.reply(MockReply::Json(json!({"type": "error"})));

    let events = &mut connection.events;
    assert_eq!(
        next_event(events).await,
        RealtimeEvent::Error(RealtimeError::ProviderError("rate_limited".to_string()))
    );
    assert_eq!(
        next_event(events).await,
        RealtimeEvent::Error(RealtimeError::ProviderError("boom".to_string()))
    );
    assert!(matches!(
        next_event(events).await,
        RealtimeEvent::Error(RealtimeError::ProviderError(_))
    ));

    connection.leg.disconnect().await;
}

#[tokio::test]
async fn test_server_close_emits_closed_once() {
    let mock = GrokMock::start().await;
    let mut connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();
    assert!(connection.leg.is_active());

    mock.reply(MockReply::Close);

    assert_eq!(next_event(&mut connection.events).await, RealtimeEvent::Closed);
    let after = tokio::time::timeout(Duration::from_secs(1), connection.events.recv()).await;
    assert!(matches!(after, Ok(None)), "expected channel end, got {after:?}");
    assert!(!connection.leg.is_active());
    assert_eq!(
        connection.leg.connection_state(),
        ConnectionState::Disconnected
    );

    // Sending after the transport closed is dropped, not an error or a reconnect.
    connection.leg.send_audio(Bytes::from_static(b"late")).await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut mock = GrokMock::start().await;
    let mut connection = connector(&mock.url).connect("CA123", &persona()).await.unwrap();
    let _ = mock.next_message().await;

    connection.leg.disconnect().await;
    connection.leg.disconnect().await;
    assert!(!connection.leg.is_active());

    connection.leg.send_audio(Bytes::from_static(b"ignored")).await;
    assert!(mock.next_message().await.is_none());
}

#[tokio::test]
async fn test_rejected_handshake_is_connect_error() {
    let mock = GrokMock::rejecting(401).await;
    let result = connector(&mock.url).connect("CA123", &persona()).await;

    match result {
        Err(RealtimeError::ConnectError(message)) => assert!(message.contains("401")),
        other => panic!("expected connect error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connect_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}/v1/voice", listener.local_addr().unwrap());
    drop(listener);

    let result = connector(&url).connect("CA123", &persona()).await;
    assert!(matches!(result, Err(RealtimeError::ConnectError(_))));
}
