//! Grok voice agent client.
//!
//! [`GrokVoiceConnector`] opens one WebSocket per call. Each connection is
//! driven by a spawned task that owns both halves of the socket: outgoing
//! client events arrive over an mpsc channel, incoming server events are
//! translated into [`RealtimeEvent`]s and pushed, in arrival order, onto the
//! leg's event channel.
//!
//! - Endpoint: `wss://api.x.ai/v1/voice` (configurable)
//! - Auth: `Authorization: Bearer <key>`
//! - Audio: opaque bytes, base64 encoded inside JSON envelopes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::config::GrokConfig;
use super::messages::{ClientEvent, ParsedServerMessage, ServerEvent, SessionConfig, parse_server_message};
use crate::core::realtime::base::{
    Persona, RealtimeError, RealtimeEvent, RealtimeResult, VoiceAiConnection, VoiceAiConnector,
    VoiceAiLeg,
};

/// Outgoing client events buffered per connection.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Incoming events buffered per connection.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long `disconnect` waits for the close handshake before aborting the task.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connector
// =============================================================================

/// Opens Grok voice agent connections. One instance is shared by all calls.
#[derive(Debug, Clone)]
pub struct GrokVoiceConnector {
    config: GrokConfig,
}

impl GrokVoiceConnector {
    pub fn new(config: GrokConfig) -> RealtimeResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GrokConfig {
        &self.config
    }

    async fn open_socket(&self) -> RealtimeResult<WsStream> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectError(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| RealtimeError::ConnectError("API key is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        match tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        {
            Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
            Ok(Err(e)) => Err(RealtimeError::ConnectError(describe_handshake_error(e))),
            Err(_) => Err(RealtimeError::ConnectError(format!(
                "handshake timed out after {}s",
                self.config.connect_timeout.as_secs_f32()
            ))),
        }
    }
}

fn describe_handshake_error(err: tungstenite::Error) -> String {
    match err {
        tungstenite::Error::Http(response) => {
            format!("handshake rejected with HTTP {}", response.status())
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl VoiceAiConnector for GrokVoiceConnector {
    async fn connect(
        &self,
        call_sid: &str,
        persona: &Persona,
    ) -> RealtimeResult<VoiceAiConnection> {
        let ws_stream = self.open_socket().await?;
        info!(call_sid = %call_sid, "Connected to Grok voice agent");

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<RealtimeEvent>(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        // Queued before the sender is handed out, so it precedes any audio.
        let session = SessionConfig::from_persona(persona, &self.config.model);
        tx.try_send(ClientEvent::SessionUpdate { session })
            .map_err(|e| RealtimeError::ConnectError(format!("failed to queue session.update: {e}")))?;
        debug!(call_sid = %call_sid, voice = %persona.voice, "Queued session configuration");

        let task = tokio::spawn(run_connection(
            call_sid.to_string(),
            ws_sink,
            ws_stream,
            rx,
            event_tx,
            connected.clone(),
        ));

        Ok(VoiceAiConnection {
            leg: Box::new(GrokVoiceLeg {
                call_sid: call_sid.to_string(),
                sender: Some(tx),
                connected,
                task: Some(task),
            }),
            events: event_rx,
        })
    }

    fn provider_name(&self) -> &'static str {
        "grok"
    }
}

// =============================================================================
// Connection task
// =============================================================================

async fn run_connection(
    call_sid: String,
    mut ws_sink: SplitSink<WsStream, Message>,
    mut ws_stream: SplitStream<WsStream>,
    mut rx: mpsc::Receiver<ClientEvent>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            error!(call_sid = %call_sid, "Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                        error!(call_sid = %call_sid, "Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                None => {
                    debug!(call_sid = %call_sid, "Voice leg released, closing socket");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            },

            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    dispatch_server_message(&call_sid, text.as_str(), &event_tx).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                        error!(call_sid = %call_sid, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(call_sid = %call_sid, ?frame, "Grok WebSocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(call_sid = %call_sid, "Grok WebSocket error: {}", e);
                    break;
                }
                None => {
                    info!(call_sid = %call_sid, "Grok WebSocket stream ended");
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = event_tx.send(RealtimeEvent::Closed).await;
    debug!(call_sid = %call_sid, "Grok connection task ended");
}

async fn dispatch_server_message(
    call_sid: &str,
    text: &str,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let event = match parse_server_message(text) {
        ParsedServerMessage::Event(event) => event,
        ParsedServerMessage::Unhandled(event_type) => {
            debug!(call_sid = %call_sid, event_type = %event_type, "Unhandled Grok message type");
            return;
        }
        ParsedServerMessage::Malformed(reason) => {
            warn!(call_sid = %call_sid, "Failed to parse Grok message: {}", reason);
            return;
        }
    };

    let translated = match event {
        ServerEvent::AudioDelta { delta, .. } => match BASE64_STANDARD.decode(delta.as_bytes()) {
            Ok(audio) => RealtimeEvent::AudioDelta(Bytes::from(audio)),
            Err(e) => {
                warn!(call_sid = %call_sid, "Dropping undecodable audio delta: {}", e);
                return;
            }
        },
        ServerEvent::AudioDone { .. } => {
            debug!(call_sid = %call_sid, "Audio response completed");
            RealtimeEvent::AudioDone
        }
        ServerEvent::TextDelta { delta } => {
            debug!(call_sid = %call_sid, "Grok text delta: {}", delta);
            RealtimeEvent::TranscriptDelta(delta)
        }
        ServerEvent::Error { error } => {
            error!(
                call_sid = %call_sid,
                code = ?error.code,
                "Grok error: {}",
                error.message
            );
            RealtimeEvent::Error(RealtimeError::ProviderError(error.message))
        }
        ServerEvent::SessionCreated { .. } => {
            info!(call_sid = %call_sid, "Grok session created");
            RealtimeEvent::SessionCreated
        }
        ServerEvent::SessionUpdated { .. } => {
            info!(call_sid = %call_sid, "Grok session updated");
            RealtimeEvent::SessionUpdated
        }
    };

    let _ = event_tx.send(translated).await;
}

// =============================================================================
// Leg handle
// =============================================================================

/// Per-call handle on a Grok connection.
pub struct GrokVoiceLeg {
    call_sid: String,
    sender: Option<mpsc::Sender<ClientEvent>>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl VoiceAiLeg for GrokVoiceLeg {
    async fn send_audio(&mut self, audio: Bytes) {
        if !self.is_active() {
            warn!(call_sid = %self.call_sid, "Cannot send audio - voice connection not open");
            return;
        }

        if let Some(sender) = self.sender.as_ref()
            && let Err(e) = sender.send(ClientEvent::audio_append(&audio)).await
        {
            warn!(call_sid = %self.call_sid, "Dropping audio chunk: {}", e);
        }
    }

    async fn disconnect(&mut self) {
        self.connected.store(false, Ordering::SeqCst);

        // Dropping the sender tells the task to send a close frame and exit.
        let Some(sender) = self.sender.take() else {
            return;
        };
        drop(sender);

        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err()
        {
            warn!(call_sid = %self.call_sid, "Close handshake timed out, aborting connection task");
            task.abort();
        }

        info!(call_sid = %self.call_sid, "Disconnected from Grok voice agent");
    }

    fn is_active(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }
}

impl Drop for GrokVoiceLeg {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
