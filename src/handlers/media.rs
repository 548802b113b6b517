//! Carrier media-stream WebSocket.
//!
//! The upgrade task owns the socket and acts as the transport for the
//! call's telephony leg. The call session itself runs in its own task,
//! tracked by [`SessionTracker`](crate::core::session::SessionTracker).

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::session::CallSession;
use crate::core::telephony::{
    MediaStreamHandle, TelephonyCommand, TelephonyEvent, accept_connection, media_channel,
};
use crate::middleware::ClientIp;
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct MediaStreamQuery {
    #[serde(rename = "callSid")]
    pub call_sid: Option<String>,
}

/// Releases the connection-limit slot when the media stream ends.
struct ConnectionSlot {
    state: Arc<AppState>,
    ip: Option<IpAddr>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(ip) = self.ip {
            self.state.release_connection(ip);
        }
    }
}

/// `GET /media-stream?callSid=...`
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaStreamQuery>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let slot = ConnectionSlot {
        state: state.clone(),
        ip: client_ip.map(|Extension(ClientIp(ip))| ip),
    };
    let ws = ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE);

    match accept_connection(query.call_sid.as_deref()) {
        Ok(call_sid) => {
            info!(call_sid = %call_sid, "Media stream upgrade requested");
            ws.on_upgrade(move |socket| async move {
                run_media_stream(socket, state, call_sid).await;
                drop(slot);
            })
        }
        Err(e) => {
            warn!("Refusing media stream: {}", e);
            ws.on_upgrade(move |socket| async move {
                refuse(socket, e.to_string()).await;
                drop(slot);
            })
        }
    }
}

async fn refuse(mut socket: WebSocket, reason: String) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

async fn run_media_stream(socket: WebSocket, state: Arc<AppState>, call_sid: String) {
    let (leg, events, handle) = media_channel(call_sid);
    let session = CallSession::new(state.session_context(), leg);
    state.sessions.spawn(session, events);

    relay_socket(socket, handle, state.sessions.shutdown_token()).await;
}

/// Shuttle frames between the carrier socket and the session until either
/// side closes. Emits [`TelephonyEvent::Closed`] exactly once on exit.
async fn relay_socket(socket: WebSocket, handle: MediaStreamHandle, shutdown: CancellationToken) {
    let MediaStreamHandle {
        call_sid,
        events,
        mut commands,
    } = handle;
    let (mut sink, mut stream) = socket.split();

    loop {
        select! {
            _ = shutdown.cancelled() => {
                info!(call_sid = %call_sid, "Closing media stream for shutdown");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            command = commands.recv() => match command {
                Some(TelephonyCommand::Audio(frame)) => {
                    if let Err(e) = sink.send(Message::Binary(frame)).await {
                        warn!(call_sid = %call_sid, "Failed to write media frame: {}", e);
                        break;
                    }
                }
                Some(TelephonyCommand::Close) | None => {
                    debug!(call_sid = %call_sid, "Closing media stream");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            message = stream.next() => {
                let frame = match message {
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        info!(call_sid = %call_sid, "Carrier closed media stream");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(call_sid = %call_sid, "Media stream error: {}", e);
                        break;
                    }
                };
                if events.send(TelephonyEvent::Frame(frame)).await.is_err() {
                    debug!(call_sid = %call_sid, "Session gone, closing media stream");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    let _ = events.send(TelephonyEvent::Closed).await;
}
