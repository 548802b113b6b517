//! Media side of the telephony leg.
//!
//! The carrier's media-stream WebSocket is owned by a transport task (see
//! `handlers::media`). The session never touches the socket: it talks to the
//! transport through two channels created by [`media_channel`].
//!
//! ```text
//!  carrier socket  <->  transport task  --TelephonyEvent-->   CallSession
//!                                       <--TelephonyCommand--  (TelephonyLeg)
//! ```

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{TelephonyError, TelephonyResult};

/// Frames buffered between the transport and the session, in each direction.
pub const MEDIA_CHANNEL_CAPACITY: usize = 1024;

/// What the transport reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    /// Raw frame from the carrier, untouched
    Frame(Bytes),
    /// The carrier connection is gone
    Closed,
}

/// What the session asks the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyCommand {
    /// Write an audio frame to the carrier
    Audio(Bytes),
    /// Close the carrier connection
    Close,
}

/// Receiving half of the telephony event stream.
pub type TelephonyEvents = mpsc::Receiver<TelephonyEvent>;

/// Longest call identifier accepted from a handshake.
const MAX_CALL_SID_LEN: usize = 64;

/// Validate the call identifier extracted from the media handshake.
///
/// The identifier ends up in carrier API paths and log fields, so only
/// ASCII letters, digits, `_` and `-` are accepted.
pub fn accept_connection(call_sid: Option<&str>) -> TelephonyResult<String> {
    let sid = match call_sid.map(str::trim) {
        Some(sid) if !sid.is_empty() => sid,
        _ => return Err(TelephonyError::MissingCallIdentifier),
    };

    let well_formed = sid.len() <= MAX_CALL_SID_LEN
        && sid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !well_formed {
        return Err(TelephonyError::InvalidCallIdentifier);
    }
    Ok(sid.to_string())
}

/// Create the channel pair linking a session to a media transport.
pub fn media_channel(call_sid: impl Into<String>) -> (TelephonyLeg, TelephonyEvents, MediaStreamHandle) {
    let call_sid = call_sid.into();
    let (event_tx, event_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);

    let leg = TelephonyLeg {
        call_sid: call_sid.clone(),
        commands: Some(command_tx),
    };
    let handle = MediaStreamHandle {
        call_sid,
        events: event_tx,
        commands: command_rx,
    };
    (leg, event_rx, handle)
}

/// Session-side handle for sending audio to the caller.
#[derive(Debug)]
pub struct TelephonyLeg {
    call_sid: String,
    commands: Option<mpsc::Sender<TelephonyCommand>>,
}

impl TelephonyLeg {
    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    /// Queue an audio frame for the caller. Returns false once the leg is closed.
    pub async fn emit_audio_frame(&self, frame: Bytes) -> bool {
        let Some(commands) = self.commands.as_ref() else {
            return false;
        };
        match commands.send(TelephonyCommand::Audio(frame)).await {
            Ok(()) => true,
            Err(_) => {
                warn!(call_sid = %self.call_sid, "Dropping audio frame, media transport gone");
                false
            }
        }
    }

    /// True until [`close`](Self::close) is called or the transport exits.
    pub fn is_open(&self) -> bool {
        self.commands.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Ask the transport to close the carrier connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(commands) = self.commands.take()
            && commands.send(TelephonyCommand::Close).await.is_err()
        {
            debug!(call_sid = %self.call_sid, "Media transport already closed");
        }
    }
}

/// Transport-side handle: publishes carrier frames, receives session commands.
#[derive(Debug)]
pub struct MediaStreamHandle {
    pub call_sid: String,
    pub events: mpsc::Sender<TelephonyEvent>,
    pub commands: mpsc::Receiver<TelephonyCommand>,
}
