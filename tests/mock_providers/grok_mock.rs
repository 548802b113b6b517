//! WebSocket server speaking the Grok voice agent envelope protocol.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// What the mock sends to the gateway.
pub enum MockReply {
    Json(Value),
    Raw(String),
    Close,
}

pub struct GrokMock {
    pub url: String,
    /// Every JSON envelope the gateway sent, in order
    pub received: mpsc::UnboundedReceiver<Value>,
    replies: mpsc::UnboundedSender<MockReply>,
    authorization: Arc<Mutex<Option<String>>>,
}

impl GrokMock {
    /// Accept one connection and relay scripted replies to it.
    pub async fn start() -> Self {
        Self::start_with_status(None).await
    }

    /// Refuse the handshake with `status`.
    pub async fn rejecting(status: u16) -> Self {
        Self::start_with_status(Some(status)).await
    }

    async fn start_with_status(reject_with: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/voice", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (replies, mut reply_rx) = mpsc::unbounded_channel::<MockReply>();
        let authorization = Arc::new(Mutex::new(None));
        let seen_auth = authorization.clone();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let callback = move |request: &Request, response: Response| {
                *seen_auth.lock().unwrap() = request
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match reject_with {
                    Some(status) => {
                        let mut error = ErrorResponse::new(Some("rejected".to_string()));
                        *error.status_mut() = http::StatusCode::from_u16(status).unwrap();
                        Err(error)
                    }
                    None => Ok(response),
                }
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                return;
            };
            let (mut sink, mut source) = ws.split();

            loop {
                tokio::select! {
                    reply = reply_rx.recv() => match reply {
                        Some(MockReply::Json(value)) => {
                            let _ = sink.send(Message::Text(value.to_string().into())).await;
                        }
                        Some(MockReply::Raw(text)) => {
                            let _ = sink.send(Message::Text(text.into())).await;
                        }
                        Some(MockReply::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    incoming = source.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                let _ = received_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url,
            received,
            replies,
            authorization,
        }
    }

    pub fn reply(&self, reply: MockReply) {
        let _ = self.replies.send(reply);
    }

    pub fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    /// Next envelope from the gateway, waiting up to two seconds.
    pub async fn next_message(&mut self) -> Option<Value> {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }
}
