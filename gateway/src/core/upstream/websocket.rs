use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};
use tracing::{debug, error, info, warn};
use url::Url;

use super::connector::{UpstreamChannel, UpstreamConnector, UpstreamError, UpstreamResult};
use super::messages::{ClientEvent, decode_server_event};
use crate::core::codec::CodecError;

/// Buffer size for the per-channel outbound and inbound queues
const WS_CHANNEL_CAPACITY: usize = 1024;

/// Opens upstream channels over a WebSocket carrying the JSON event protocol.
///
/// Each channel owns one connection task that serializes outbound events in
/// order and decodes inbound frames in arrival order. Connections are never
/// re-established: a dropped connection surfaces as an error on the inbound
/// stream and the session is expected to close.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    api_key: Option<String>,
    channel_capacity: usize,
}

impl WebSocketConnector {
    pub fn new(url: &str, api_key: Option<String>) -> UpstreamResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| UpstreamError::ConnectionFailed(format!("invalid upstream URL: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(UpstreamError::ConnectionFailed(format!(
                "upstream URL must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            api_key,
            channel_capacity: WS_CHANNEL_CAPACITY,
        })
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl UpstreamConnector for WebSocketConnector {
    async fn connect(&self, session_id: &str) -> UpstreamResult<UpstreamChannel> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::ConnectionFailed(e.to_string()))?;

        let headers = request.headers_mut();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| UpstreamError::ConnectionFailed(e.to_string()))?;
            headers.insert(http::header::AUTHORIZATION, value);
        }
        if let Ok(value) = HeaderValue::from_str(session_id) {
            headers.insert("x-session-id", value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| UpstreamError::ConnectionFailed(e.to_string()))?;

        info!(session_id = %session_id, url = %self.url, "Connected to upstream model");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientEvent>(self.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.channel_capacity);
        let session_id = session_id.to_string();

        let handle = tokio::spawn(async move {
            let mut outbound_open = true;

            loop {
                tokio::select! {
                    // Handle outgoing events
                    event = outbound_rx.recv(), if outbound_open => match event {
                        Some(event) => {
                            let json = match event.to_wire() {
                                Ok(json) => json,
                                Err(e) => {
                                    error!(session_id = %session_id, "Failed to serialize {}: {}", event.name(), e);
                                    continue;
                                }
                            };

                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                error!(session_id = %session_id, "Failed to send upstream message: {}", e);
                                let _ = inbound_tx.send(Err(UpstreamError::WebSocket(e.to_string()))).await;
                                break;
                            }
                        }
                        None => {
                            // The session has finished sending; close our half and
                            // keep reading until the model closes its side.
                            debug!(session_id = %session_id, "Outbound queue closed, closing upstream WebSocket");
                            outbound_open = false;
                            if let Err(e) = ws_sink.close().await {
                                warn!(session_id = %session_id, "Failed to close upstream WebSocket: {}", e);
                                break;
                            }
                        }
                    },

                    // Handle incoming frames
                    msg = ws_stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => match decode_server_event(&text) {
                            Ok(Some(event)) => {
                                if inbound_tx.send(Ok(event)).await.is_err() {
                                    debug!(session_id = %session_id, "Session dropped the inbound stream");
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(CodecError::UnknownEventKind(kind)) => {
                                debug!(session_id = %session_id, "Skipping unknown upstream event kind: {}", kind);
                            }
                            Err(e) => {
                                warn!(session_id = %session_id, "Failed to decode upstream frame: {}", e);
                                if inbound_tx.send(Err(UpstreamError::Protocol(e.to_string()))).await.is_err() {
                                    break;
                                }
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                error!(session_id = %session_id, "Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            if outbound_open {
                                warn!(session_id = %session_id, "Upstream closed the connection unexpectedly");
                                let _ = inbound_tx.send(Err(UpstreamError::Closed)).await;
                            } else {
                                debug!(session_id = %session_id, "Upstream confirmed close");
                            }
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            if outbound_open {
                                error!(session_id = %session_id, "Upstream WebSocket error: {}", e);
                                let _ = inbound_tx.send(Err(UpstreamError::WebSocket(e.to_string()))).await;
                            }
                            break;
                        }
                    },
                }
            }
        });

        Ok(UpstreamChannel::new(outbound_tx, inbound_rx, Some(handle)))
    }
}
