//! Session WebSocket handler
//!
//! One WebSocket connection owns one [`DuplexSession`]. The connection task
//! reads client commands and applies them to the session; a forwarder task
//! drains the session's event subscription into the socket so session
//! operations can wait on the model without stalling event delivery.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::codec::ContentEvent;
use crate::core::knowledge::KnowledgeSource;
use crate::core::session::{DuplexSession, Subscription};
use crate::errors::{SessionError, SessionResult};
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::{SessionIncomingMessage, SessionMessageRoute, SessionOutgoingMessage};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long queued messages may take to reach the client after the session ends
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Session WebSocket handler
///
/// Upgrades the HTTP connection to a WebSocket carrying one duplex session.
pub async fn session_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ClientIp(ip))| ip.to_string());
    debug!(ip = ?client_ip, "Session WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_session_socket(socket, state, client_ip))
}

/// Handle the session WebSocket connection
async fn handle_session_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    client_ip: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<SessionMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, SessionMessageRoute::Close);

            let serialized = match &route {
                SessionMessageRoute::Outgoing(message) => serde_json::to_string(message),
                SessionMessageRoute::Event(event) => serde_json::to_string(event),
                SessionMessageRoute::Close => Ok(String::new()),
            };

            let result = match (route, serialized) {
                (SessionMessageRoute::Close, _) => {
                    debug!("Closing session WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
                (_, Ok(json_str)) => sender.send(Message::Text(json_str.into())).await,
                (_, Err(e)) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let session = match app_state.sessions.open_session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(ip = ?client_ip, "Failed to open session: {}", e);
            let _ = message_tx
                .send(SessionMessageRoute::error(e.code(), e.to_string()))
                .await;
            let _ = message_tx.send(SessionMessageRoute::Close).await;
            drop(message_tx);
            drain_sender(&mut sender_task).await;
            return;
        }
    };

    let session_id = session.id().to_string();
    info!(
        session_id = %session_id,
        ip = ?client_ip,
        "Session WebSocket connection established"
    );

    let subscription = session.subscribe(&[]);
    let subscription_id = subscription.id();

    let _ = message_tx
        .send(SessionMessageRoute::Outgoing(
            SessionOutgoingMessage::SessionCreated {
                session_id: session_id.clone(),
            },
        ))
        .await;

    let mut forward_task = tokio::spawn(forward_events(subscription, message_tx.clone()));
    let mut events_done = false;

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_session_message(msg, &session, &message_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Session WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Session WebSocket closed by client");
                        break;
                    }
                }
            }
            _ = &mut forward_task => {
                debug!(session_id = %session_id, "Session event stream ended");
                events_done = true;
                break;
            }
        }
    }

    // Cleanup
    if !session.is_closed()
        && let Err(e) = session.close().await
    {
        debug!(session_id = %session_id, "Session did not close gracefully: {}", e);
    }
    session.unsubscribe(subscription_id);

    if !events_done && tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut forward_task).await.is_err() {
        forward_task.abort();
    }
    drop(message_tx);
    drain_sender(&mut sender_task).await;

    info!(session_id = %session_id, "Session WebSocket connection terminated");
}

/// Copy session events to the socket until the stream completes.
async fn forward_events(mut subscription: Subscription, message_tx: mpsc::Sender<SessionMessageRoute>) {
    while let Some(event) = subscription.recv().await {
        let complete = matches!(event, ContentEvent::StreamComplete);
        if message_tx.send(SessionMessageRoute::Event(event)).await.is_err() {
            return;
        }
        if complete {
            let _ = message_tx.send(SessionMessageRoute::Close).await;
            return;
        }
    }
}

async fn drain_sender(sender_task: &mut JoinHandle<()>) {
    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut *sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }
}

/// Process incoming WebSocket message
async fn process_session_message(
    msg: Message,
    session: &Arc<DuplexSession>,
    message_tx: &mpsc::Sender<SessionMessageRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let incoming: SessionIncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(session_id = %session.id(), "Failed to parse session message: {}", e);
                    let _ = message_tx
                        .send(SessionMessageRoute::error(
                            "parse_error",
                            format!("Invalid message format: {e}"),
                        ))
                        .await;
                    return true;
                }
            };

            if let Err(e) = incoming.validate_size() {
                warn!(session_id = %session.id(), "Message validation failed: {}", e);
                let _ = message_tx
                    .send(SessionMessageRoute::error("validation_error", e))
                    .await;
                return true;
            }

            handle_session_incoming(incoming, session, message_tx).await
        }
        Message::Binary(data) => {
            let result = session.stream_audio_bytes(data).await;
            check_result(result, message_tx).await
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!(session_id = %session.id(), "Session WebSocket close received");
            false
        }
    }
}

/// Apply one client command to the session.
async fn handle_session_incoming(
    msg: SessionIncomingMessage,
    session: &Arc<DuplexSession>,
    message_tx: &mpsc::Sender<SessionMessageRoute>,
) -> bool {
    let result = match msg {
        SessionIncomingMessage::PromptStart { knowledge_source } => {
            let source = match knowledge_source {
                Some(name) => match parse_source(&name, message_tx).await {
                    Some(source) => source,
                    None => return true,
                },
                None => session.knowledge_source(),
            };
            session.setup_prompt_start(source).await
        }
        SessionIncomingMessage::SystemPrompt { content } => {
            session.setup_system_prompt(content.as_deref()).await
        }
        SessionIncomingMessage::AudioStart => session.setup_start_audio().await,
        SessionIncomingMessage::AudioInput { data } => session.stream_audio_encoded(&data).await,
        SessionIncomingMessage::StopAudio => {
            info!(session_id = %session.id(), "Client stopped audio, closing session");
            // the forwarder ends the connection once streamComplete goes out
            if let Err(e) = session.close().await {
                debug!(session_id = %session.id(), "Close was forced: {}", e);
            }
            Ok(())
        }
        SessionIncomingMessage::SetKnowledgeSource { source } => {
            let Some(source) = parse_source(&source, message_tx).await else {
                return true;
            };
            let result = session.set_knowledge_source(source);
            if result.is_ok() {
                let _ = message_tx
                    .send(SessionMessageRoute::Outgoing(
                        SessionOutgoingMessage::KnowledgeSourceSet { source },
                    ))
                    .await;
            }
            result
        }
    };

    check_result(result, message_tx).await
}

async fn parse_source(
    name: &str,
    message_tx: &mpsc::Sender<SessionMessageRoute>,
) -> Option<KnowledgeSource> {
    match name.parse::<KnowledgeSource>() {
        Ok(source) => Some(source),
        Err(e) => {
            let _ = message_tx
                .send(SessionMessageRoute::error(
                    "invalid_knowledge_source",
                    e.to_string(),
                ))
                .await;
            None
        }
    }
}

/// Returns false when the connection should end.
///
/// Protocol errors have already been published on the session's event
/// stream; only a closed session needs reporting here.
async fn check_result(
    result: SessionResult<()>,
    message_tx: &mpsc::Sender<SessionMessageRoute>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(err @ SessionError::SessionClosed(_)) => {
            let _ = message_tx
                .send(SessionMessageRoute::error(err.code(), err.to_string()))
                .await;
            false
        }
        Err(err) => !err.is_fatal(),
    }
}
