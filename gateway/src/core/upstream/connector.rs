use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::messages::ClientEvent;
use crate::core::codec::ContentEvent;

/// Errors raised by an upstream channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The channel could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport-level failure on an open channel
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The model sent a frame that could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The model closed the channel without being asked to
    #[error("Upstream closed the channel")]
    Closed,
}

impl UpstreamError {
    /// Protocol errors affect a single frame; everything else ends the channel.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UpstreamError::Protocol(_))
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// An open duplex channel to the model.
///
/// Dropping `outbound` asks the far end to finish; the far end confirms by
/// ending `inbound`.
pub struct UpstreamChannel {
    pub outbound: mpsc::Sender<ClientEvent>,
    pub inbound: mpsc::Receiver<UpstreamResult<ContentEvent>>,
    task: Option<JoinHandle<()>>,
}

impl UpstreamChannel {
    pub fn new(
        outbound: mpsc::Sender<ClientEvent>,
        inbound: mpsc::Receiver<UpstreamResult<ContentEvent>>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            task,
        }
    }

    /// Split into sender, receiver and the background connection task, if any.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<ClientEvent>,
        mpsc::Receiver<UpstreamResult<ContentEvent>>,
        Option<JoinHandle<()>>,
    ) {
        (self.outbound, self.inbound, self.task)
    }

    /// Abort the connection task without a closing handshake.
    pub fn shutdown(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Opens upstream channels, one per session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self, session_id: &str) -> UpstreamResult<UpstreamChannel>;
}
