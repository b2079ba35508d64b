use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::connector::{UpstreamChannel, UpstreamConnector, UpstreamError, UpstreamResult};
use super::messages::ClientEvent;
use crate::core::codec::ContentEvent;

/// Far end of a loopback channel, playing the part of the model.
///
/// Dropping `to_session` ends the session's inbound stream, which the session
/// treats as the model closing the channel.
pub struct LoopbackPeer {
    pub session_id: String,
    pub from_session: mpsc::Receiver<ClientEvent>,
    pub to_session: mpsc::Sender<UpstreamResult<ContentEvent>>,
}

/// In-process connector that hands each channel's far end to the caller.
pub struct LoopbackConnector {
    capacity: usize,
    peers: mpsc::UnboundedSender<LoopbackPeer>,
    refuse: AtomicBool,
}

impl LoopbackConnector {
    /// Create a connector and the stream of peers it will produce.
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        (
            Self {
                capacity: capacity.max(1),
                peers,
                refuse: AtomicBool::new(false),
            },
            peer_rx,
        )
    }

    /// Make subsequent `connect` calls fail, as if the model were unreachable.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamConnector for LoopbackConnector {
    async fn connect(&self, session_id: &str) -> UpstreamResult<UpstreamChannel> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(UpstreamError::ConnectionFailed(
                "loopback connector is refusing connections".into(),
            ));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.capacity);

        self.peers
            .send(LoopbackPeer {
                session_id: session_id.to_string(),
                from_session: outbound_rx,
                to_session: inbound_tx,
            })
            .map_err(|_| UpstreamError::ConnectionFailed("no loopback peer is listening".into()))?;

        Ok(UpstreamChannel::new(outbound_tx, inbound_rx, None))
    }
}
