//! Duplex channel between a session and the remote streaming model.
//!
//! A session talks to the model through an [`UpstreamChannel`]: an ordered
//! outbound queue of [`ClientEvent`]s and an ordered inbound stream of decoded
//! [`ContentEvent`](crate::core::codec::ContentEvent)s. Channels are opened by an
//! [`UpstreamConnector`]:
//!
//! - [`WebSocketConnector`] speaks the JSON event protocol over a WebSocket
//! - [`LoopbackConnector`] hands the far end to in-process code (tests, local runs)

mod connector;
mod loopback;
pub mod messages;
mod websocket;

pub use connector::{UpstreamChannel, UpstreamConnector, UpstreamError, UpstreamResult};
pub use loopback::{LoopbackConnector, LoopbackPeer};
pub use messages::{
    AudioConfiguration, ClientEvent, ContentStartEvent, InferenceConfiguration,
    MediaConfiguration, ToolConfiguration, ToolResultInputConfiguration, ToolSpec,
    decode_server_event,
};
pub use websocket::WebSocketConnector;
