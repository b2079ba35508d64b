pub mod codec;
pub mod knowledge;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod tools;
pub mod upstream;

// Re-export commonly used types for convenience
pub use codec::{AudioFrame, CodecError, ContentEvent, ContentType, EventKind, Role};

pub use knowledge::{
    BedrockKnowledgeBase, DirectorySource, DocumentHit, DocumentIndex, DocumentIndexResolver,
    DocumentSource, KnowledgeError, KnowledgeResolver, KnowledgeSource,
};

pub use reaper::InactivityReaper;
pub use registry::{RegistryStats, SessionRegistry};

pub use session::{
    DuplexSession, EventBus, Phase, SessionContext, SessionSettings, SessionSnapshot,
    Subscription, SubscriptionId,
};

pub use tools::{
    InvocationState, OpenMeteoWeather, ToolDispatcher, ToolError, ToolInvocation, ToolKind,
    WeatherProvider,
};

pub use upstream::{
    ClientEvent, LoopbackConnector, LoopbackPeer, UpstreamChannel, UpstreamConnector,
    UpstreamError, WebSocketConnector,
};
