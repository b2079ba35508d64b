//! In-process stand-ins for the streaming model and the knowledge backends.
//!
//! Sessions are wired to a [`LoopbackConnector`]; each channel it opens shows
//! up as a [`MockModel`] that the test drives by hand.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use voicekb_gateway::core::knowledge::{
    DirectorySource, DocumentIndex, DocumentSource, KnowledgeError, KnowledgeResolver,
    KnowledgeResult,
};
use voicekb_gateway::core::tools::{ToolDispatcher, ToolError, WeatherProvider};
use voicekb_gateway::core::upstream::{ClientEvent, LoopbackConnector, LoopbackPeer};
use voicekb_gateway::{ContentEvent, ContentType, Role, ServerConfig, state::AppState};

/// Upper bound on any single wait in these tests
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Backends
// =============================================================================

/// Knowledge base returning a fixed answer and recording every query.
#[derive(Default)]
pub struct StubKnowledge {
    pub answer: String,
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl StubKnowledge {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl KnowledgeResolver for StubKnowledge {
    async fn resolve(&self, query: &str) -> KnowledgeResult<String> {
        self.queries.lock().push(query.to_string());
        if self.fail {
            return Err(KnowledgeError::Request("service unavailable".into()));
        }
        Ok(self.answer.clone())
    }
}

/// Weather provider echoing the coordinates it was asked about.
pub struct StubWeather;

#[async_trait]
impl WeatherProvider for StubWeather {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<Value, ToolError> {
        Ok(json!({
            "weather_data": {
                "latitude": latitude,
                "longitude": longitude,
                "current_weather": { "temperature": 21.5, "weathercode": 1 }
            }
        }))
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Configuration with a knowledge base id and data kept under `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.knowledge_base_id = "KB-TEST".to_string();
    config.data_dir = root.join("data");
    config.documents_dir = root.join("documents");
    config.close_timeout_ms = 2000;
    config
}

/// A gateway whose sessions talk to in-process mock models.
pub struct TestGateway {
    pub state: Arc<AppState>,
    pub connector: Arc<LoopbackConnector>,
    pub knowledge: Arc<StubKnowledge>,
    peers: mpsc::UnboundedReceiver<LoopbackPeer>,
}

impl TestGateway {
    pub async fn start(config: ServerConfig) -> Self {
        Self::with_knowledge(config, StubKnowledge::answering("Employees get 25 vacation days.")).await
    }

    pub async fn with_knowledge(config: ServerConfig, knowledge: StubKnowledge) -> Self {
        std::fs::create_dir_all(&config.documents_dir).unwrap();

        let (connector, peers) = LoopbackConnector::new(config.audio_queue_capacity);
        let connector = Arc::new(connector);
        let knowledge = Arc::new(knowledge);

        let document_index = Arc::new(DocumentIndex::open(&config.data_dir).await);
        let dispatcher = ToolDispatcher::new(
            knowledge.clone(),
            document_index.clone(),
            Arc::new(StubWeather),
        )
        .with_max_search_results(config.search_max_results);
        let document_source: Arc<dyn DocumentSource> =
            Arc::new(DirectorySource::new(config.documents_dir.clone()));

        let state = AppState::from_parts(
            config,
            connector.clone(),
            dispatcher,
            document_index,
            document_source,
        );

        Self {
            state,
            connector,
            knowledge,
            peers,
        }
    }

    /// Write a text document into the documents directory.
    pub fn add_document(&self, name: &str, text: &str) {
        std::fs::write(self.state.config.documents_dir.join(name), text).unwrap();
    }

    /// Wait for the next session to reach the model.
    pub async fn next_model(&mut self) -> MockModel {
        let peer = timeout(STEP_TIMEOUT, self.peers.recv())
            .await
            .expect("no session connected to the model in time")
            .expect("loopback connector dropped");
        MockModel { peer: Some(peer) }
    }
}

// =============================================================================
// Model
// =============================================================================

/// The model's end of one session channel.
pub struct MockModel {
    peer: Option<LoopbackPeer>,
}

impl MockModel {
    fn peer(&mut self) -> &mut LoopbackPeer {
        self.peer.as_mut().expect("model already hung up")
    }

    pub fn session_id(&self) -> &str {
        &self.peer.as_ref().expect("model already hung up").session_id
    }

    /// Next event the session sent, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        timeout(STEP_TIMEOUT, self.peer().from_session.recv())
            .await
            .expect("session sent nothing in time")
    }

    /// Receive one event and check its wire name.
    pub async fn expect(&mut self, name: &str) -> ClientEvent {
        let event = self
            .recv()
            .await
            .unwrap_or_else(|| panic!("session hung up while waiting for {name}"));
        assert_eq!(event.name(), name, "unexpected event {event:?}");
        event
    }

    /// Receive `names.len()` events in order.
    pub async fn expect_sequence(&mut self, names: &[&str]) -> Vec<ClientEvent> {
        let mut events = Vec::with_capacity(names.len());
        for name in names {
            events.push(self.expect(name).await);
        }
        events
    }

    pub async fn send(&mut self, event: ContentEvent) {
        self.peer()
            .to_session
            .send(Ok(event))
            .await
            .expect("session stopped reading");
    }

    /// Announce a tool call and end its content block, as the model does.
    pub async fn call_tool(&mut self, content_id: &str, tool_name: &str, tool_use_id: &str, input: Value) {
        self.send(ContentEvent::ContentStart {
            content_id: content_id.to_string(),
            content_type: ContentType::Tool,
            role: Role::Tool,
        })
        .await;
        self.send(ContentEvent::ToolUse {
            content_id: content_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_use_id: tool_use_id.to_string(),
            input,
        })
        .await;
        self.send(ContentEvent::ContentEnd {
            content_id: content_id.to_string(),
            content_type: ContentType::Tool,
            stop_reason: Some("TOOL_USE".to_string()),
        })
        .await;
    }

    /// Drain until the session hangs up, then confirm by closing our side.
    /// Returns the names of the events drained on the way.
    pub async fn confirm_close(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Some(event) = self.recv().await {
            names.push(event.name());
        }
        self.peer = None;
        names
    }

    /// Drop the channel without waiting for the session.
    pub fn hang_up(&mut self) {
        self.peer = None;
    }
}

/// Collect events from a subscription until `streamComplete` or the timeout.
pub async fn collect_until_complete(
    subscription: &mut voicekb_gateway::Subscription,
) -> Vec<ContentEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(STEP_TIMEOUT, subscription.recv()).await {
        let done = matches!(event, ContentEvent::StreamComplete);
        events.push(event);
        if done {
            break;
        }
    }
    events
}

/// Error code carried by an error event.
pub fn error_code(event: &ContentEvent) -> Option<&str> {
    match event {
        ContentEvent::Error { details, .. } => details.as_deref(),
        _ => None,
    }
}
