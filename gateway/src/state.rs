//! Shared application state handed to every HTTP and WebSocket handler.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::knowledge::{BedrockKnowledgeBase, DirectorySource, DocumentIndex, DocumentSource};
use crate::core::reaper::InactivityReaper;
use crate::core::registry::SessionRegistry;
use crate::core::session::{SessionContext, SessionSettings};
use crate::core::tools::{OpenMeteoWeather, ToolDispatcher};
use crate::core::upstream::{UpstreamConnector, WebSocketConnector};

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    /// Services every new session is opened with
    pub sessions: SessionContext,
    pub document_index: Arc<DocumentIndex>,
    pub document_source: Arc<dyn DocumentSource>,
    pub started_at: Instant,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build the production state: WebSocket upstream, managed knowledge base,
    /// on-disk document index and the Open-Meteo weather provider.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let connector = WebSocketConnector::new(&config.upstream_url, config.upstream_api_key.clone())
            .context("Invalid upstream configuration")?
            .with_channel_capacity(config.audio_queue_capacity);

        Self::with_connector(config, Arc::new(connector)).await
    }

    /// Same as [`AppState::new`] with a caller-supplied upstream connector.
    pub async fn with_connector(
        config: ServerConfig,
        connector: Arc<dyn UpstreamConnector>,
    ) -> anyhow::Result<Arc<Self>> {
        let mut knowledge_base = BedrockKnowledgeBase::new(
            config.knowledge_base_id.clone(),
            config.aws_region.clone(),
        )
        .with_model_arn(config.knowledge_base_model_arn.clone());
        if let Some((access_key_id, secret_access_key)) = config.aws_credentials() {
            knowledge_base = knowledge_base.with_credentials(access_key_id, secret_access_key);
        }

        let document_index = Arc::new(DocumentIndex::open(&config.data_dir).await);
        let weather = OpenMeteoWeather::new(config.weather_api_url.clone())
            .context("Failed to create weather client")?;

        let dispatcher = ToolDispatcher::new(
            Arc::new(knowledge_base),
            document_index.clone(),
            Arc::new(weather),
        )
        .with_max_search_results(config.search_max_results);

        let document_source: Arc<dyn DocumentSource> =
            Arc::new(DirectorySource::new(config.documents_dir.clone()));

        Ok(Self::from_parts(
            config,
            connector,
            dispatcher,
            document_index,
            document_source,
        ))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: ServerConfig,
        connector: Arc<dyn UpstreamConnector>,
        dispatcher: ToolDispatcher,
        document_index: Arc<DocumentIndex>,
        document_source: Arc<dyn DocumentSource>,
    ) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new(config.max_concurrent_streams));
        let sessions = SessionContext {
            settings: Arc::new(SessionSettings::from_config(&config)),
            registry: registry.clone(),
            connector,
            dispatcher,
        };

        Arc::new(Self {
            config,
            registry,
            sessions,
            document_index,
            document_source,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the inactivity reaper; it stops when [`AppState::shutdown`] runs.
    pub fn start_reaper(&self) -> JoinHandle<()> {
        InactivityReaper::new(
            self.registry.clone(),
            self.config.idle_timeout(),
            self.config.reaper_interval(),
        )
        .spawn(self.shutdown.child_token())
    }

    /// Refresh the document index in the background. Failures are logged only.
    pub fn spawn_index_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            match state
                .document_index
                .refresh(state.document_source.as_ref())
                .await
            {
                Ok(summary) => info!(
                    "Startup index refresh complete: {} documents",
                    summary.total
                ),
                Err(e) => warn!("Startup index refresh failed: {}", e),
            }
        })
    }

    /// Stop background tasks and close every session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.teardown(self.config.close_timeout()).await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::upstream::LoopbackConnector;
    use tempfile::TempDir;

    fn test_config(data_dir: &std::path::Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.knowledge_base_id = "KB-TEST".to_string();
        config.max_concurrent_streams = 3;
        config.data_dir = data_dir.to_path_buf();
        config.documents_dir = data_dir.join("docs");
        config
    }

    #[tokio::test]
    async fn test_state_wires_registry_into_sessions() {
        let dir = TempDir::new().unwrap();
        let (connector, _peers) = LoopbackConnector::new(8);

        let state = AppState::with_connector(test_config(dir.path()), Arc::new(connector))
            .await
            .unwrap();

        assert_eq!(state.registry.max_concurrent_streams(), 3);
        assert!(Arc::ptr_eq(&state.registry, &state.sessions.registry));
        assert_eq!(state.sessions.settings.voice_id, "lupe");
        assert_eq!(state.document_index.status().await.document_count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reaper() {
        let dir = TempDir::new().unwrap();
        let (connector, _peers) = LoopbackConnector::new(8);
        let state = AppState::with_connector(test_config(dir.path()), Arc::new(connector))
            .await
            .unwrap();

        let reaper = state.start_reaper();
        assert!(!state.is_shutting_down());

        state.shutdown().await;
        assert!(state.is_shutting_down());
        reaper.await.unwrap();
        assert!(state.registry.is_empty());
    }
}
