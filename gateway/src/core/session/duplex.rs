use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{EventBus, Subscription, SubscriptionId};
use super::settings::SessionSettings;
use super::state::{BlockKind, ContentBlock, Phase, SessionState};
use crate::core::codec::{AudioFrame, ContentEvent, ContentType, EventKind, INPUT_SAMPLE_RATE};
use crate::core::knowledge::KnowledgeSource;
use crate::core::registry::SessionRegistry;
use crate::core::tools::{ToolDispatcher, ToolInvocation};
use crate::core::upstream::{
    AudioConfiguration, ClientEvent, ContentStartEvent, MediaConfiguration, ToolConfiguration,
    UpstreamConnector, UpstreamError, UpstreamResult,
};
use crate::errors::{SessionError, SessionResult};

// =============================================================================
// Shared services
// =============================================================================

/// Everything a session needs from the rest of the process.
#[derive(Clone)]
pub struct SessionContext {
    pub settings: Arc<SessionSettings>,
    pub registry: Arc<SessionRegistry>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub dispatcher: ToolDispatcher,
}

impl SessionContext {
    /// Create a session, register it and open its upstream channel.
    ///
    /// On failure the session is torn down before the error is returned, so
    /// nothing stays registered and no stream slot is held.
    pub async fn open_session(&self) -> SessionResult<Arc<DuplexSession>> {
        let session = DuplexSession::new(Uuid::new_v4().to_string(), self.clone());
        self.registry.register(Arc::clone(&session))?;

        if let Err(e) = session.initiate().await {
            session.force_close_session();
            return Err(e);
        }
        Ok(session)
    }
}

/// Read-only view of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub knowledge_source: KnowledgeSource,
    pub idle_seconds: u64,
    pub subscribers: usize,
}

/// Error event sent to subscribers for a session error.
pub(crate) fn error_event(err: &SessionError) -> ContentEvent {
    ContentEvent::error(err.to_string(), Some(err.code().to_string()))
}

// =============================================================================
// Session
// =============================================================================

/// Work drained in order by the session task.
enum Outbound {
    Event(ClientEvent),
    ToolResult(ToolInvocation),
    Flush(oneshot::Sender<()>),
    /// Send the final events, then hang up and wait for the model to confirm
    Finish {
        events: Vec<ClientEvent>,
        ack: oneshot::Sender<()>,
    },
}

/// One conversational connection between a client and the model.
///
/// Client commands arrive through the async methods below and are applied to
/// the phase machine under the session's own lock, then queued for the
/// session task. The session task owns the upstream channel: it forwards the
/// queue upstream in order and fans inbound events out to subscribers.
///
/// Every shutdown path, graceful or forced, ends in the same idempotent
/// teardown that releases the stream slot, unregisters the session and emits
/// `streamComplete`.
pub struct DuplexSession {
    id: String,
    prompt_name: String,
    ctx: SessionContext,
    state: Mutex<SessionState>,
    bus: EventBus,
    queue: Mutex<Option<mpsc::Sender<Outbound>>>,
    upstream_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

impl DuplexSession {
    pub fn new(id: impl Into<String>, ctx: SessionContext) -> Arc<Self> {
        let bus = EventBus::new(ctx.settings.subscriber_buffer);
        Arc::new(Self {
            id: id.into(),
            prompt_name: Uuid::new_v4().to_string(),
            ctx,
            state: Mutex::new(SessionState::new()),
            bus,
            queue: Mutex::new(None),
            upstream_task: Mutex::new(None),
            cancel: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn knowledge_source(&self) -> KnowledgeSource {
        self.state.lock().knowledge_source
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().last_activity
    }

    pub fn is_closed(&self) -> bool {
        self.phase().is_terminal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: state.phase,
            knowledge_source: state.knowledge_source,
            idle_seconds: state.last_activity.elapsed().as_secs(),
            subscribers: self.bus.subscriber_count(),
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to `kinds` (all kinds when empty).
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.bus.subscribe(kinds)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn closed_error(&self) -> SessionError {
        SessionError::SessionClosed(self.id.clone())
    }

    /// Tell error subscribers about `err`.
    pub(crate) fn report(&self, err: &SessionError) {
        self.bus.publish_now(error_event(err));
    }

    fn reject(&self, err: SessionError) -> SessionError {
        debug!(session_id = %self.id, "Rejected command: {}", err);
        self.report(&err);
        err
    }

    fn invalid(&self, operation: &'static str, phase: Phase) -> SessionError {
        self.reject(SessionError::InvalidTransition { operation, phase })
    }

    fn expect_phase(
        &self,
        state: &SessionState,
        operation: &'static str,
        allowed: Phase,
    ) -> SessionResult<()> {
        if state.phase.is_shutting_down() {
            return Err(self.closed_error());
        }
        if state.phase != allowed {
            return Err(self.invalid(operation, state.phase));
        }
        Ok(())
    }

    fn expect_open_prompt(&self, state: &SessionState, operation: &'static str) -> SessionResult<()> {
        self.expect_phase(state, operation, Phase::PromptActive)?;
        if !state.prompt_open() {
            return Err(self.invalid(operation, state.phase));
        }
        Ok(())
    }

    fn advance(&self, state: &mut SessionState, next: Phase) {
        debug_assert!(
            state.phase.can_transition_to(next),
            "{} -> {}",
            state.phase,
            next
        );
        debug!(session_id = %self.id, "Phase {} -> {}", state.phase, next);
        state.phase = next;
    }

    async fn enqueue(&self, item: Outbound) -> SessionResult<()> {
        let queue = self.queue.lock().clone().ok_or_else(|| self.closed_error())?;
        queue.send(item).await.map_err(|_| self.closed_error())
    }

    async fn enqueue_events(&self, events: Vec<ClientEvent>) -> SessionResult<()> {
        for event in events {
            self.enqueue(Outbound::Event(event)).await?;
        }
        Ok(())
    }

    /// Wait until everything queued so far has been handed to the upstream channel.
    async fn flush(&self) -> SessionResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(Outbound::Flush(ack_tx)).await?;
        ack_rx.await.map_err(|_| self.closed_error())
    }

    // -------------------------------------------------------------------------
    // Lifecycle operations
    // -------------------------------------------------------------------------

    /// Take a stream slot, open the upstream channel and start the session task.
    pub async fn initiate(self: &Arc<Self>) -> SessionResult<()> {
        {
            let state = self.state.lock();
            self.expect_phase(&state, "initiate", Phase::Created)?;
        }

        self.ctx.registry.admit(&self.id)?;

        let channel = match self.ctx.connector.connect(&self.id).await {
            Ok(channel) => channel,
            Err(e) => {
                error!(session_id = %self.id, "Failed to open upstream channel: {}", e);
                self.ctx.registry.release(&self.id);
                return Err(SessionError::UpstreamChannelFailure(e.to_string()));
            }
        };

        let (outbound, inbound, connection) = channel.into_parts();
        let (queue_tx, queue_rx) = mpsc::channel(self.ctx.settings.audio_queue_capacity.max(1));

        {
            let mut state = self.state.lock();
            if state.phase != Phase::Created {
                // force-closed while connecting
                drop(state);
                if let Some(connection) = connection {
                    connection.abort();
                }
                self.ctx.registry.release(&self.id);
                return Err(self.closed_error());
            }
            *self.queue.lock() = Some(queue_tx);
            *self.upstream_task.lock() = connection;
            self.advance(&mut state, Phase::AwaitingPromptStart);
            state.touch();
        }

        let task = SessionTask {
            session: Arc::clone(self),
            outbound: Some(outbound),
            inbound,
            queue: queue_rx,
            finishing: None,
        };
        tokio::spawn(task.run());

        self.enqueue(Outbound::Event(ClientEvent::SessionStart {
            inference_configuration: self.ctx.settings.inference,
        }))
        .await?;

        info!(session_id = %self.id, "Session initiated");
        Ok(())
    }

    /// Select the knowledge source and open the prompt.
    pub async fn setup_prompt_start(&self, source: KnowledgeSource) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            self.expect_phase(&state, "start the prompt", Phase::AwaitingPromptStart)?;
            state.knowledge_source = source;
            state.prompt = Some(ContentBlock::open(&self.prompt_name, BlockKind::Prompt));
            self.advance(&mut state, Phase::PromptActive);
            state.touch();
        }

        let settings = &self.ctx.settings;
        self.enqueue(Outbound::Event(ClientEvent::PromptStart {
            prompt_name: self.prompt_name.clone(),
            text_output_configuration: MediaConfiguration::text(),
            audio_output_configuration: AudioConfiguration::output(settings.voice_id.clone()),
            tool_use_output_configuration: MediaConfiguration::json(),
            tool_configuration: ToolConfiguration::new(settings.tools.clone()),
        }))
        .await
    }

    /// Send the system instructions, or the configured default when `content`
    /// is empty. The phase does not change.
    pub async fn setup_system_prompt(&self, content: Option<&str>) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            self.expect_open_prompt(&state, "send the system prompt")?;
            state.touch();
        }

        let text = content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(self.ctx.settings.system_prompt.as_str())
            .to_string();
        let content_name = Uuid::new_v4().to_string();
        debug!(session_id = %self.id, content_id = %content_name, "Sending system prompt");

        self.enqueue_events(vec![
            ClientEvent::ContentStart(ContentStartEvent::system_text(
                &self.prompt_name,
                &content_name,
            )),
            ClientEvent::TextInput {
                prompt_name: self.prompt_name.clone(),
                content_name: content_name.clone(),
                content: text,
            },
            ClientEvent::ContentEnd {
                prompt_name: self.prompt_name.clone(),
                content_name,
            },
        ])
        .await
    }

    /// Open the user audio block.
    pub async fn setup_start_audio(&self) -> SessionResult<()> {
        let content_name = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock();
            self.expect_open_prompt(&state, "start audio")?;
            state.audio = Some(ContentBlock::open(&content_name, BlockKind::Audio));
            self.advance(&mut state, Phase::AudioStreaming);
            state.touch();
        }

        self.enqueue(Outbound::Event(ClientEvent::ContentStart(
            ContentStartEvent::user_audio(&self.prompt_name, &content_name),
        )))
        .await
    }

    /// Queue one frame for the open audio block. Waits while the queue is full.
    pub async fn stream_audio(&self, frame: AudioFrame) -> SessionResult<()> {
        let content_name = {
            let mut state = self.state.lock();
            self.expect_phase(&state, "stream audio", Phase::AudioStreaming)?;
            let phase = state.phase;
            let Some(block) = state.audio.as_ref().filter(|b| b.is_open()) else {
                return Err(self.invalid("stream audio", phase));
            };
            let content_name = block.content_id.clone();
            state.touch();
            content_name
        };

        self.enqueue(Outbound::Event(ClientEvent::AudioInput {
            prompt_name: self.prompt_name.clone(),
            content_name,
            content: frame,
        }))
        .await
    }

    /// Decode a base64 PCM16 frame at the input rate and queue it.
    pub async fn stream_audio_encoded(&self, data: &str) -> SessionResult<()> {
        let frame = AudioFrame::from_base64(data, INPUT_SAMPLE_RATE)
            .map_err(|e| self.reject(e.into()))?;
        self.stream_audio(frame).await
    }

    /// Queue raw PCM16 bytes at the input rate.
    pub async fn stream_audio_bytes(&self, data: Bytes) -> SessionResult<()> {
        let frame = AudioFrame::input(data).map_err(|e| self.reject(e.into()))?;
        self.stream_audio(frame).await
    }

    /// Close the audio block and wait for queued audio to reach the channel.
    pub async fn end_audio_content(&self) -> SessionResult<()> {
        let content_name = {
            let mut state = self.state.lock();
            self.expect_phase(&state, "end audio", Phase::AudioStreaming)?;
            let phase = state.phase;
            let Some(block) = state.audio.as_mut() else {
                return Err(self.invalid("end audio", phase));
            };
            block.close();
            let content_name = block.content_id.clone();
            self.advance(&mut state, Phase::PromptActive);
            state.touch();
            content_name
        };

        self.enqueue(Outbound::Event(ClientEvent::ContentEnd {
            prompt_name: self.prompt_name.clone(),
            content_name,
        }))
        .await?;
        self.flush().await
    }

    /// Close the prompt. Afterwards only `close` is accepted.
    pub async fn end_prompt(&self) -> SessionResult<()> {
        {
            let mut state = self.state.lock();
            self.expect_open_prompt(&state, "end the prompt")?;
            if let Some(prompt) = state.prompt.as_mut() {
                prompt.close();
            }
            state.touch();
        }

        self.enqueue(Outbound::Event(ClientEvent::PromptEnd {
            prompt_name: self.prompt_name.clone(),
        }))
        .await
    }

    /// Change the knowledge source used by the next tool resolution.
    pub fn set_knowledge_source(&self, source: KnowledgeSource) -> SessionResult<()> {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            return Err(self.closed_error());
        }
        state.knowledge_source = source;
        state.touch();
        info!(session_id = %self.id, source = %source, "Knowledge source set");
        Ok(())
    }

    /// Graceful close within the configured deadline.
    pub async fn close(&self) -> SessionResult<()> {
        self.close_with_deadline(self.ctx.settings.close_timeout).await
    }

    /// Graceful close; forces the session closed if `deadline` elapses or the
    /// sequence fails. Closing a closed session is a no-op.
    pub async fn close_with_deadline(&self, deadline: Duration) -> SessionResult<()> {
        match tokio::time::timeout(deadline, self.graceful_close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(session_id = %self.id, "Graceful close failed: {}", e);
                self.abort(&e);
                Err(e)
            }
            Err(_) => {
                let err = SessionError::GracefulCloseTimeout(deadline);
                warn!(session_id = %self.id, "{}", err);
                self.abort(&err);
                Err(err)
            }
        }
    }

    async fn graceful_close(&self) -> SessionResult<()> {
        let events = {
            let mut state = self.state.lock();
            let phase = state.phase;
            match phase {
                Phase::Closed | Phase::Closing => return Ok(()),
                Phase::Created => {
                    drop(state);
                    self.teardown(None);
                    return Ok(());
                }
                _ => {}
            }

            self.advance(&mut state, Phase::Closing);
            let mut events = Vec::new();
            if let Some(audio) = state.audio.as_mut().filter(|b| b.is_open()) {
                audio.close();
                events.push(ClientEvent::ContentEnd {
                    prompt_name: self.prompt_name.clone(),
                    content_name: audio.content_id.clone(),
                });
            }
            if let Some(prompt) = state.prompt.as_mut().filter(|b| b.is_open()) {
                prompt.close();
                events.push(ClientEvent::PromptEnd {
                    prompt_name: self.prompt_name.clone(),
                });
            }
            events.push(ClientEvent::SessionEnd {});
            events
        };

        info!(session_id = %self.id, "Closing session");

        let (ack_tx, ack_rx) = oneshot::channel();
        let confirmed = match self
            .enqueue(Outbound::Finish {
                events,
                ack: ack_tx,
            })
            .await
        {
            Ok(()) => ack_rx.await.is_ok(),
            Err(_) => false,
        };

        if !confirmed {
            if self.torn_down.load(Ordering::SeqCst) {
                // forced close won the race
                return Ok(());
            }
            return Err(SessionError::UpstreamChannelFailure(
                "upstream channel ended before close completed".into(),
            ));
        }

        self.teardown(None);
        info!(session_id = %self.id, "Session closed");
        Ok(())
    }

    /// Tear the session down now, from any phase, without waiting on the network.
    pub fn force_close_session(&self) {
        if self.teardown(None) {
            warn!(session_id = %self.id, "Session force-closed");
        }
    }

    /// Force the session closed because of `err`, which subscribers receive
    /// as the last event before `streamComplete`.
    pub(crate) fn abort(&self, err: &SessionError) {
        if self.teardown(Some(error_event(err))) {
            warn!(session_id = %self.id, "Session force-closed: {}", err);
        }
    }

    /// Returns false if the session was already torn down.
    fn teardown(&self, final_error: Option<ContentEvent>) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        {
            let mut state = self.state.lock();
            if let Some(audio) = state.audio.as_mut() {
                audio.close();
            }
            if let Some(prompt) = state.prompt.as_mut() {
                prompt.close();
            }
            state.pending_tools.clear();
            self.advance(&mut state, Phase::Closed);
        }

        self.queue.lock().take();
        if let Some(connection) = self.upstream_task.lock().take() {
            connection.abort();
        }

        self.ctx.registry.release(&self.id);
        self.ctx.registry.unregister(&self.id);

        let mut last: Vec<ContentEvent> = final_error.into_iter().collect();
        last.push(ContentEvent::StreamComplete);
        self.bus.finish(&last);
        self.cancel.cancel();
        true
    }
}

// =============================================================================
// Session task
// =============================================================================

/// Owns the upstream channel for one session.
struct SessionTask {
    session: Arc<DuplexSession>,
    /// `None` once the session has hung up
    outbound: Option<mpsc::Sender<ClientEvent>>,
    inbound: mpsc::Receiver<UpstreamResult<ContentEvent>>,
    queue: mpsc::Receiver<Outbound>,
    finishing: Option<oneshot::Sender<()>>,
}

impl SessionTask {
    async fn run(mut self) {
        let cancel = self.session.cancel.clone();
        let session_id = self.session.id.clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                item = self.queue.recv(), if self.finishing.is_none() => match item {
                    Some(item) => {
                        if !self.handle_outbound(item).await {
                            break;
                        }
                    }
                    None => break,
                },

                event = self.inbound.recv() => match event {
                    Some(Ok(event)) => self.handle_inbound(event).await,
                    Some(Err(e)) => {
                        if !self.handle_upstream_error(e) {
                            break;
                        }
                    }
                    None => {
                        self.handle_upstream_end();
                        break;
                    }
                },
            }
        }

        debug!(session_id = %session_id, "Session task stopped");
    }

    /// Returns false when the task should stop.
    async fn handle_outbound(&mut self, item: Outbound) -> bool {
        match item {
            Outbound::Event(event) => self.forward(event).await,
            Outbound::ToolResult(invocation) => self.send_tool_result(invocation).await,
            Outbound::Flush(ack) => {
                let _ = ack.send(());
                true
            }
            Outbound::Finish { events, ack } => {
                for event in events {
                    if !self.forward(event).await {
                        return false;
                    }
                }
                // dropping the sender asks the model to finish
                self.outbound = None;
                self.finishing = Some(ack);
                true
            }
        }
    }

    async fn forward(&self, event: ClientEvent) -> bool {
        let Some(outbound) = &self.outbound else {
            return true;
        };
        let name = event.name();
        match self
            .session
            .cancel
            .run_until_cancelled(outbound.send(event))
            .await
        {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                self.fail(SessionError::UpstreamChannelFailure(format!(
                    "upstream channel closed while sending {name}"
                )));
                false
            }
            None => false,
        }
    }

    async fn handle_inbound(&self, event: ContentEvent) {
        let session = &self.session;
        let ready = {
            let mut state = session.state.lock();
            state.touch();
            match &event {
                ContentEvent::ToolUse { .. } => {
                    if let Some(invocation) = ToolInvocation::from_event(&event) {
                        debug!(
                            session_id = %session.id,
                            tool = %invocation.tool_name,
                            "Tool use announced"
                        );
                        state
                            .pending_tools
                            .insert(invocation.content_id.clone(), invocation);
                    }
                    None
                }
                ContentEvent::ContentEnd {
                    content_id,
                    content_type: ContentType::Tool,
                    ..
                } => state
                    .pending_tools
                    .remove(content_id)
                    .map(|invocation| (invocation, state.knowledge_source)),
                _ => None,
            }
        };

        session
            .cancel
            .run_until_cancelled(session.bus.publish(event))
            .await;

        if let Some((invocation, source)) = ready {
            self.spawn_dispatch(invocation, source);
        }
    }

    /// Resolve a tool call off the session task and queue the result.
    fn spawn_dispatch(&self, mut invocation: ToolInvocation, source: KnowledgeSource) {
        let Some(queue) = self.session.queue.lock().clone() else {
            return;
        };
        let session = Arc::clone(&self.session);

        tokio::spawn(async move {
            let dispatcher = session.ctx.dispatcher.clone();
            let Some(outcome) = session
                .cancel
                .run_until_cancelled(dispatcher.dispatch(&mut invocation, source))
                .await
            else {
                return;
            };

            if let Some(err) = outcome.err().and_then(|e| e.as_session_error()) {
                session.report(&err);
            }

            session
                .cancel
                .run_until_cancelled(queue.send(Outbound::ToolResult(invocation)))
                .await;
        });
    }

    async fn send_tool_result(&self, invocation: ToolInvocation) -> bool {
        let session = Arc::clone(&self.session);
        if session.phase().is_shutting_down() {
            debug!(
                session_id = %session.id,
                tool_use_id = %invocation.tool_use_id,
                "Dropping tool result for closing session"
            );
            return true;
        }

        let content_name = Uuid::new_v4().to_string();
        let events = [
            ClientEvent::ContentStart(ContentStartEvent::tool_result(
                &session.prompt_name,
                &content_name,
                &invocation.tool_use_id,
            )),
            ClientEvent::ToolResult {
                prompt_name: session.prompt_name.clone(),
                content_name: content_name.clone(),
                content: invocation.result_text(),
            },
            ClientEvent::ContentEnd {
                prompt_name: session.prompt_name.clone(),
                content_name,
            },
        ];
        for event in events {
            if !self.forward(event).await {
                return false;
            }
        }

        let event = ContentEvent::ToolResult {
            content_id: invocation.content_id,
            tool_use_id: invocation.tool_use_id,
            result: invocation.result.unwrap_or(Value::Null),
        };
        session
            .cancel
            .run_until_cancelled(session.bus.publish(event))
            .await;
        true
    }

    /// Returns false when the error ends the session.
    fn handle_upstream_error(&self, err: UpstreamError) -> bool {
        if err.is_fatal() {
            self.fail(SessionError::UpstreamChannelFailure(err.to_string()));
            return false;
        }
        warn!(session_id = %self.session.id, "Upstream sent a bad frame: {}", err);
        self.session
            .report(&SessionError::MalformedFrame(err.to_string()));
        true
    }

    fn handle_upstream_end(&mut self) {
        match self.finishing.take() {
            Some(ack) => {
                debug!(session_id = %self.session.id, "Upstream confirmed close");
                let _ = ack.send(());
            }
            None => self.fail(SessionError::UpstreamChannelFailure(
                "upstream closed the channel".into(),
            )),
        }
    }

    fn fail(&self, err: SessionError) {
        let session = &self.session;
        error!(session_id = %session.id, "{}", err);
        {
            let mut state = session.state.lock();
            if !state.phase.is_shutting_down() {
                session.advance(&mut state, Phase::Closing);
            }
        }
        session.abort(&err);
    }
}
