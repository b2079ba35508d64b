//! Session lifecycle phases and the per-session mutable state.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

use crate::core::knowledge::KnowledgeSource;
use crate::core::tools::ToolInvocation;

/// Lifecycle phase of a [`DuplexSession`](super::DuplexSession).
///
/// ```text
/// Created -> AwaitingPromptStart -> PromptActive <-> AudioStreaming
///                                        |
///                      (any open phase) -> Closing -> Closed
/// ```
///
/// Forced close may jump to `Closed` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Created,
    AwaitingPromptStart,
    PromptActive,
    AudioStreaming,
    Closing,
    Closed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Created => "Created",
            Phase::AwaitingPromptStart => "AwaitingPromptStart",
            Phase::PromptActive => "PromptActive",
            Phase::AudioStreaming => "AudioStreaming",
            Phase::Closing => "Closing",
            Phase::Closed => "Closed",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Closing, _) => false,
            (_, Closing) => true,
            (Created, AwaitingPromptStart)
            | (AwaitingPromptStart, PromptActive)
            | (PromptActive, AudioStreaming)
            | (AudioStreaming, PromptActive) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Closed)
    }

    /// Closing or Closed.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Phase::Closing | Phase::Closed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content block opened by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Prompt,
    Audio,
}

/// One bracketed unit of exchange with the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub content_id: String,
    pub kind: BlockKind,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl ContentBlock {
    pub fn open(content_id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            content_id: content_id.into(),
            kind,
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self) {
        if self.closed_at.is_none() {
            self.closed_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Mutable state of one session, guarded by the session's own lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: Phase,
    pub knowledge_source: KnowledgeSource,
    pub prompt: Option<ContentBlock>,
    pub audio: Option<ContentBlock>,
    /// Tool calls announced by the model, keyed by content id, awaiting their block end
    pub pending_tools: HashMap<String, ToolInvocation>,
    pub last_activity: Instant,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Created,
            knowledge_source: KnowledgeSource::default(),
            prompt: None,
            audio: None,
            pending_tools: HashMap::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn prompt_open(&self) -> bool {
        self.prompt.as_ref().is_some_and(ContentBlock::is_open)
    }

    pub fn audio_open(&self) -> bool {
        self.audio.as_ref().is_some_and(ContentBlock::is_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Phase::Created.can_transition_to(Phase::AwaitingPromptStart));
        assert!(Phase::AwaitingPromptStart.can_transition_to(Phase::PromptActive));
        assert!(Phase::PromptActive.can_transition_to(Phase::AudioStreaming));
        assert!(Phase::AudioStreaming.can_transition_to(Phase::PromptActive));
        assert!(Phase::PromptActive.can_transition_to(Phase::Closing));
        assert!(Phase::Closing.can_transition_to(Phase::Closed));
    }

    #[test]
    fn test_no_phase_is_revisited() {
        assert!(!Phase::PromptActive.can_transition_to(Phase::AwaitingPromptStart));
        assert!(!Phase::AwaitingPromptStart.can_transition_to(Phase::Created));
        assert!(!Phase::Created.can_transition_to(Phase::PromptActive));
        assert!(!Phase::Closing.can_transition_to(Phase::PromptActive));
        assert!(!Phase::Closed.can_transition_to(Phase::Closed));
        assert!(!Phase::Closed.can_transition_to(Phase::Created));
    }

    #[test]
    fn test_forced_close_from_anywhere() {
        for phase in [
            Phase::Created,
            Phase::AwaitingPromptStart,
            Phase::PromptActive,
            Phase::AudioStreaming,
            Phase::Closing,
        ] {
            assert!(phase.can_transition_to(Phase::Closed), "{phase}");
        }
    }

    #[test]
    fn test_block_close_is_sticky() {
        let mut block = ContentBlock::open("audio-1", BlockKind::Audio);
        assert!(block.is_open());
        block.close();
        let first = block.closed_at;
        block.close();
        assert_eq!(block.closed_at, first);
        assert!(!block.is_open());
    }
}
