//! Per-connection duplex session with the streaming model.
//!
//! A [`DuplexSession`] sequences the prompt and its content blocks, forwards
//! client audio upstream in order, fans model output out to subscribers and
//! brokers tool calls through the
//! [`ToolDispatcher`](crate::core::tools::ToolDispatcher).
//!
//! # Example
//! ```rust,no_run
//! use voicekb_gateway::core::knowledge::KnowledgeSource;
//! use voicekb_gateway::core::session::SessionContext;
//!
//! # async fn run(ctx: SessionContext) -> Result<(), Box<dyn std::error::Error>> {
//! let session = ctx.open_session().await?;
//! let mut events = session.subscribe(&[]);
//!
//! session.setup_prompt_start(KnowledgeSource::Bedrock).await?;
//! session.setup_system_prompt(None).await?;
//! session.setup_start_audio().await?;
//! session.stream_audio_encoded("AAAAAA==").await?;
//! session.end_audio_content().await?;
//! session.end_prompt().await?;
//! session.close().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.kind());
//! }
//! # Ok(())
//! # }
//! ```

mod duplex;
mod events;
mod settings;
mod state;

pub use duplex::{DuplexSession, SessionContext, SessionSnapshot};
pub use events::{EventBus, Subscription, SubscriptionId};
pub use settings::SessionSettings;
pub use state::{BlockKind, ContentBlock, Phase};
