//! Knowledge backends consulted by the tool dispatcher.
//!
//! Two sources are selectable per session:
//!
//! - `bedrock`: a managed retrieve-and-generate service ([`BedrockKnowledgeBase`])
//! - `sharepoint`: the locally persisted [`DocumentIndex`] with keyword search
//!
//! The dispatcher only sees the [`KnowledgeResolver`] and
//! [`DocumentIndexResolver`] traits, so either backend can be swapped out.

mod bedrock;
mod document_index;
mod source;

pub use bedrock::{BedrockKnowledgeBase, DEFAULT_MODEL_ARN, NO_ANSWER_FOUND};
pub use document_index::{DocumentIndex, IndexStatus, RefreshSummary, StoredDocument};
pub use source::{DirectorySource, DocumentSource, SourceDocument};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by knowledge backends.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Unknown knowledge source '{0}', expected \"bedrock\" or \"sharepoint\"")]
    InvalidSource(String),

    #[error("Knowledge backend not configured: {0}")]
    NotConfigured(String),

    #[error("Knowledge request failed: {0}")]
    Request(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// Knowledge backend selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource {
    /// Managed retrieval service
    #[default]
    Bedrock,
    /// Local document index
    Sharepoint,
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeSource::Bedrock => "bedrock",
            KnowledgeSource::Sharepoint => "sharepoint",
        }
    }
}

impl fmt::Display for KnowledgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeSource {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(KnowledgeSource::Bedrock),
            "sharepoint" => Ok(KnowledgeSource::Sharepoint),
            _ => Err(KnowledgeError::InvalidSource(s.to_string())),
        }
    }
}

/// A ranked document search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub name: String,
    pub excerpt: String,
    pub score: usize,
}

/// Answers a free-text question with generated text.
#[async_trait]
pub trait KnowledgeResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> KnowledgeResult<String>;
}

/// Ranks indexed documents against a free-text query.
#[async_trait]
pub trait DocumentIndexResolver: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> KnowledgeResult<Vec<DocumentHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_knowledge_source() {
        assert_eq!(
            "bedrock".parse::<KnowledgeSource>().unwrap(),
            KnowledgeSource::Bedrock
        );
        assert_eq!(
            " SharePoint ".parse::<KnowledgeSource>().unwrap(),
            KnowledgeSource::Sharepoint
        );
        assert!(matches!(
            "confluence".parse::<KnowledgeSource>(),
            Err(KnowledgeError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_default_is_bedrock() {
        assert_eq!(KnowledgeSource::default(), KnowledgeSource::Bedrock);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&KnowledgeSource::Sharepoint).unwrap(),
            "\"sharepoint\""
        );
        let parsed: KnowledgeSource = serde_json::from_str("\"bedrock\"").unwrap();
        assert_eq!(parsed, KnowledgeSource::Bedrock);
    }
}
