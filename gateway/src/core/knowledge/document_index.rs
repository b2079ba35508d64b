//! Locally persisted document index with keyword search.
//!
//! Documents are kept in memory and mirrored to a JSON file under the data
//! directory so the index survives restarts. A refresh replaces the whole
//! document set with whatever the [`DocumentSource`] returns.
//!
//! Ranking is deliberately simple: the score of a document is the number of
//! case-insensitive, non-overlapping occurrences of each whitespace-separated
//! query word, summed. The excerpt spans 100 characters before to 300
//! characters after the earliest match.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::source::DocumentSource;
use super::{DocumentHit, DocumentIndexResolver, KnowledgeResult};

/// File name of the persisted index inside the data directory
pub const INDEX_FILE_NAME: &str = "knowledge-index.json";

const EXCERPT_BEFORE: usize = 100;
const EXCERPT_AFTER: usize = 300;

/// A document held by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub file_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStore {
    #[serde(default)]
    documents: Vec<StoredDocument>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_sync: Option<OffsetDateTime>,
}

/// Summary of the index contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub document_count: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync: Option<OffsetDateTime>,
    pub total_size: usize,
}

/// Outcome of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub updated: usize,
    pub total: usize,
}

pub struct DocumentIndex {
    path: PathBuf,
    store: RwLock<IndexStore>,
}

impl DocumentIndex {
    /// Open the index stored under `data_dir`, starting empty if no readable
    /// index exists yet.
    pub async fn open(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join(INDEX_FILE_NAME);
        let store = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<IndexStore>(&contents) {
                Ok(store) => {
                    info!(
                        "Loaded document index from {} ({} documents)",
                        path.display(),
                        store.documents.len()
                    );
                    store
                }
                Err(e) => {
                    warn!("Ignoring corrupt document index {}: {}", path.display(), e);
                    IndexStore::default()
                }
            },
            Err(_) => IndexStore::default(),
        };

        Self {
            path,
            store: RwLock::new(store),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace all documents with the current contents of `source`.
    pub async fn refresh(&self, source: &dyn DocumentSource) -> KnowledgeResult<RefreshSummary> {
        info!("Refreshing document index");
        let fetched = source.fetch().await?;
        let now = OffsetDateTime::now_utc();

        let documents: Vec<StoredDocument> = fetched
            .into_iter()
            .map(|doc| StoredDocument {
                size: doc.text.len(),
                file_name: doc.name,
                text: doc.text,
                last_updated: now,
            })
            .collect();

        let store = IndexStore {
            documents,
            last_sync: Some(now),
        };
        self.persist(&store).await?;

        let total = store.documents.len();
        *self.store.write().await = store;

        info!("Document index refreshed: {} documents", total);
        Ok(RefreshSummary {
            updated: total,
            total,
        })
    }

    pub async fn status(&self) -> IndexStatus {
        let store = self.store.read().await;
        IndexStatus {
            document_count: store.documents.len(),
            last_sync: store.last_sync,
            total_size: store.documents.iter().map(|doc| doc.size).sum(),
        }
    }

    pub async fn document_names(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .documents
            .iter()
            .map(|doc| doc.file_name.clone())
            .collect()
    }

    /// Rank documents against `query`, best first.
    pub async fn search_documents(&self, query: &str, max_results: usize) -> Vec<DocumentHit> {
        let store = self.store.read().await;
        rank(&store.documents, query, max_results)
    }

    async fn persist(&self, store: &IndexStore) -> KnowledgeResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(store)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentIndexResolver for DocumentIndex {
    async fn search(&self, query: &str, max_results: usize) -> KnowledgeResult<Vec<DocumentHit>> {
        Ok(self.search_documents(query, max_results).await)
    }
}

/// Lowercase each character to a single character so char offsets line up
/// with the original text.
fn fold(text: &str) -> String {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn rank(documents: &[StoredDocument], query: &str, max_results: usize) -> Vec<DocumentHit> {
    let folded_query = fold(query);
    let words: Vec<&str> = folded_query.split_whitespace().collect();
    if words.is_empty() || max_results == 0 {
        return Vec::new();
    }

    let mut hits: Vec<DocumentHit> = documents
        .iter()
        .filter_map(|doc| {
            let folded = fold(&doc.text);
            let score: usize = words.iter().map(|word| folded.matches(word).count()).sum();
            if score == 0 {
                return None;
            }

            let first_byte = words.iter().filter_map(|word| folded.find(word)).min()?;
            let first_char = folded[..first_byte].chars().count();
            Some(DocumentHit {
                name: doc.file_name.clone(),
                excerpt: excerpt(&doc.text, first_char),
                score,
            })
        })
        .collect();

    // stable sort keeps index order among equal scores
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(max_results);
    hits
}

fn excerpt(text: &str, match_char: usize) -> String {
    let total = text.chars().count();
    let start = match_char.saturating_sub(EXCERPT_BEFORE);
    let end = (match_char + EXCERPT_AFTER).min(total);

    let mut excerpt: String = text.chars().skip(start).take(end - start).collect();
    if start > 0 {
        excerpt.insert_str(0, "...");
    }
    if end < total {
        excerpt.push_str("...");
    }
    excerpt
}
