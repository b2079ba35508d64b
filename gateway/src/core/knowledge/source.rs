use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{KnowledgeError, KnowledgeResult};

/// Plain-text document produced by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub text: String,
}

/// Supplier of extracted document text for the local index.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self) -> KnowledgeResult<Vec<SourceDocument>>;
}

/// Reads text documents from a directory (non-recursive).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

const TEXT_EXTENSIONS: [&str; 4] = ["txt", "md", "json", "csv"];

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_text_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn fetch(&self) -> KnowledgeResult<Vec<SourceDocument>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            KnowledgeError::NotConfigured(format!(
                "cannot read documents directory {}: {e}",
                self.root.display()
            ))
        })?;

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !Self::is_text_file(&path) {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    debug!("Loaded document {} ({} bytes)", name, text.len());
                    documents.push(SourceDocument {
                        name: name.to_string(),
                        text,
                    });
                }
                Err(e) => warn!("Skipping unreadable document {}: {}", path.display(), e),
            }
        }

        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_text_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b-policy.md"), "# Benefits").unwrap();
        fs::write(dir.path().join("a-handbook.txt"), "Vacation days").unwrap();
        fs::write(dir.path().join("scan.pdf"), [0u8, 1, 2]).unwrap();
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let docs = DirectorySource::new(dir.path()).fetch().await.unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a-handbook.txt", "b-policy.md"]);
        assert_eq!(docs[0].text, "Vacation days");
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let source = DirectorySource::new("/nonexistent/documents");
        assert!(matches!(
            source.fetch().await,
            Err(KnowledgeError::NotConfigured(_))
        ));
    }
}
