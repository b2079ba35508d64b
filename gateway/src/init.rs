//! One-shot preparation of runtime data before starting the gateway.
//!
//! This module hosts the logic behind the `voicekb-gateway init` CLI command.
//! The command rebuilds the local document index from the configured
//! documents directory and exits, so a freshly deployed server can answer
//! `sharepoint` knowledge queries without waiting for its startup refresh.
//!
//! Typical usage from the CLI:
//!
//! ```text
//! $ DOCUMENTS_DIR=/srv/documents DATA_DIR=/app/data voicekb-gateway init
//! ```
//!
//! To run it programmatically, call [`run`] inside an async context:
//!
//! ```rust,no_run
//! use voicekb_gateway::{ServerConfig, init};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let config = ServerConfig::from_env().unwrap();
//!     init::run(&config).await.expect("failed to build the document index");
//! });
//! ```

use anyhow::{Context, Result};

use crate::config::ServerConfig;
use crate::core::knowledge::{DirectorySource, DocumentIndex, RefreshSummary};

/// Refresh the document index under `data_dir` from `documents_dir`.
pub async fn run(config: &ServerConfig) -> Result<RefreshSummary> {
    tracing::info!(
        "Building document index in {} from {}",
        config.data_dir.display(),
        config.documents_dir.display()
    );

    let index = DocumentIndex::open(&config.data_dir).await;
    let source = DirectorySource::new(config.documents_dir.clone());
    let summary = index.refresh(&source).await.with_context(|| {
        format!(
            "Failed to refresh the document index from {}",
            config.documents_dir.display()
        )
    })?;

    tracing::info!(
        "Document index ready at {} ({} documents)",
        index.path().display(),
        summary.total
    );

    Ok(summary)
}
