//! Retrieval index interface
//!
//! The orchestrator can enrich chat prompts from a local document index.
//! This module defines the collaborator interface; concrete indexes live
//! outside this crate. [`DisabledRag`] is the stand-in used when no index
//! is attached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a retrieval index
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Retrieval index unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval query failed: {0}")]
    Query(String),
}

/// A scored passage returned from a retrieval query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Identifier of the source document
    pub source: String,

    /// Passage text
    pub text: String,

    /// Relevance score, higher is better
    pub score: f32,
}

/// Summary of a retrieval index's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagStatus {
    /// Whether an index is attached at all
    pub available: bool,

    /// Whether the index has finished loading its documents
    pub loaded: bool,

    /// Number of indexed chunks
    pub chunk_count: u64,
}

/// Interface implemented by retrieval indexes
#[async_trait]
pub trait RagIndex: Send + Sync {
    /// Return the `top_k` passages most relevant to `query`
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, RagError>;

    /// Report the index's current state
    async fn status(&self) -> RagStatus;
}

/// Retrieval index used when none is configured. Every query fails with
/// [`RagError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRag;

#[async_trait]
impl RagIndex for DisabledRag {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Passage>, RagError> {
        Err(RagError::Unavailable(
            "no retrieval index configured".to_string(),
        ))
    }

    async fn status(&self) -> RagStatus {
        RagStatus {
            available: false,
            loaded: false,
            chunk_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_rag_search_fails() {
        let rag = DisabledRag;
        let result = rag.search("what is the capital of France", 3).await;
        assert!(matches!(result, Err(RagError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_disabled_rag_status() {
        let rag = DisabledRag;
        let status = rag.status().await;
        assert!(!status.available);
        assert!(!status.loaded);
        assert_eq!(status.chunk_count, 0);
    }

    #[test]
    fn test_error_display() {
        let err = RagError::Unavailable("no retrieval index configured".to_string());
        assert_eq!(
            err.to_string(),
            "Retrieval index unavailable: no retrieval index configured"
        );
    }
}
