//! Collaborator seams: the external services the pipeline talks to.
//!
//! Calls are single-attempt with no retry or timeout; a collaborator error is
//! fatal for the current turn. "Profile not found" is a capability check
//! (`Option`), not an error.

use crate::shared::Passage;
use serde::{Deserialize, Serialize};

/// Errors raised by external collaborators. Fatal for the current turn.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("similarity search failed: {0}")]
    Search(String),
    #[error("generation failed: {0}")]
    Generation(String),
}

/// Token accounting reported by the generation collaborator, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One generated reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Vector-similarity search over the document corpus.
#[async_trait::async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Returns up to `k` passages ordered by similarity to `query`.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, CollaboratorError>;
}

/// Text generation. Treated as stateless and side-effect-free.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, CollaboratorError>;
}

/// Lookup of tone-profile text blobs by persona name. A missing profile is
/// not an error; callers fall back to the catalog default.
pub trait ToneProfileSource: Send + Sync {
    fn tone_profile(&self, persona: &str) -> Option<String>;
}

/// A source with no external tone profiles; every lookup falls through to the
/// built-in catalog tones.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToneProfiles;

impl ToneProfileSource for NoToneProfiles {
    fn tone_profile(&self, _persona: &str) -> Option<String> {
        None
    }
}
