//! Feedback correlator: mints response ids, persists responses, and decides
//! when a feedback prompt is worth the user's time.
//!
//! Registration never fails the calling turn. If the durable write goes
//! wrong the id is still returned and the response stays in the in-memory
//! cache, so same-process feedback collection keeps working while the store
//! recovers.

use crate::store::{FeedbackStats, FeedbackStore, NewFeedback, PassageMeta, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Recent responses kept in memory for immediate feedback correlation.
const RESPONSE_CACHE_CAP: usize = 50;
/// How many of the oldest entries to drop once the cache is over capacity.
const RESPONSE_CACHE_EVICT: usize = 10;

/// Query patterns with at least this mean satisfaction stop triggering
/// feedback prompts.
const PROMPT_SUPPRESSION_MEAN: f64 = 4.0;

#[derive(Debug, Clone)]
struct CachedResponse {
    query: String,
    answer: String,
    passages: Vec<PassageMeta>,
    persona: String,
    latency_ms: u64,
    registered_at: DateTime<Utc>,
}

/// Correlates answers with later human ratings.
pub struct FeedbackCollector {
    store: Arc<FeedbackStore>,
    cache: DashMap<String, CachedResponse>,
}

impl FeedbackCollector {
    pub fn new(store: Arc<FeedbackStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<FeedbackStore> {
        &self.store
    }

    /// Registers a finalized answer and returns its fresh response id.
    ///
    /// Always succeeds locally: a failed durable write is logged, not raised,
    /// and the cached copy still allows feedback collection in this process.
    pub fn register_response(
        &self,
        query: &str,
        answer: &str,
        passages: &[PassageMeta],
        persona: &str,
        latency_ms: u64,
    ) -> String {
        let response_id = Uuid::new_v4().to_string();

        if let Err(err) =
            self.store
                .store_response(&response_id, query, answer, passages, persona, latency_ms)
        {
            tracing::error!(
                target: "docent::feedback",
                response_id = %response_id,
                error = %err,
                "failed to persist response; keeping in-memory copy only"
            );
        }

        self.cache.insert(
            response_id.clone(),
            CachedResponse {
                query: query.to_string(),
                answer: answer.to_string(),
                passages: passages.to_vec(),
                persona: persona.to_string(),
                latency_ms,
                registered_at: Utc::now(),
            },
        );
        self.evict_stale();

        response_id
    }

    fn evict_stale(&self) {
        if self.cache.len() <= RESPONSE_CACHE_CAP {
            return;
        }
        let mut entries: Vec<(String, DateTime<Utc>)> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().registered_at))
            .collect();
        entries.sort_by_key(|(_, at)| *at);
        for (key, _) in entries.into_iter().take(RESPONSE_CACHE_EVICT) {
            self.cache.remove(&key);
        }
    }

    /// Records a rating against a previously registered response. Returns the
    /// feedback id, or `None` when the response id is unknown in both the
    /// cache and the store.
    pub fn record_feedback(
        &self,
        response_id: &str,
        satisfaction: u8,
        relevance: Option<u8>,
        comment: Option<String>,
    ) -> Result<Option<String>, StoreError> {
        let cached = self.cache.get(response_id).map(|entry| entry.value().clone());
        let (query, passages, persona, latency_ms) = match cached {
            Some(c) => (c.query, c.passages, c.persona, c.latency_ms),
            None => match self.store.get_response(response_id)? {
                Some(stored) => (stored.query, stored.passages, stored.persona, stored.latency_ms),
                None => {
                    tracing::warn!(
                        target: "docent::feedback",
                        response_id = response_id,
                        "feedback for unknown response id dropped"
                    );
                    return Ok(None);
                }
            },
        };

        let feedback_id = self.store.store_feedback(&NewFeedback {
            response_id: response_id.to_string(),
            query,
            satisfaction,
            relevance,
            comment,
            passages,
            persona,
            latency_ms,
        })?;
        Ok(Some(feedback_id))
    }

    /// Whether a feedback prompt should follow an answer to `query`.
    ///
    /// Query patterns already proven good (mean ≥ 4.0 over at least 3 ratings)
    /// are not worth re-asking about; everything else is. Store errors degrade
    /// to "ask" so a broken store never silences collection.
    pub fn should_request_feedback(&self, query: &str) -> bool {
        match self.store.get_query_pattern_score(query) {
            Ok(Some(score)) if score >= PROMPT_SUPPRESSION_MEAN => false,
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(
                    target: "docent::feedback",
                    error = %err,
                    "query pattern lookup failed; requesting feedback anyway"
                );
                true
            }
        }
    }

    /// Cached answer text for a response id, if still in memory.
    pub fn cached_answer(&self, response_id: &str) -> Option<String> {
        self.cache.get(response_id).map(|entry| entry.value().answer.clone())
    }

    pub fn feedback_summary(&self) -> Result<FeedbackStats, StoreError> {
        self.store.feedback_stats()
    }

    /// Actionable suggestions derived from aggregate feedback.
    pub fn improvement_suggestions(&self) -> Result<Vec<String>, StoreError> {
        let mut suggestions = Vec::new();
        let stats = self.store.feedback_stats()?;

        if stats.avg_satisfaction > 0.0 {
            if stats.avg_satisfaction < 3.0 {
                suggestions.push("Low satisfaction detected - review response quality".to_string());
            } else if stats.avg_satisfaction < 4.0 {
                suggestions.push("Room for improvement in response satisfaction".to_string());
            }
        }
        if stats.avg_relevance > 0.0 && stats.avg_relevance < 2.5 {
            suggestions.push("Document relevance issues - review retrieval strategy".to_string());
        }

        let low_docs = self.store.low_performing_documents(2.0)?;
        if !low_docs.is_empty() {
            suggestions.push(format!(
                "{} documents consistently rated as irrelevant",
                low_docs.len()
            ));
        }

        if suggestions.is_empty() {
            suggestions.push("System performing well based on user feedback".to_string());
        }
        Ok(suggestions)
    }
}
