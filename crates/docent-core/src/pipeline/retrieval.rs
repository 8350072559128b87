//! Retrieval orchestration: baseline similarity query, topic and term
//! widening when results are sparse, and feedback-weighted reranking.

use crate::collaborators::{CollaboratorError, SimilaritySearch};
use crate::shared::Passage;
use docent_feedback::FeedbackStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Corpus topics that get their own supplementary query when the baseline
/// comes back thin.
const TOPIC_KEYWORDS: &[&str] = &[
    "leadership",
    "management",
    "trust",
    "communication",
    "motivation",
    "teamwork",
    "culture",
    "strategy",
    "coaching",
    "mentoring",
];

/// Words too common to be useful as broadened-search terms.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "when", "where", "which", "your",
    "about", "from", "have", "does", "how", "why", "are", "can", "will", "would", "should",
    "could", "them", "they", "their", "into", "more", "most", "some", "such", "than", "then",
    "tell", "give", "please",
];

/// Most important terms pulled from the query for the broadened pass.
const MAX_IMPORTANT_TERMS: usize = 3;

/// The neutral midpoint relevance ratings are centered on; an average at this
/// value produces zero boost.
const NEUTRAL_RELEVANCE: f64 = 3.0;
const BOOST_SCALE: f64 = 0.1;

/// A retrieved passage with its feedback-derived ranking boost. `None` means
/// the document has no usable feedback history (fewer than 2 observations, or
/// the store was unreachable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub boost: Option<f64>,
}

impl ScoredPassage {
    fn unscored(passage: Passage) -> Self {
        Self {
            passage,
            boost: None,
        }
    }
}

/// Runs the widening retrieval strategy and applies feedback boosts.
pub async fn retrieve<S: SimilaritySearch + ?Sized>(
    search: &S,
    store: &FeedbackStore,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredPassage>, CollaboratorError> {
    let mut passages = search.similarity_search(query, k).await?;
    let mut seen: HashSet<String> = passages.iter().map(|p| p.content.clone()).collect();

    // Topic widening: one supplementary query per detected topic while still
    // short of k.
    if passages.len() < k {
        for topic in detected_topics(query) {
            if passages.len() >= k {
                break;
            }
            let supplementary = search
                .similarity_search(&format!("{topic} research"), k)
                .await?;
            merge_new(&mut passages, &mut seen, supplementary, k);
        }
    }

    // Term broadening: below k/2, one more pass over the query's most
    // important terms.
    if passages.len() < k / 2 {
        let terms = important_terms(query);
        if !terms.is_empty() {
            let broadened = search.similarity_search(&terms.join(" "), k).await?;
            merge_new(&mut passages, &mut seen, broadened, k);
        }
    }

    tracing::debug!(
        target: "docent::retrieval",
        query = query,
        retrieved = passages.len(),
        requested = k,
        "retrieval complete"
    );

    Ok(apply_feedback_boosts(store, passages))
}

fn merge_new(
    passages: &mut Vec<Passage>,
    seen: &mut HashSet<String>,
    candidates: Vec<Passage>,
    k: usize,
) {
    for candidate in candidates {
        if passages.len() >= k {
            break;
        }
        if seen.insert(candidate.content.clone()) {
            passages.push(candidate);
        }
    }
}

/// Topics from the fixed keyword set present in the query.
fn detected_topics(query: &str) -> Vec<&'static str> {
    let lower = query.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .copied()
        .filter(|topic| lower.contains(topic))
        .collect()
}

/// Up to three distinct terms longer than 3 characters, stopwords removed.
fn important_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in query.to_lowercase().split_whitespace() {
        let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if word.len() > 3 && !STOPWORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
            if terms.len() == MAX_IMPORTANT_TERMS {
                break;
            }
        }
    }
    terms
}

/// Attaches per-document boosts and reorders by them. A store failure
/// degrades silently to no boost; retrieval never fails because of feedback.
fn apply_feedback_boosts(store: &FeedbackStore, passages: Vec<Passage>) -> Vec<ScoredPassage> {
    let doc_ids: Vec<String> = passages
        .iter()
        .filter_map(|p| p.doc_id.clone())
        .collect();
    if doc_ids.is_empty() {
        return passages.into_iter().map(ScoredPassage::unscored).collect();
    }

    let scores = match store.get_document_feedback_scores(&doc_ids) {
        Ok(scores) => scores,
        Err(err) => {
            tracing::warn!(
                target: "docent::retrieval",
                error = %err,
                "document feedback lookup failed; ranking without boosts"
            );
            return passages.into_iter().map(ScoredPassage::unscored).collect();
        }
    };

    let mut scored: Vec<ScoredPassage> = passages
        .into_iter()
        .map(|passage| {
            let boost = passage
                .doc_id
                .as_ref()
                .and_then(|id| scores.get(id))
                .map(|avg| (avg - NEUTRAL_RELEVANCE) * BOOST_SCALE);
            ScoredPassage { passage, boost }
        })
        .collect();

    // Stable sort: similarity order is preserved among equal boosts.
    scored.sort_by(|a, b| {
        let (a, b) = (a.boost.unwrap_or(0.0), b.boost.unwrap_or(0.0));
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Concatenated context for grading and generation.
pub fn concatenated_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.passage.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
