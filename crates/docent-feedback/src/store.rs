//! SQLite-backed feedback store with connection-per-operation transactions.
//!
//! Four tables hold the durable side of the feedback loop:
//!
//! | Table             | Purpose                                              |
//! |-------------------|------------------------------------------------------|
//! | responses         | Every finalized answer, written once, never edited   |
//! | feedback          | Human ratings; a response may accumulate several     |
//! | document_feedback | One row per rated passage per feedback event         |
//! | query_patterns    | Running mean satisfaction per normalized query       |
//!
//! Every operation opens its own connection and short transaction, so
//! concurrent writers serialize at the storage engine rather than in the
//! application. Aggregate reads enforce minimum observation counts (2 for
//! documents, 3 for query patterns) so a single noisy rating never steers
//! retrieval or prompt suppression.

use chrono::{Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Errors raised by the durable feedback store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Passage metadata persisted alongside responses and feedback rows.
///
/// This is the slice of retrieval metadata the feedback loop needs: the
/// document id ties ratings back to retrieval ranking, the title and source
/// locator make exported rows readable without the corpus at hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageMeta {
    /// Stable document id from the similarity-search collaborator, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A stored response looked up by id for later feedback correlation.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub query: String,
    pub answer: String,
    pub passages: Vec<PassageMeta>,
    pub persona: String,
    pub latency_ms: u64,
}

/// A new feedback event to persist. Satisfaction is 1–5; relevance, when the
/// rater supplied one, is 1–3.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub response_id: String,
    pub query: String,
    pub satisfaction: u8,
    pub relevance: Option<u8>,
    pub comment: Option<String>,
    pub passages: Vec<PassageMeta>,
    pub persona: String,
    pub latency_ms: u64,
}

/// Aggregate feedback statistics for monitoring. All zeros on an empty store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackStats {
    pub total_feedback: u64,
    pub avg_satisfaction: f64,
    pub avg_relevance: f64,
    pub unique_queries: u64,
}

/// A document whose relevance ratings are consistently low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowPerformingDoc {
    pub doc_id: String,
    pub doc_title: String,
    pub avg_score: f64,
    pub feedback_count: u64,
}

/// One exported feedback row for offline batch analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackExportRow {
    pub query: String,
    pub satisfaction: u8,
    pub relevance: Option<u8>,
    pub comment: Option<String>,
    pub persona: String,
    pub created_at: String,
}

/// Stable hash of the lower-cased, trimmed query text. Groups rephrasings
/// that differ only in case or surrounding whitespace.
pub fn query_hash(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Durable store of responses, ratings, per-document scores, and per-query
/// rolling means. Cheap to clone a path into; each call opens its own
/// connection.
pub struct FeedbackStore {
    db_path: PathBuf,
}

impl FeedbackStore {
    /// Opens (or creates) the store at `path` and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let store = Self {
            db_path: path.as_ref().to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Opens a fresh connection for one operation. Also used by the KPI
    /// aggregator for its read-only queries.
    pub(crate) fn connection(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS responses (
                response_id   TEXT PRIMARY KEY,
                query         TEXT NOT NULL,
                answer        TEXT NOT NULL,
                passages_json TEXT,
                persona       TEXT,
                latency_ms    INTEGER,
                created_at    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS feedback (
                id            TEXT PRIMARY KEY,
                query_hash    TEXT NOT NULL,
                query         TEXT NOT NULL,
                response_id   TEXT NOT NULL,
                satisfaction  INTEGER,
                relevance     INTEGER,
                comment       TEXT,
                passages_json TEXT,
                persona       TEXT,
                latency_ms    INTEGER,
                created_at    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS document_feedback (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id          TEXT NOT NULL,
                doc_title       TEXT,
                query_hash      TEXT NOT NULL,
                relevance_score INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS query_patterns (
                query_hash       TEXT PRIMARY KEY,
                normalized_query TEXT NOT NULL,
                avg_satisfaction REAL,
                feedback_count   INTEGER DEFAULT 0,
                last_updated     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_query_hash
                ON feedback(query_hash);
            CREATE INDEX IF NOT EXISTS idx_document_feedback_doc_id
                ON document_feedback(doc_id);",
        )?;
        Ok(())
    }

    /// Persists a finalized answer. Append-only: each response id is minted
    /// fresh by the correlator, so this is a plain insert.
    pub fn store_response(
        &self,
        response_id: &str,
        query: &str,
        answer: &str,
        passages: &[PassageMeta],
        persona: &str,
        latency_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.connection()?;
        let passages_json = serde_json::to_string(passages)?;
        conn.execute(
            "INSERT INTO responses (response_id, query, answer, passages_json, persona, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                response_id,
                query,
                answer,
                passages_json,
                persona,
                latency_ms as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(
            target: "docent::feedback",
            response_id = response_id,
            persona = persona,
            "response persisted"
        );
        Ok(())
    }

    /// Looks up a stored response by id.
    pub fn get_response(&self, response_id: &str) -> Result<Option<StoredResponse>, StoreError> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT query, answer, passages_json, persona, latency_ms
                 FROM responses WHERE response_id = ?1",
                params![response_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((query, answer, passages_json, persona, latency_ms)) = row else {
            return Ok(None);
        };
        let passages = passages_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();
        Ok(Some(StoredResponse {
            query,
            answer,
            passages,
            persona: persona.unwrap_or_else(|| "default".to_string()),
            latency_ms: latency_ms.unwrap_or(0).max(0) as u64,
        }))
    }

    /// Inserts a feedback event: the feedback row itself, one document row per
    /// rated passage when a relevance score is present, and an online update of
    /// the query-pattern running mean. Returns the new feedback id.
    pub fn store_feedback(&self, feedback: &NewFeedback) -> Result<String, StoreError> {
        let feedback_id = Uuid::new_v4().to_string();
        let hash = query_hash(&feedback.query);
        let now = Utc::now().to_rfc3339();
        let passages_json = serde_json::to_string(&feedback.passages)?;

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO feedback (id, query_hash, query, response_id, satisfaction, relevance,
                                   comment, passages_json, persona, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                feedback_id,
                hash,
                feedback.query,
                feedback.response_id,
                feedback.satisfaction,
                feedback.relevance,
                feedback.comment,
                passages_json,
                feedback.persona,
                feedback.latency_ms as i64,
                now,
            ],
        )?;

        if let Some(relevance) = feedback.relevance {
            for passage in &feedback.passages {
                let Some(doc_id) = passage.doc_id.as_deref().filter(|id| !id.is_empty()) else {
                    continue;
                };
                tx.execute(
                    "INSERT INTO document_feedback (doc_id, doc_title, query_hash, relevance_score, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![doc_id, passage.title, hash, relevance, now],
                )?;
            }
        }

        // Running mean, never recomputed from scratch:
        // new_mean = (old_mean * old_count + score) / (old_count + 1)
        tx.execute(
            "INSERT INTO query_patterns (query_hash, normalized_query, avg_satisfaction, feedback_count, last_updated)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(query_hash) DO UPDATE SET
                 avg_satisfaction = (avg_satisfaction * feedback_count + ?3) / (feedback_count + 1),
                 feedback_count = feedback_count + 1,
                 last_updated = ?4",
            params![
                hash,
                feedback.query.trim().to_lowercase(),
                feedback.satisfaction as f64,
                now,
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            target: "docent::feedback",
            feedback_id = %feedback_id,
            response_id = %feedback.response_id,
            satisfaction = feedback.satisfaction,
            relevance = ?feedback.relevance,
            "feedback stored"
        );
        Ok(feedback_id)
    }

    /// Average relevance score per document, restricted to documents with at
    /// least 2 observations. Used by retrieval to weight ranking.
    pub fn get_document_feedback_scores(
        &self,
        doc_ids: &[String],
    ) -> Result<HashMap<String, f64>, StoreError> {
        if doc_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connection()?;
        let placeholders = vec!["?"; doc_ids.len()].join(",");
        let sql = format!(
            "SELECT doc_id, AVG(relevance_score) AS avg_score, COUNT(*) AS cnt
             FROM document_feedback
             WHERE doc_id IN ({placeholders})
             GROUP BY doc_id
             HAVING cnt >= 2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut scores = HashMap::new();
        for row in rows {
            let (doc_id, avg) = row?;
            scores.insert(doc_id, avg);
        }
        Ok(scores)
    }

    /// Mean satisfaction for this query pattern, or None below 3 observations.
    pub fn get_query_pattern_score(&self, query: &str) -> Result<Option<f64>, StoreError> {
        let conn = self.connection()?;
        let score = conn
            .query_row(
                "SELECT avg_satisfaction FROM query_patterns
                 WHERE query_hash = ?1 AND feedback_count >= 3",
                params![query_hash(query)],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()?
            .flatten();
        Ok(score)
    }

    /// Basic feedback statistics over rows that carry a satisfaction score.
    pub fn feedback_stats(&self) -> Result<FeedbackStats, StoreError> {
        let conn = self.connection()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    AVG(satisfaction),
                    AVG(relevance),
                    COUNT(DISTINCT query_hash)
             FROM feedback
             WHERE satisfaction IS NOT NULL",
            [],
            |row| {
                Ok(FeedbackStats {
                    total_feedback: row.get::<_, i64>(0)?.max(0) as u64,
                    avg_satisfaction: round2(row.get::<_, Option<f64>>(1)?.unwrap_or(0.0)),
                    avg_relevance: round2(row.get::<_, Option<f64>>(2)?.unwrap_or(0.0)),
                    unique_queries: row.get::<_, i64>(3)?.max(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }

    /// Documents rated at least 3 times whose mean relevance is below
    /// `threshold`, worst first.
    pub fn low_performing_documents(
        &self,
        threshold: f64,
    ) -> Result<Vec<LowPerformingDoc>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT doc_id, doc_title, AVG(relevance_score) AS avg_score, COUNT(*) AS cnt
             FROM document_feedback
             GROUP BY doc_id, doc_title
             HAVING cnt >= 3 AND avg_score < ?1
             ORDER BY avg_score ASC",
        )?;
        let rows = stmt.query_map(params![threshold], |row| {
            Ok(LowPerformingDoc {
                doc_id: row.get(0)?,
                doc_title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                avg_score: round2(row.get(2)?),
                feedback_count: row.get::<_, i64>(3)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Feedback from the last `days` days that is worth a second look:
    /// low satisfaction (≤ 2) or a free-text comment.
    pub fn export_recent(&self, days: i64) -> Result<Vec<FeedbackExportRow>, StoreError> {
        let conn = self.connection()?;
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT query, satisfaction, relevance, comment, persona, created_at
             FROM feedback
             WHERE created_at >= ?1
               AND (satisfaction <= 2 OR comment IS NOT NULL)
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok(FeedbackExportRow {
                query: row.get(0)?,
                satisfaction: row.get::<_, i64>(1)?.clamp(0, u8::MAX as i64) as u8,
                relevance: row
                    .get::<_, Option<i64>>(2)?
                    .map(|v| v.clamp(0, u8::MAX as i64) as u8),
                comment: row.get(3)?,
                persona: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                created_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Destructive full reset: clears all four tables. Confirmation is the
    /// calling tool's responsibility, not this store's.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM feedback", [])?;
        tx.execute("DELETE FROM responses", [])?;
        tx.execute("DELETE FROM document_feedback", [])?;
        tx.execute("DELETE FROM query_patterns", [])?;
        tx.commit()?;
        tracing::warn!(target: "docent::feedback", "feedback store reset: all tables cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FeedbackStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FeedbackStore::open(dir.path().join("feedback.db")).expect("open store");
        (dir, store)
    }

    fn feedback_for(query: &str, satisfaction: u8, relevance: Option<u8>) -> NewFeedback {
        NewFeedback {
            response_id: "resp-1".to_string(),
            query: query.to_string(),
            satisfaction,
            relevance,
            comment: None,
            passages: vec![PassageMeta {
                doc_id: Some("doc-a".to_string()),
                title: Some("Trust in Teams".to_string()),
                source: Some("https://example.org/doc-a".to_string()),
            }],
            persona: "default".to_string(),
            latency_ms: 120,
        }
    }

    #[test]
    fn response_roundtrip_preserves_fields() {
        let (_dir, store) = temp_store();
        let passages = vec![PassageMeta {
            doc_id: Some("doc-1".to_string()),
            title: Some("Servant Leadership".to_string()),
            source: Some("https://example.org/doc-1".to_string()),
        }];
        store
            .store_response("r-42", "what is leadership?", "an answer", &passages, "janelle", 250)
            .unwrap();

        let stored = store.get_response("r-42").unwrap().expect("stored response");
        assert_eq!(stored.query, "what is leadership?");
        assert_eq!(stored.answer, "an answer");
        assert_eq!(stored.persona, "janelle");
        assert_eq!(stored.latency_ms, 250);
        assert_eq!(stored.passages.len(), 1);
        assert_eq!(stored.passages[0].doc_id.as_deref(), Some("doc-1"));
    }

    #[test]
    fn unknown_response_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.get_response("missing").unwrap().is_none());
    }

    #[test]
    fn query_pattern_running_mean() {
        let (_dir, store) = temp_store();
        for score in [4, 2, 5] {
            store
                .store_feedback(&feedback_for("What makes a good leader?", score, None))
                .unwrap();
        }

        let conn = store.connection().unwrap();
        let (avg, count): (f64, i64) = conn
            .query_row(
                "SELECT avg_satisfaction, feedback_count FROM query_patterns WHERE query_hash = ?1",
                params![query_hash("What makes a good leader?")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 3);
        assert!((avg - (4.0 + 2.0 + 5.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn query_pattern_score_requires_three_observations() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("q", 5, None)).unwrap();
        store.store_feedback(&feedback_for("q", 5, None)).unwrap();
        assert!(store.get_query_pattern_score("q").unwrap().is_none());

        store.store_feedback(&feedback_for("q", 5, None)).unwrap();
        assert_eq!(store.get_query_pattern_score("q").unwrap(), Some(5.0));
    }

    #[test]
    fn query_hash_normalizes_case_and_whitespace() {
        assert_eq!(query_hash("  What is trust? "), query_hash("what is trust?"));
        assert_eq!(query_hash("a").len(), 16);
    }

    #[test]
    fn document_scores_need_two_observations() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("q1", 4, Some(3))).unwrap();

        let ids = vec!["doc-a".to_string()];
        assert!(store.get_document_feedback_scores(&ids).unwrap().is_empty());

        store.store_feedback(&feedback_for("q2", 4, Some(1))).unwrap();
        let scores = store.get_document_feedback_scores(&ids).unwrap();
        assert_eq!(scores.get("doc-a"), Some(&2.0));
    }

    #[test]
    fn document_scores_idempotent_without_writes() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("q1", 4, Some(3))).unwrap();
        store.store_feedback(&feedback_for("q2", 4, Some(2))).unwrap();

        let ids = vec!["doc-a".to_string()];
        let first = store.get_document_feedback_scores(&ids).unwrap();
        let second = store.get_document_feedback_scores(&ids).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_document_rows_without_relevance_score() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("q", 4, None)).unwrap();

        let conn = store.connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM document_feedback", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn stats_on_empty_store_are_zero() {
        let (_dir, store) = temp_store();
        let stats = store.feedback_stats().unwrap();
        assert_eq!(stats, FeedbackStats::default());
    }

    #[test]
    fn stats_reflect_stored_feedback() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("q1", 4, Some(3))).unwrap();
        store.store_feedback(&feedback_for("q2", 2, Some(1))).unwrap();

        let stats = store.feedback_stats().unwrap();
        assert_eq!(stats.total_feedback, 2);
        assert_eq!(stats.unique_queries, 2);
        assert!((stats.avg_satisfaction - 3.0).abs() < 1e-9);
        assert!((stats.avg_relevance - 2.0).abs() < 1e-9);
    }

    #[test]
    fn low_performers_require_three_ratings_below_threshold() {
        let (_dir, store) = temp_store();
        for query in ["q1", "q2"] {
            store.store_feedback(&feedback_for(query, 2, Some(1))).unwrap();
        }
        assert!(store.low_performing_documents(2.0).unwrap().is_empty());

        store.store_feedback(&feedback_for("q3", 2, Some(1))).unwrap();
        let low = store.low_performing_documents(2.0).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].doc_id, "doc-a");
        assert_eq!(low[0].feedback_count, 3);
        assert!((low[0].avg_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn export_filters_to_low_scores_or_comments() {
        let (_dir, store) = temp_store();
        store.store_feedback(&feedback_for("fine", 5, None)).unwrap();
        store.store_feedback(&feedback_for("poor", 1, None)).unwrap();
        let mut commented = feedback_for("commented", 4, None);
        commented.comment = Some("missed the point".to_string());
        store.store_feedback(&commented).unwrap();

        let rows = store.export_recent(7).unwrap();
        let queries: Vec<&str> = rows.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(rows.len(), 2);
        assert!(queries.contains(&"poor"));
        assert!(queries.contains(&"commented"));
    }

    #[test]
    fn reset_clears_everything() {
        let (_dir, store) = temp_store();
        store
            .store_response("r-1", "q", "a", &[], "default", 10)
            .unwrap();
        store.store_feedback(&feedback_for("q", 3, Some(2))).unwrap();

        store.reset().unwrap();
        assert_eq!(store.feedback_stats().unwrap(), FeedbackStats::default());
        assert!(store.get_response("r-1").unwrap().is_none());
    }
}
