//! Batch analytics over stored feedback: insight reports and JSON export.

use crate::store::{FeedbackStats, FeedbackStore, LowPerformingDoc, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    QualityIssue,
    RetrievalIssue,
    DocumentQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub description: String,
}

/// Insight report assembled from aggregate feedback, for system improvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsReport {
    pub generated_at: String,
    pub summary: FeedbackStats,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub low_performing_documents: Vec<LowPerformingDoc>,
}

/// Batch analytics facade over the feedback store.
pub struct FeedbackAnalytics {
    store: Arc<FeedbackStore>,
}

impl FeedbackAnalytics {
    pub fn new(store: Arc<FeedbackStore>) -> Self {
        Self { store }
    }

    /// Builds the insights report from current aggregates.
    pub fn insights_report(&self) -> Result<InsightsReport, StoreError> {
        let summary = self.store.feedback_stats()?;
        let low_docs = self.store.low_performing_documents(2.0)?;

        let mut insights = Vec::new();
        let mut recommendations = Vec::new();

        if summary.total_feedback > 0 {
            if summary.avg_satisfaction < 3.0 {
                insights.push(Insight {
                    kind: InsightKind::QualityIssue,
                    message: format!("Low average satisfaction ({}/5.0)", summary.avg_satisfaction),
                    priority: Priority::High,
                });
                recommendations.push(Recommendation {
                    action: "review_response_generation".to_string(),
                    description: "Review response generation prompts and context usage".to_string(),
                });
            }
            if summary.avg_relevance > 0.0 && summary.avg_relevance < 2.5 {
                insights.push(Insight {
                    kind: InsightKind::RetrievalIssue,
                    message: format!("Low document relevance ({}/3.0)", summary.avg_relevance),
                    priority: Priority::High,
                });
                recommendations.push(Recommendation {
                    action: "optimize_retrieval".to_string(),
                    description: "Review document chunking and embedding strategies".to_string(),
                });
            }
        }

        if !low_docs.is_empty() {
            insights.push(Insight {
                kind: InsightKind::DocumentQuality,
                message: format!("{} documents consistently rated as irrelevant", low_docs.len()),
                priority: Priority::Medium,
            });
            recommendations.push(Recommendation {
                action: "document_audit".to_string(),
                description: "Review and potentially remove low-performing documents".to_string(),
            });
        }

        Ok(InsightsReport {
            generated_at: Utc::now().to_rfc3339(),
            summary,
            insights,
            recommendations,
            low_performing_documents: low_docs,
        })
    }

    /// Exports recent actionable feedback as a pretty-printed JSON envelope
    /// for external analysis tools.
    pub fn export_json(&self, days: i64) -> Result<String, StoreError> {
        let feedback = self.store.export_recent(days)?;
        let envelope = serde_json::json!({
            "export_date": Utc::now().to_rfc3339(),
            "period_days": days,
            "feedback_count": feedback.len(),
            "feedback": feedback,
        });
        Ok(serde_json::to_string_pretty(&envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewFeedback, PassageMeta};

    fn analytics() -> (tempfile::TempDir, Arc<FeedbackStore>, FeedbackAnalytics) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(FeedbackStore::open(dir.path().join("feedback.db")).expect("open store"));
        let analytics = FeedbackAnalytics::new(Arc::clone(&store));
        (dir, store, analytics)
    }

    fn rate(store: &FeedbackStore, query: &str, satisfaction: u8, relevance: Option<u8>) {
        store
            .store_feedback(&NewFeedback {
                response_id: "r".to_string(),
                query: query.to_string(),
                satisfaction,
                relevance,
                comment: None,
                passages: vec![PassageMeta {
                    doc_id: Some("d".to_string()),
                    title: Some("t".to_string()),
                    source: None,
                }],
                persona: "default".to_string(),
                latency_ms: 1,
            })
            .unwrap();
    }

    #[test]
    fn empty_store_produces_empty_report() {
        let (_dir, _store, analytics) = analytics();
        let report = analytics.insights_report().unwrap();
        assert!(report.insights.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.summary.total_feedback, 0);
    }

    #[test]
    fn low_satisfaction_raises_quality_insight() {
        let (_dir, store, analytics) = analytics();
        rate(&store, "q1", 1, Some(1));
        rate(&store, "q2", 2, Some(1));

        let report = analytics.insights_report().unwrap();
        assert!(report
            .insights
            .iter()
            .any(|i| i.kind == InsightKind::QualityIssue && i.priority == Priority::High));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.action == "review_response_generation"));
    }

    #[test]
    fn export_envelope_counts_rows() {
        let (_dir, store, analytics) = analytics();
        rate(&store, "bad answer", 1, None);

        let json = analytics.export_json(7).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["feedback_count"], 1);
        assert_eq!(parsed["period_days"], 7);
        assert_eq!(parsed["feedback"][0]["query"], "bad answer");
    }
}
