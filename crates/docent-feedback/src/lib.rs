//! docent-feedback: durable feedback capture, response correlation, and KPI
//! aggregation for the Docent answer pipeline.
//!
//! The store is a single file-backed SQLite database; every operation opens
//! its own short transaction, so independent pipeline invocations serialize
//! at the storage engine. The collector sits in front of the store, minting
//! response ids and deciding when to ask for a rating; the KPI monitor and
//! analytics read the same tables and never mutate them.

mod analytics;
mod collector;
mod kpi;
mod store;

pub use analytics::{
    FeedbackAnalytics, Insight, InsightKind, InsightsReport, Priority, Recommendation,
};
pub use collector::FeedbackCollector;
pub use kpi::{
    Alert, AlertKind, AlertLevel, KpiMonitor, KpiSnapshot, PerformanceGrade, PersonaBreakdown,
    PersonaPerformance, PilotSummary, Trend, TrendDirection, WeeklyMetrics,
};
pub use store::{
    query_hash, FeedbackExportRow, FeedbackStats, FeedbackStore, LowPerformingDoc, NewFeedback,
    PassageMeta, StoredResponse, StoreError,
};
