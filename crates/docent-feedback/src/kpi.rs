//! Read-only KPI aggregation over the feedback store.
//!
//! Weekly rollups, success/failure rates, trend direction, per-persona
//! performance, and alert conditions. Nothing in this module mutates the
//! store; report *formatting* belongs to the calling tool.

use crate::store::{FeedbackStore, StoreError};
use chrono::{Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Satisfaction at or above this counts as a success.
const SUCCESS_THRESHOLD: f64 = 4.0;
/// Satisfaction at or below this counts as a failure.
const FAILURE_THRESHOLD: f64 = 2.0;

/// Direction of the satisfaction trend over the last four weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

/// Trend verdict: direction plus signed percentage change of the last two
/// weeks against the two before them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub change_pct: f64,
}

/// Current headline KPI values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub total_responses: u64,
    pub total_feedback: u64,
    pub avg_satisfaction: f64,
    pub avg_relevance: f64,
    /// Percentage of ratings at or above the success threshold.
    pub success_rate: f64,
    /// Percentage of ratings at or below the failure threshold.
    pub failure_rate: f64,
    /// Feedback received as a percentage of responses issued.
    pub response_rate: f64,
    /// Mean satisfaction over the trailing 7 days.
    pub weekly_avg_satisfaction: f64,
    pub trend: Trend,
}

/// One week's slice of the rolling metrics window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyMetrics {
    pub week_start: String,
    pub week_end: String,
    /// 1 = most recent week.
    pub week_number: u32,
    pub feedback_count: u64,
    pub avg_satisfaction: f64,
    pub avg_relevance: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub min_satisfaction: u8,
    pub max_satisfaction: u8,
}

/// Aggregate performance of one persona voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaPerformance {
    pub persona: String,
    pub feedback_count: u64,
    pub avg_satisfaction: f64,
    pub avg_relevance: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
}

/// Per-persona breakdown, best performer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaBreakdown {
    pub personas: Vec<PersonaPerformance>,
    pub best_performing: Option<PersonaPerformance>,
    /// Personas below 3.5 mean satisfaction.
    pub needs_improvement: Vec<PersonaPerformance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowSatisfaction,
    HighFailureRate,
    DecliningPerformance,
    LowFeedbackRate,
}

/// A KPI condition that needs attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub kind: AlertKind,
    pub message: String,
    pub recommendation: String,
}

/// Overall grade bands for a pilot period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Average,
    BelowAverage,
    NeedsAttention,
}

impl PerformanceGrade {
    pub fn letter(&self) -> char {
        match self {
            Self::Excellent => 'A',
            Self::Good => 'B',
            Self::Average => 'C',
            Self::BelowAverage => 'D',
            Self::NeedsAttention => 'F',
        }
    }
}

/// Pilot-period rollup combining the headline KPIs with the weekly window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotSummary {
    pub duration_weeks: u32,
    /// (start of oldest week, end of newest week), when any data exists.
    pub period: Option<(String, String)>,
    pub total_responses: u64,
    pub total_feedback: u64,
    pub response_rate: f64,
    pub avg_satisfaction: f64,
    pub avg_success_rate: f64,
    pub trend: Trend,
    pub grade: PerformanceGrade,
    pub weekly: Vec<WeeklyMetrics>,
    pub insights: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Computes KPIs by querying the feedback store directly. Read-only.
pub struct KpiMonitor {
    store: Arc<FeedbackStore>,
}

impl KpiMonitor {
    pub fn new(store: Arc<FeedbackStore>) -> Self {
        Self { store }
    }

    /// Current comprehensive KPI snapshot.
    pub fn current_kpis(&self) -> Result<KpiSnapshot, StoreError> {
        let conn = self.store.connection()?;

        let (total_feedback, avg_satisfaction, avg_relevance, success_rate, failure_rate) = conn
            .query_row(
                "SELECT COUNT(*),
                        AVG(satisfaction),
                        AVG(relevance),
                        COUNT(CASE WHEN satisfaction >= ?1 THEN 1 END) * 100.0 / COUNT(*),
                        COUNT(CASE WHEN satisfaction <= ?2 THEN 1 END) * 100.0 / COUNT(*)
                 FROM feedback
                 WHERE satisfaction IS NOT NULL",
                params![SUCCESS_THRESHOLD, FAILURE_THRESHOLD],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?.max(0) as u64,
                        row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    ))
                },
            )?;

        let total_responses: i64 =
            conn.query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
        let total_responses = total_responses.max(0) as u64;
        let response_rate = if total_responses > 0 {
            total_feedback as f64 / total_responses as f64 * 100.0
        } else {
            0.0
        };

        let week_cutoff = (Utc::now() - Duration::days(7)).to_rfc3339();
        let weekly_avg: f64 = conn
            .query_row(
                "SELECT AVG(satisfaction) FROM feedback
                 WHERE created_at >= ?1 AND satisfaction IS NOT NULL",
                params![week_cutoff],
                |row| row.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        let trend = self.trend()?;

        Ok(KpiSnapshot {
            total_responses,
            total_feedback,
            avg_satisfaction: round2(avg_satisfaction),
            avg_relevance: round2(avg_relevance),
            success_rate: round2(success_rate),
            failure_rate: round2(failure_rate),
            response_rate: round2(response_rate),
            weekly_avg_satisfaction: round2(weekly_avg),
            trend,
        })
    }

    /// Weekly metrics for the last `weeks_back` weeks, most recent first.
    pub fn weekly_metrics(&self, weeks_back: u32) -> Result<Vec<WeeklyMetrics>, StoreError> {
        let conn = self.store.connection()?;
        let now = Utc::now();
        let mut weeks = Vec::with_capacity(weeks_back as usize);

        for week in 0..weeks_back {
            let start = now - Duration::weeks(week as i64 + 1);
            let end = now - Duration::weeks(week as i64);

            let metrics = conn.query_row(
                "SELECT COUNT(*),
                        AVG(satisfaction),
                        AVG(relevance),
                        COUNT(CASE WHEN satisfaction >= ?1 THEN 1 END) * 100.0 / COUNT(*),
                        COUNT(CASE WHEN satisfaction <= ?2 THEN 1 END) * 100.0 / COUNT(*),
                        MIN(satisfaction),
                        MAX(satisfaction)
                 FROM feedback
                 WHERE created_at BETWEEN ?3 AND ?4
                   AND satisfaction IS NOT NULL",
                params![
                    SUCCESS_THRESHOLD,
                    FAILURE_THRESHOLD,
                    start.to_rfc3339(),
                    end.to_rfc3339(),
                ],
                |row| {
                    Ok(WeeklyMetrics {
                        week_start: start.format("%Y-%m-%d").to_string(),
                        week_end: end.format("%Y-%m-%d").to_string(),
                        week_number: week + 1,
                        feedback_count: row.get::<_, i64>(0)?.max(0) as u64,
                        avg_satisfaction: round2(row.get::<_, Option<f64>>(1)?.unwrap_or(0.0)),
                        avg_relevance: round2(row.get::<_, Option<f64>>(2)?.unwrap_or(0.0)),
                        success_rate: round2(row.get::<_, Option<f64>>(3)?.unwrap_or(0.0)),
                        failure_rate: round2(row.get::<_, Option<f64>>(4)?.unwrap_or(0.0)),
                        min_satisfaction: row.get::<_, Option<i64>>(5)?.unwrap_or(0).clamp(0, 5)
                            as u8,
                        max_satisfaction: row.get::<_, Option<i64>>(6)?.unwrap_or(0).clamp(0, 5)
                            as u8,
                    })
                },
            )?;
            weeks.push(metrics);
        }
        Ok(weeks)
    }

    /// Trend of the last two weeks against the two before them.
    pub fn trend(&self) -> Result<Trend, StoreError> {
        let weekly = self.weekly_metrics(4)?;
        if weekly.len() < 2 {
            return Ok(Trend {
                direction: TrendDirection::InsufficientData,
                change_pct: 0.0,
            });
        }

        let recent: Vec<f64> = weekly[..2]
            .iter()
            .map(|w| w.avg_satisfaction)
            .filter(|&s| s > 0.0)
            .collect();
        let older: Vec<f64> = weekly[2..]
            .iter()
            .map(|w| w.avg_satisfaction)
            .filter(|&s| s > 0.0)
            .collect();

        let (Some(recent_avg), Some(older_avg)) = (mean(&recent), mean(&older)) else {
            return Ok(Trend {
                direction: TrendDirection::InsufficientData,
                change_pct: 0.0,
            });
        };

        let trend = if recent_avg > older_avg {
            Trend {
                direction: TrendDirection::Improving,
                change_pct: round2((recent_avg - older_avg) / older_avg * 100.0),
            }
        } else if recent_avg < older_avg {
            Trend {
                direction: TrendDirection::Declining,
                change_pct: round2(-((older_avg - recent_avg) / older_avg * 100.0)),
            }
        } else {
            Trend {
                direction: TrendDirection::Stable,
                change_pct: 0.0,
            }
        };
        Ok(trend)
    }

    /// Performance grouped by persona, best mean satisfaction first.
    pub fn persona_performance(&self) -> Result<PersonaBreakdown, StoreError> {
        let conn = self.store.connection()?;
        let mut stmt = conn.prepare(
            "SELECT persona,
                    COUNT(*),
                    AVG(satisfaction),
                    AVG(relevance),
                    COUNT(CASE WHEN satisfaction >= ?1 THEN 1 END) * 100.0 / COUNT(*),
                    COUNT(CASE WHEN satisfaction <= ?2 THEN 1 END) * 100.0 / COUNT(*)
             FROM feedback
             WHERE satisfaction IS NOT NULL
             GROUP BY persona
             ORDER BY AVG(satisfaction) DESC",
        )?;
        let rows = stmt.query_map(params![SUCCESS_THRESHOLD, FAILURE_THRESHOLD], |row| {
            Ok(PersonaPerformance {
                persona: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                feedback_count: row.get::<_, i64>(1)?.max(0) as u64,
                avg_satisfaction: round2(row.get::<_, Option<f64>>(2)?.unwrap_or(0.0)),
                avg_relevance: round2(row.get::<_, Option<f64>>(3)?.unwrap_or(0.0)),
                success_rate: round2(row.get::<_, Option<f64>>(4)?.unwrap_or(0.0)),
                failure_rate: round2(row.get::<_, Option<f64>>(5)?.unwrap_or(0.0)),
            })
        })?;
        let personas: Vec<PersonaPerformance> = rows.collect::<Result<_, _>>()?;

        let needs_improvement = personas
            .iter()
            .filter(|p| p.avg_satisfaction < 3.5)
            .cloned()
            .collect();
        Ok(PersonaBreakdown {
            best_performing: personas.first().cloned(),
            needs_improvement,
            personas,
        })
    }

    /// KPI conditions that require attention right now.
    pub fn alert_conditions(&self) -> Result<Vec<Alert>, StoreError> {
        let kpis = self.current_kpis()?;
        let mut alerts = Vec::new();

        if kpis.total_feedback > 0 && kpis.avg_satisfaction < 2.5 {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                kind: AlertKind::LowSatisfaction,
                message: format!(
                    "Average satisfaction critically low: {}/5.0",
                    kpis.avg_satisfaction
                ),
                recommendation: "Immediate review of response quality and content needed"
                    .to_string(),
            });
        }
        if kpis.failure_rate > 25.0 {
            alerts.push(Alert {
                level: AlertLevel::High,
                kind: AlertKind::HighFailureRate,
                message: format!("Failure rate too high: {}%", kpis.failure_rate),
                recommendation: "Review and improve response generation processes".to_string(),
            });
        }
        if kpis.trend.direction == TrendDirection::Declining && kpis.trend.change_pct < -10.0 {
            alerts.push(Alert {
                level: AlertLevel::Medium,
                kind: AlertKind::DecliningPerformance,
                message: format!("Performance declining: {}% change", kpis.trend.change_pct),
                recommendation: "Investigate recent changes and user feedback patterns".to_string(),
            });
        }
        if kpis.total_responses > 0 && kpis.response_rate < 10.0 {
            alerts.push(Alert {
                level: AlertLevel::Low,
                kind: AlertKind::LowFeedbackRate,
                message: format!("Low feedback collection rate: {}%", kpis.response_rate),
                recommendation: "Consider improving feedback collection prompts".to_string(),
            });
        }
        Ok(alerts)
    }

    /// Rollup of a pilot period: weekly window, averages, trend, and grade.
    pub fn pilot_summary(&self, pilot_weeks: u32) -> Result<PilotSummary, StoreError> {
        let kpis = self.current_kpis()?;
        let weekly = self.weekly_metrics(pilot_weeks)?;

        let satisfactions: Vec<f64> = weekly
            .iter()
            .map(|w| w.avg_satisfaction)
            .filter(|&s| s > 0.0)
            .collect();
        let success_rates: Vec<f64> = weekly
            .iter()
            .filter(|w| w.feedback_count > 0)
            .map(|w| w.success_rate)
            .collect();
        let avg_satisfaction = mean(&satisfactions).unwrap_or(0.0);
        let avg_success_rate = mean(&success_rates).unwrap_or(0.0);

        let period = match (weekly.last(), weekly.first()) {
            (Some(oldest), Some(newest)) => {
                Some((oldest.week_start.clone(), newest.week_end.clone()))
            }
            _ => None,
        };

        let insights = self.generate_insights(&weekly, &kpis);
        Ok(PilotSummary {
            duration_weeks: pilot_weeks,
            period,
            total_responses: kpis.total_responses,
            total_feedback: kpis.total_feedback,
            response_rate: kpis.response_rate,
            avg_satisfaction: round2(avg_satisfaction),
            avg_success_rate: round2(avg_success_rate),
            trend: kpis.trend,
            grade: assess_performance(avg_satisfaction, avg_success_rate),
            weekly,
            insights,
        })
    }

    fn generate_insights(&self, weekly: &[WeeklyMetrics], kpis: &KpiSnapshot) -> Vec<String> {
        let mut insights = Vec::new();

        if kpis.total_feedback < 20 {
            insights
                .push("Limited feedback data - consider encouraging more participation".to_string());
        }
        if kpis.success_rate > 70.0 {
            insights.push("High success rate indicates strong user satisfaction".to_string());
        } else if kpis.total_feedback > 0 && kpis.success_rate < 40.0 {
            insights.push("Low success rate - focus on improving response quality".to_string());
        }
        match kpis.trend.direction {
            TrendDirection::Improving => {
                insights.push("Positive trend - system is improving over time".to_string())
            }
            TrendDirection::Declining => {
                insights.push("Declining performance - investigate recent changes".to_string())
            }
            _ => {}
        }

        let weekly_satisfactions: Vec<f64> = weekly
            .iter()
            .map(|w| w.avg_satisfaction)
            .filter(|&s| s > 0.0)
            .collect();
        if weekly_satisfactions.len() >= 3 {
            let avg = weekly_satisfactions.iter().sum::<f64>() / weekly_satisfactions.len() as f64;
            let variance = weekly_satisfactions
                .iter()
                .map(|s| (s - avg).powi(2))
                .sum::<f64>()
                / (weekly_satisfactions.len() - 1) as f64;
            if variance.sqrt() > 0.5 {
                insights
                    .push("High variability in weekly performance - focus on consistency".to_string());
            } else {
                insights.push("Consistent performance across weeks".to_string());
            }
        }
        insights
    }
}

fn assess_performance(avg_satisfaction: f64, success_rate: f64) -> PerformanceGrade {
    if avg_satisfaction >= 4.0 && success_rate >= 75.0 {
        PerformanceGrade::Excellent
    } else if avg_satisfaction >= 3.5 && success_rate >= 60.0 {
        PerformanceGrade::Good
    } else if avg_satisfaction >= 3.0 && success_rate >= 45.0 {
        PerformanceGrade::Average
    } else if avg_satisfaction >= 2.5 && success_rate >= 30.0 {
        PerformanceGrade::BelowAverage
    } else {
        PerformanceGrade::NeedsAttention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewFeedback, PassageMeta};

    fn seeded_monitor() -> (tempfile::TempDir, Arc<FeedbackStore>, KpiMonitor) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(FeedbackStore::open(dir.path().join("feedback.db")).expect("open store"));
        let monitor = KpiMonitor::new(Arc::clone(&store));
        (dir, store, monitor)
    }

    fn rate(store: &FeedbackStore, query: &str, persona: &str, satisfaction: u8) {
        store
            .store_feedback(&NewFeedback {
                response_id: "r".to_string(),
                query: query.to_string(),
                satisfaction,
                relevance: Some(2),
                comment: None,
                passages: vec![PassageMeta {
                    doc_id: Some("d".to_string()),
                    title: None,
                    source: None,
                }],
                persona: persona.to_string(),
                latency_ms: 10,
            })
            .unwrap();
    }

    #[test]
    fn empty_store_yields_zero_kpis_and_no_data_trend() {
        let (_dir, _store, monitor) = seeded_monitor();
        let kpis = monitor.current_kpis().unwrap();
        assert_eq!(kpis.total_feedback, 0);
        assert_eq!(kpis.avg_satisfaction, 0.0);
        assert_eq!(kpis.trend.direction, TrendDirection::InsufficientData);
        assert!(monitor.alert_conditions().unwrap().is_empty());
    }

    #[test]
    fn success_and_failure_rates() {
        let (_dir, store, monitor) = seeded_monitor();
        rate(&store, "q1", "default", 5);
        rate(&store, "q2", "default", 4);
        rate(&store, "q3", "default", 2);
        rate(&store, "q4", "default", 1);

        let kpis = monitor.current_kpis().unwrap();
        assert_eq!(kpis.total_feedback, 4);
        assert!((kpis.success_rate - 50.0).abs() < 1e-9);
        assert!((kpis.failure_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn critical_alert_fires_on_low_satisfaction() {
        let (_dir, store, monitor) = seeded_monitor();
        for query in ["q1", "q2", "q3"] {
            rate(&store, query, "default", 1);
        }
        let alerts = monitor.alert_conditions().unwrap();
        assert!(alerts.iter().any(|a| a.kind == AlertKind::LowSatisfaction
            && a.level == AlertLevel::Critical));
        assert!(alerts.iter().any(|a| a.kind == AlertKind::HighFailureRate));
    }

    #[test]
    fn persona_breakdown_orders_by_satisfaction() {
        let (_dir, store, monitor) = seeded_monitor();
        rate(&store, "q1", "janelle", 5);
        rate(&store, "q2", "janelle", 5);
        rate(&store, "q3", "default", 2);

        let breakdown = monitor.persona_performance().unwrap();
        assert_eq!(breakdown.personas.len(), 2);
        assert_eq!(
            breakdown.best_performing.as_ref().map(|p| p.persona.as_str()),
            Some("janelle")
        );
        assert_eq!(breakdown.needs_improvement.len(), 1);
        assert_eq!(breakdown.needs_improvement[0].persona, "default");
    }

    #[test]
    fn pilot_summary_grades_strong_feedback() {
        let (_dir, store, monitor) = seeded_monitor();
        for query in ["q1", "q2", "q3", "q4"] {
            rate(&store, query, "default", 5);
        }
        let summary = monitor.pilot_summary(4).unwrap();
        assert_eq!(summary.duration_weeks, 4);
        assert_eq!(summary.weekly.len(), 4);
        assert_eq!(summary.grade, PerformanceGrade::Excellent);
        assert_eq!(summary.grade.letter(), 'A');
    }

    #[test]
    fn weekly_metrics_most_recent_first() {
        let (_dir, store, monitor) = seeded_monitor();
        rate(&store, "q", "default", 4);
        let weekly = monitor.weekly_metrics(4).unwrap();
        assert_eq!(weekly[0].week_number, 1);
        assert_eq!(weekly[0].feedback_count, 1);
        assert_eq!(weekly[3].feedback_count, 0);
    }
}
