//! In-memory monitor — the state shared between the pipeline and the
//! status/control API.
//!
//! The pipeline writes (counters, activity, errors); the API reads and
//! issues control transitions. Everything lives behind a single
//! `tokio::sync::RwLock` so readers always observe a consistent
//! snapshot — a multi-field update is never visible half-applied.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

const MAX_ACTIVITIES: usize = 50;
const MAX_ERRORS: usize = 20;

/// Bot lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Stopped,
    Running,
    Paused,
    /// Durable storage is unreachable; the bot stops cycling but the
    /// process stays up so the dashboard can report it.
    Unhealthy,
}

/// In-memory counters mirroring the daily-stats columns.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub posts_checked: u64,
    pub keywords_matched: u64,
    pub responses_generated: u64,
    pub successful_replies: u64,
    pub failed_replies: u64,
    pub errors: u64,
}

/// One entry in the recent-activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub details: serde_json::Value,
}

/// One entry in the recent-errors feed.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug)]
struct MonitorInner {
    status: BotStatus,
    started_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
    stats: SessionStats,
    /// Most-recent-first, capped at `MAX_ACTIVITIES`.
    activities: VecDeque<ActivityEntry>,
    /// Most-recent-first, capped at `MAX_ERRORS`.
    errors: VecDeque<ErrorEntry>,
    sources: Vec<String>,
    providers: Vec<String>,
}

/// Consistent snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub status: BotStatus,
    pub uptime_secs: Option<i64>,
    pub last_activity: Option<DateTime<Utc>>,
    pub stats: SessionStats,
    pub sources: Vec<String>,
    pub providers: Vec<String>,
}

/// Shared monitor handle.
pub struct Monitor {
    inner: RwLock<MonitorInner>,
}

impl Monitor {
    pub fn new(sources: Vec<String>, providers: Vec<String>) -> Self {
        Self {
            inner: RwLock::new(MonitorInner {
                status: BotStatus::Stopped,
                started_at: None,
                last_activity: None,
                stats: SessionStats::default(),
                activities: VecDeque::new(),
                errors: VecDeque::new(),
                sources,
                providers,
            }),
        }
    }

    pub async fn status(&self) -> BotStatus {
        self.inner.read().await.status
    }

    pub async fn set_status(&self, status: BotStatus) {
        let mut inner = self.inner.write().await;
        match status {
            BotStatus::Running if inner.started_at.is_none() => {
                inner.started_at = Some(Utc::now());
            }
            BotStatus::Stopped => inner.started_at = None,
            _ => {}
        }
        if inner.status != status {
            info!(from = ?inner.status, to = ?status, "Bot status changed");
        }
        inner.status = status;
        inner.last_activity = Some(Utc::now());
    }

    /// Resume is only valid from `Paused`; other states are left alone.
    pub async fn resume(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.status == BotStatus::Paused {
            inner.status = BotStatus::Running;
            inner.last_activity = Some(Utc::now());
            info!("Bot resumed");
            true
        } else {
            false
        }
    }

    /// Increment one session counter. The counter and last-activity stamp
    /// move together under the write lock.
    pub async fn increment(&self, stat: Stat) {
        let mut inner = self.inner.write().await;
        match stat {
            Stat::PostsChecked => inner.stats.posts_checked += 1,
            Stat::KeywordsMatched => inner.stats.keywords_matched += 1,
            Stat::ResponsesGenerated => inner.stats.responses_generated += 1,
            Stat::SuccessfulReplies => inner.stats.successful_replies += 1,
            Stat::FailedReplies => inner.stats.failed_replies += 1,
            Stat::Errors => inner.stats.errors += 1,
        }
        inner.last_activity = Some(Utc::now());
    }

    pub async fn log_activity(&self, kind: &str, details: serde_json::Value) {
        let mut inner = self.inner.write().await;
        inner.activities.push_front(ActivityEntry {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            details,
        });
        inner.activities.truncate(MAX_ACTIVITIES);
        inner.last_activity = Some(Utc::now());
    }

    pub async fn log_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.errors.push_front(ErrorEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
        inner.errors.truncate(MAX_ERRORS);
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.read().await;
        MonitorSnapshot {
            status: inner.status,
            uptime_secs: inner
                .started_at
                .map(|t| (Utc::now() - t).num_seconds().max(0)),
            last_activity: inner.last_activity,
            stats: inner.stats,
            sources: inner.sources.clone(),
            providers: inner.providers.clone(),
        }
    }

    pub async fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry> {
        let inner = self.inner.read().await;
        inner
            .activities
            .iter()
            .take(limit.min(MAX_ACTIVITIES))
            .cloned()
            .collect()
    }

    pub async fn recent_errors(&self, limit: usize) -> Vec<ErrorEntry> {
        let inner = self.inner.read().await;
        inner
            .errors
            .iter()
            .take(limit.min(MAX_ERRORS))
            .cloned()
            .collect()
    }
}

/// Closed set of session counters.
#[derive(Debug, Clone, Copy)]
pub enum Stat {
    PostsChecked,
    KeywordsMatched,
    ResponsesGenerated,
    SuccessfulReplies,
    FailedReplies,
    Errors,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_transitions() {
        let monitor = Monitor::new(vec![], vec![]);
        assert_eq!(monitor.status().await, BotStatus::Stopped);

        monitor.set_status(BotStatus::Running).await;
        let snap = monitor.snapshot().await;
        assert_eq!(snap.status, BotStatus::Running);
        assert!(snap.uptime_secs.is_some());

        monitor.set_status(BotStatus::Stopped).await;
        let snap = monitor.snapshot().await;
        assert!(snap.uptime_secs.is_none());
    }

    #[tokio::test]
    async fn resume_only_from_paused() {
        let monitor = Monitor::new(vec![], vec![]);
        assert!(!monitor.resume().await);

        monitor.set_status(BotStatus::Paused).await;
        assert!(monitor.resume().await);
        assert_eq!(monitor.status().await, BotStatus::Running);
    }

    #[tokio::test]
    async fn counters_increment_independently() {
        let monitor = Monitor::new(vec![], vec![]);
        monitor.increment(Stat::PostsChecked).await;
        monitor.increment(Stat::PostsChecked).await;
        monitor.increment(Stat::Errors).await;

        let stats = monitor.snapshot().await.stats;
        assert_eq!(stats.posts_checked, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.successful_replies, 0);
    }

    #[tokio::test]
    async fn activity_ring_is_capped_most_recent_first() {
        let monitor = Monitor::new(vec![], vec![]);
        for i in 0..60 {
            monitor
                .log_activity("test", serde_json::json!({ "i": i }))
                .await;
        }
        let activities = monitor.recent_activity(100).await;
        assert_eq!(activities.len(), MAX_ACTIVITIES);
        // Most recent first
        assert_eq!(activities[0].details["i"], 59);
    }

    #[tokio::test]
    async fn error_ring_is_capped() {
        let monitor = Monitor::new(vec![], vec![]);
        for i in 0..30 {
            monitor.log_error(format!("error {i}")).await;
        }
        let errors = monitor.recent_errors(100).await;
        assert_eq!(errors.len(), MAX_ERRORS);
        assert_eq!(errors[0].message, "error 29");
    }

    #[tokio::test]
    async fn recent_limits_are_respected() {
        let monitor = Monitor::new(vec![], vec![]);
        for _ in 0..10 {
            monitor.log_activity("a", serde_json::json!({})).await;
        }
        assert_eq!(monitor.recent_activity(3).await.len(), 3);
    }
}
