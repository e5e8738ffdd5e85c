//! Persistence layer — dedup table, append-only interaction ledger, and
//! daily aggregate statistics over libSQL.

pub mod libsql_backend;
pub mod migrations;

pub use libsql_backend::LibSqlStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::StoreError;

/// Kind of a ledger entry. Closed set — adding a kind means adding a
/// daily-stats counter and a `match` arm, deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Checked,
    Matched,
    Generated,
    Posted,
    Failed,
    Error,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checked => "checked",
            Self::Matched => "matched",
            Self::Generated => "generated",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checked" => Some(Self::Checked),
            "matched" => Some(Self::Matched),
            "generated" => Some(Self::Generated),
            "posted" => Some(Self::Posted),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A ledger entry to insert. Flat record; which optional fields are
/// populated is fixed per kind:
///
/// | kind      | post/source/title | keywords | provider/text | success | error |
/// |-----------|-------------------|----------|---------------|---------|-------|
/// | checked   | yes               | —        | —             | —       | —     |
/// | matched   | yes               | yes      | —             | —       | —     |
/// | generated | yes               | —        | yes           | true    | —     |
/// | posted    | yes               | —        | yes           | true    | —     |
/// | failed    | yes               | —        | —             | false   | yes   |
/// | error     | optional          | —        | —             | false   | yes   |
#[derive(Debug, Clone, Default)]
pub struct NewInteraction {
    pub kind: Option<InteractionKind>,
    pub post_id: Option<String>,
    pub source: Option<String>,
    pub post_title: Option<String>,
    pub matched_keywords: Option<Vec<String>>,
    pub provider: Option<String>,
    pub response_text: Option<String>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewInteraction {
    pub fn checked(post_id: &str, source: &str, title: &str) -> Self {
        Self {
            kind: Some(InteractionKind::Checked),
            post_id: Some(post_id.into()),
            source: Some(source.into()),
            post_title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn matched(post_id: &str, source: &str, title: &str, keywords: Vec<String>) -> Self {
        Self {
            kind: Some(InteractionKind::Matched),
            post_id: Some(post_id.into()),
            source: Some(source.into()),
            post_title: Some(title.into()),
            matched_keywords: Some(keywords),
            ..Default::default()
        }
    }

    pub fn generated(post_id: &str, source: &str, text: &str, provider: &str) -> Self {
        Self {
            kind: Some(InteractionKind::Generated),
            post_id: Some(post_id.into()),
            source: Some(source.into()),
            response_text: Some(text.into()),
            provider: Some(provider.into()),
            success: Some(true),
            ..Default::default()
        }
    }

    pub fn posted(post_id: &str, source: &str, text: &str, provider: &str) -> Self {
        Self {
            kind: Some(InteractionKind::Posted),
            post_id: Some(post_id.into()),
            source: Some(source.into()),
            response_text: Some(text.into()),
            provider: Some(provider.into()),
            success: Some(true),
            ..Default::default()
        }
    }

    pub fn failed(post_id: &str, source: &str, error: &str) -> Self {
        Self {
            kind: Some(InteractionKind::Failed),
            post_id: Some(post_id.into()),
            source: Some(source.into()),
            error_message: Some(error.into()),
            success: Some(false),
            ..Default::default()
        }
    }

    pub fn error(message: &str, metadata: Option<serde_json::Value>) -> Self {
        Self {
            kind: Some(InteractionKind::Error),
            error_message: Some(message.into()),
            metadata,
            success: Some(false),
            ..Default::default()
        }
    }

    pub fn with_post(mut self, post_id: &str, source: &str) -> Self {
        self.post_id = Some(post_id.into());
        self.source = Some(source.into());
        self
    }
}

/// A ledger entry read back from the store. Never mutated after insert.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub kind: InteractionKind,
    pub post_id: Option<String>,
    pub source: Option<String>,
    pub post_title: Option<String>,
    pub matched_keywords: Option<Vec<String>>,
    pub provider: Option<String>,
    pub response_text: Option<String>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Dedup record for one post id. At most one per post id; `replied`
/// transitions false→true exactly once and never reverts.
#[derive(Debug, Clone, Serialize)]
pub struct PostRecord {
    pub post_id: String,
    pub source: String,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
    pub replied: bool,
    pub reply_attempts: i64,
}

/// One day of aggregate counters.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStatsRow {
    pub date: NaiveDate,
    pub posts_checked: i64,
    pub keywords_matched: i64,
    pub responses_generated: i64,
    pub successful_replies: i64,
    pub failed_replies: i64,
    pub errors: i64,
}

/// All-time totals (SUM over daily rows, zero-defaulted).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TotalStats {
    pub posts_checked: i64,
    pub keywords_matched: i64,
    pub responses_generated: i64,
    pub successful_replies: i64,
    pub failed_replies: i64,
    pub errors: i64,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOutcome {
    pub interactions_deleted: u64,
    pub posts_deleted: u64,
}

/// Backend-agnostic persistence trait for dedup state, the ledger, and
/// derived statistics. All mutation goes through the pipeline's single
/// execution context; reads may come from the status API concurrently.
#[async_trait]
pub trait Store: Send + Sync {
    /// Has this post id ever been seen to completion?
    async fn is_processed(&self, post_id: &str) -> Result<bool, StoreError>;

    /// Has a reply already been dispatched for this post id?
    async fn has_replied(&self, post_id: &str) -> Result<bool, StoreError>;

    /// Upsert the dedup record for a post.
    ///
    /// Insert-if-absent; on re-check updates `last_checked`, ORs the
    /// `replied` flag monotonically (once true, stays true), and bumps
    /// `reply_attempts` only when `replied=true` is passed.
    async fn mark_processed(
        &self,
        post_id: &str,
        source: &str,
        title: &str,
        author: &str,
        created_at: DateTime<Utc>,
        replied: bool,
    ) -> Result<(), StoreError>;

    /// Fetch the dedup record for a post id, if any.
    async fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>, StoreError>;

    /// Append a ledger entry and bump the matching daily counter.
    /// Returns the entry's sequential id.
    async fn log_interaction(&self, entry: NewInteraction) -> Result<i64, StoreError>;

    /// Most recent ledger entries, newest first, optionally filtered by kind.
    async fn recent_interactions(
        &self,
        limit: usize,
        kind: Option<InteractionKind>,
    ) -> Result<Vec<InteractionRecord>, StoreError>;

    /// Daily counters for the last `days` days, newest first.
    async fn daily_stats(&self, days: usize) -> Result<Vec<DailyStatsRow>, StoreError>;

    /// All-time counter totals.
    async fn total_stats(&self) -> Result<TotalStats, StoreError>;

    /// Retention sweep: drop ledger entries older than `ledger_keep_days`
    /// and dedup records older than `dedup_keep_days`. Dedup retention
    /// must exceed ledger retention so replay protection outlives
    /// interaction history.
    async fn prune(
        &self,
        ledger_keep_days: i64,
        dedup_keep_days: i64,
    ) -> Result<PruneOutcome, StoreError>;
}
