//! Shared types for the post triage pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A post as supplied by the fetch collaborator. Immutable; owned by the
/// pipeline only for the duration of one processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    /// Opaque stable id, unique per source.
    pub id: String,
    pub title: String,
    /// May be empty (link posts).
    pub body: String,
    pub author: String,
    /// Source channel identifier this post came from.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub num_comments: i64,
    pub is_self: bool,
}

/// Where processing of a single post stopped. One outcome per pass;
/// the pipeline short-circuits at the first negative step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// Dedup hit — post was already seen to completion.
    AlreadyProcessed,
    /// Failed basic validity (deleted author, empty title, low score, too old).
    Invalid,
    /// No keyword rule fired.
    NoMatch,
    /// Rules fired but the best priority was below the floor.
    BelowPriority,
    /// Defensive re-check — a reply was already dispatched for this id.
    AlreadyReplied,
    /// Reply gate closed; post left unmarked for a later pass.
    GateClosed,
    /// Every provider failed; post left unmarked for a later pass.
    GenerationFailed,
    /// Dispatch was rejected; post marked processed but not replied.
    DispatchFailed,
    /// Reply dispatched and recorded.
    Replied { provider: &'static str },
}

impl PostOutcome {
    /// Short label for logging and activity entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyProcessed => "already_processed",
            Self::Invalid => "invalid",
            Self::NoMatch => "no_match",
            Self::BelowPriority => "below_priority",
            Self::AlreadyReplied => "already_replied",
            Self::GateClosed => "gate_closed",
            Self::GenerationFailed => "generation_failed",
            Self::DispatchFailed => "dispatch_failed",
            Self::Replied { .. } => "replied",
        }
    }
}

/// The external fetch/reply collaborator — pure I/O, no triage logic.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch new posts from a source channel, newest first.
    async fn fetch_new_posts(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<RawPost>, SourceError>;

    /// Dispatch a reply to a post. `Ok(false)` means a non-fatal
    /// rejection (locked thread, provider-side rate limit); anything
    /// other than `Ok(true)` is a dispatch failure to the pipeline.
    async fn post_reply(&self, post_id: &str, text: &str) -> Result<bool, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_are_distinct() {
        let outcomes = [
            PostOutcome::AlreadyProcessed,
            PostOutcome::Invalid,
            PostOutcome::NoMatch,
            PostOutcome::BelowPriority,
            PostOutcome::AlreadyReplied,
            PostOutcome::GateClosed,
            PostOutcome::GenerationFailed,
            PostOutcome::DispatchFailed,
            PostOutcome::Replied { provider: "gemini" },
        ];
        let labels: std::collections::HashSet<_> =
            outcomes.iter().map(|o| o.label()).collect();
        assert_eq!(labels.len(), outcomes.len());
    }

    #[test]
    fn raw_post_serializes() {
        let post = RawPost {
            id: "p1".into(),
            title: "A title".into(),
            body: String::new(),
            author: "alice".into(),
            source: "india".into(),
            created_at: Utc::now(),
            score: 10,
            num_comments: 2,
            is_self: true,
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["source"], "india");
    }
}
