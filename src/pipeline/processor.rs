//! Post processor — the composition root of the triage pipeline.
//!
//! **Core invariant: at most one reply per post id, ever.**
//!
//! Per post, in strict order, short-circuiting on the first negative
//! outcome: checked entry → dedup → validity → keyword match → priority
//! floor → replied re-check → reply gate → generate → dispatch →
//! persist. Gate-closed and generation-failed posts stay unmarked so a
//! later cycle can retry them; everything else is marked processed.
//!
//! Ledger writes are best-effort: a failed write is logged and never
//! stops processing. Dedup reads/writes are not — if the store is
//! unreachable the error propagates so the runner can degrade the bot
//! to unhealthy.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::gate::ReplyGate;
use crate::keywords::KeywordMatcher;
use crate::llm::ResponseGenerator;
use crate::monitor::{Monitor, Stat};
use crate::pipeline::types::{PostOutcome, RawPost, SourceClient};
use crate::store::{NewInteraction, Store};

/// Pipeline thresholds.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Minimum rule priority required to reply.
    pub min_priority: i32,
    /// Posts scoring below this fail validity.
    pub min_score: i64,
    /// Posts older than this fail validity.
    pub max_post_age: chrono::Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_priority: 2,
            min_score: -5,
            max_post_age: chrono::Duration::hours(24),
        }
    }
}

/// Triage pipeline for a single post.
pub struct PostProcessor {
    store: Arc<dyn Store>,
    matcher: KeywordMatcher,
    gate: Arc<ReplyGate>,
    generator: Arc<ResponseGenerator>,
    source: Arc<dyn SourceClient>,
    monitor: Arc<Monitor>,
    config: ProcessorConfig,
}

impl PostProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        matcher: KeywordMatcher,
        gate: Arc<ReplyGate>,
        generator: Arc<ResponseGenerator>,
        source: Arc<dyn SourceClient>,
        monitor: Arc<Monitor>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            matcher,
            gate,
            generator,
            source,
            monitor,
            config,
        }
    }

    /// Process one post through the full pipeline.
    ///
    /// Only store failures surface as `Err`; every external failure
    /// (generation, dispatch) is converted into an outcome and a ledger
    /// entry here.
    pub async fn process_post(&self, post: &RawPost) -> Result<PostOutcome, StoreError> {
        // Step 1: checked entry — always, exactly once per observation.
        self.log_ledger(NewInteraction::checked(&post.id, &post.source, &post.title))
            .await;
        self.monitor.increment(Stat::PostsChecked).await;

        // Step 2: dedup — an already-processed id is an idempotent no-op.
        if self.store.is_processed(&post.id).await? {
            debug!(post_id = %post.id, "Post already processed");
            return Ok(PostOutcome::AlreadyProcessed);
        }

        // Step 3: basic validity.
        if !self.is_valid(post) {
            debug!(post_id = %post.id, "Post not valid for responding");
            self.mark(post, false).await?;
            return Ok(PostOutcome::Invalid);
        }

        // Step 4: keyword match.
        let matches = self.matcher.match_post(&post.title, &post.body);
        if matches.is_empty() {
            debug!(post_id = %post.id, "No keyword matches");
            self.mark(post, false).await?;
            return Ok(PostOutcome::NoMatch);
        }

        // Step 5: matched entry with the union of matched keywords.
        let mut all_keywords: Vec<String> = Vec::new();
        for m in &matches {
            for k in &m.keywords {
                if !all_keywords.contains(k) {
                    all_keywords.push(k.clone());
                }
            }
        }
        self.log_ledger(NewInteraction::matched(
            &post.id,
            &post.source,
            &post.title,
            all_keywords.clone(),
        ))
        .await;
        self.monitor.increment(Stat::KeywordsMatched).await;
        self.monitor
            .log_activity(
                "keyword_match",
                serde_json::json!({
                    "post_id": post.id,
                    "source": post.source,
                    "keywords": all_keywords.iter().take(5).collect::<Vec<_>>(),
                }),
            )
            .await;

        // Step 6: priority floor.
        let Some(best) = self.matcher.should_respond(&matches, self.config.min_priority) else {
            info!(post_id = %post.id, "Matches below priority floor");
            self.mark(post, false).await?;
            return Ok(PostOutcome::BelowPriority);
        };

        // Step 7: defensive re-check — never double-reply, even under re-scan.
        if self.store.has_replied(&post.id).await? {
            info!(post_id = %post.id, "Already replied to this post");
            return Ok(PostOutcome::AlreadyReplied);
        }

        // Step 8: reply gate. No marking — the post stays eligible for a
        // later pass once the gate reopens.
        if !self.gate.can_reply() {
            info!(post_id = %post.id, "Reply gate closed, skipping");
            return Ok(PostOutcome::GateClosed);
        }

        // Step 9: generation with provider failover.
        let reply = match self
            .generator
            .generate_reply(
                &post.title,
                &post.body,
                &best.keywords,
                best.template.as_deref(),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Failed to generate response");
                self.log_ledger(
                    NewInteraction::error(&e.to_string(), None)
                        .with_post(&post.id, &post.source),
                )
                .await;
                self.monitor.increment(Stat::Errors).await;
                self.monitor
                    .log_error(format!("generation failed for {}: {e}", post.id))
                    .await;
                // Not marked processed: retry on a later cycle.
                return Ok(PostOutcome::GenerationFailed);
            }
        };

        self.log_ledger(NewInteraction::generated(
            &post.id,
            &post.source,
            &reply.text,
            reply.provider,
        ))
        .await;
        self.monitor.increment(Stat::ResponsesGenerated).await;
        self.monitor
            .log_activity(
                "response_generated",
                serde_json::json!({
                    "post_id": post.id,
                    "provider": reply.provider,
                    "length": reply.text.len(),
                }),
            )
            .await;

        // Step 10: dispatch.
        match self.source.post_reply(&post.id, &reply.text).await {
            Ok(true) => {
                self.gate.record_reply();
                self.log_ledger(NewInteraction::posted(
                    &post.id,
                    &post.source,
                    &reply.text,
                    reply.provider,
                ))
                .await;
                self.monitor.increment(Stat::SuccessfulReplies).await;
                self.monitor
                    .log_activity(
                        "reply_posted",
                        serde_json::json!({
                            "post_id": post.id,
                            "source": post.source,
                            "provider": reply.provider,
                        }),
                    )
                    .await;
                self.mark(post, true).await?;
                info!(post_id = %post.id, provider = reply.provider, "Replied to post");
                Ok(PostOutcome::Replied {
                    provider: reply.provider,
                })
            }
            Ok(false) => {
                warn!(post_id = %post.id, "Reply rejected by source");
                self.dispatch_failed(post, "reply rejected by source").await?;
                Ok(PostOutcome::DispatchFailed)
            }
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Reply dispatch errored");
                self.monitor
                    .log_error(format!("dispatch failed for {}: {e}", post.id))
                    .await;
                self.dispatch_failed(post, &e.to_string()).await?;
                Ok(PostOutcome::DispatchFailed)
            }
        }
    }

    /// Validity floor: deleted/missing author, empty title, low score,
    /// or too old.
    fn is_valid(&self, post: &RawPost) -> bool {
        if post.author.is_empty() || post.author == "[deleted]" {
            return false;
        }
        if post.title.trim().is_empty() {
            return false;
        }
        if post.score < self.config.min_score {
            return false;
        }
        if Utc::now() - post.created_at > self.config.max_post_age {
            return false;
        }
        true
    }

    async fn mark(&self, post: &RawPost, replied: bool) -> Result<(), StoreError> {
        self.store
            .mark_processed(
                &post.id,
                &post.source,
                &post.title,
                &post.author,
                post.created_at,
                replied,
            )
            .await
    }

    async fn dispatch_failed(&self, post: &RawPost, reason: &str) -> Result<(), StoreError> {
        self.log_ledger(NewInteraction::failed(&post.id, &post.source, reason))
            .await;
        self.monitor.increment(Stat::FailedReplies).await;
        self.monitor
            .log_activity(
                "reply_failed",
                serde_json::json!({
                    "post_id": post.id,
                    "source": post.source,
                    "reason": reason,
                }),
            )
            .await;
        // Marked processed (will not be retried) but not replied.
        self.mark(post, false).await
    }

    /// Best-effort ledger write: failures are logged, never fatal.
    async fn log_ledger(&self, entry: NewInteraction) {
        if let Err(e) = self.store.log_interaction(entry).await {
            error!(error = %e, "Ledger write failed");
            self.monitor
                .log_error(format!("ledger write failed: {e}"))
                .await;
        }
    }
}
