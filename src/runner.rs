//! Cycle runner — periodic polling of sources, sequential post
//! processing, and the background tasks around it.
//!
//! One cycle walks the configured sources in order; within a source the
//! fetched posts are processed one at a time. There is no intra-cycle
//! parallelism: the reply gate and dedup store are single-writer
//! structures, and sequential processing keeps the at-most-one-reply
//! and rate-ceiling invariants trivial.
//!
//! Control signals are polled at two checkpoints — before each source
//! and before each post — so pausing never interrupts a post mid-flight.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::error::StoreError;
use crate::monitor::{BotStatus, Monitor, Stat};
use crate::pipeline::types::SourceClient;
use crate::pipeline::PostProcessor;
use crate::store::{NewInteraction, Store};

/// The bot: composition of pipeline, collaborators, and control state.
pub struct Bot {
    config: BotConfig,
    processor: PostProcessor,
    store: Arc<dyn Store>,
    source: Arc<dyn SourceClient>,
    monitor: Arc<Monitor>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        processor: PostProcessor,
        store: Arc<dyn Store>,
        source: Arc<dyn SourceClient>,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            config,
            processor,
            store,
            source,
            monitor,
        }
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Run one check cycle over all configured sources.
    ///
    /// Per-source failures are contained to that source; a store failure
    /// degrades the bot to `Unhealthy` and ends the cycle.
    pub async fn run_cycle(&self) {
        if self.monitor.status().await != BotStatus::Running {
            debug!("Bot not running, skipping check cycle");
            return;
        }

        info!("Starting check cycle");
        self.monitor
            .log_activity(
                "check_cycle",
                serde_json::json!({ "sources": self.config.sources }),
            )
            .await;

        for (i, source) in self.config.sources.iter().enumerate() {
            // Checkpoint: pause/stop take effect between sources.
            if self.monitor.status().await != BotStatus::Running {
                info!("Bot paused or stopped, ending cycle early");
                break;
            }

            if i > 0 {
                tokio::time::sleep(self.config.source_delay).await;
            }

            if let Err(e) = self.check_source(source).await {
                // Only store failures escape check_source; everything
                // external is contained inside it.
                error!(source, error = %e, "Durable storage unreachable, degrading");
                self.monitor
                    .log_error(format!("store unreachable: {e}"))
                    .await;
                self.monitor.set_status(BotStatus::Unhealthy).await;
                return;
            }
        }

        info!("Check cycle completed");
    }

    /// Check a single source for new posts and process them in order.
    async fn check_source(&self, source: &str) -> Result<(), StoreError> {
        info!(source, "Checking source for new posts");

        let posts = match self
            .source
            .fetch_new_posts(source, self.config.fetch_limit)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                // Contained: a failing source never aborts the cycle.
                warn!(source, error = %e, "Failed to fetch posts");
                self.monitor.increment(Stat::Errors).await;
                self.monitor
                    .log_error(format!("fetch failed for {source}: {e}"))
                    .await;
                if let Err(ledger_err) = self
                    .store
                    .log_interaction(NewInteraction::error(
                        &format!("fetch failed: {e}"),
                        Some(serde_json::json!({ "source": source })),
                    ))
                    .await
                {
                    error!(error = %ledger_err, "Ledger write failed");
                }
                return Ok(());
            }
        };

        if posts.is_empty() {
            info!(source, "No new posts");
            return Ok(());
        }

        for (i, post) in posts.iter().enumerate() {
            // Checkpoint: pause/stop take effect between posts, never mid-post.
            if self.monitor.status().await != BotStatus::Running {
                info!(source, "Bot paused or stopped, leaving source early");
                break;
            }

            if i > 0 {
                tokio::time::sleep(self.config.post_delay).await;
            }

            let outcome = self.processor.process_post(post).await?;
            debug!(post_id = %post.id, outcome = outcome.label(), "Post processed");
        }

        Ok(())
    }
}

/// Spawn the cycle ticker — fires a check cycle on a fixed interval.
/// The first tick is skipped; the caller decides whether to run an
/// initial cycle at startup.
pub fn spawn_cycle_ticker(bot: Arc<Bot>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            bot.run_cycle().await;
        }
    })
}

/// Spawn the daily retention sweep over ledger and dedup windows.
pub fn spawn_retention_task(
    store: Arc<dyn Store>,
    monitor: Arc<Monitor>,
    ledger_keep_days: i64,
    dedup_keep_days: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.prune(ledger_keep_days, dedup_keep_days).await {
                Ok(outcome) => {
                    debug!(
                        interactions = outcome.interactions_deleted,
                        posts = outcome.posts_deleted,
                        "Retention sweep ran"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Retention sweep failed");
                    monitor.log_error(format!("retention sweep failed: {e}")).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::{GenError, SourceError};
    use crate::gate::ReplyGate;
    use crate::keywords::{KeywordMatcher, KeywordRule, MatchMode, MatchScope};
    use crate::llm::{ProviderKind, ResponseGenerator, TextProvider};
    use crate::pipeline::types::RawPost;
    use crate::pipeline::ProcessorConfig;
    use crate::store::LibSqlStore;

    /// Source with scripted per-channel listings; "broken" always fails.
    struct ScriptedSource {
        fetch_calls: AtomicUsize,
        reply_calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceClient for ScriptedSource {
        async fn fetch_new_posts(
            &self,
            source: &str,
            _limit: usize,
        ) -> Result<Vec<RawPost>, SourceError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if source == "broken" {
                return Err(SourceError::Http("scripted outage".into()));
            }
            Ok(vec![RawPost {
                id: format!("{source}-1"),
                title: "Trip to India".into(),
                body: String::new(),
                author: "alice".into(),
                source: source.into(),
                created_at: Utc::now(),
                score: 5,
                num_comments: 0,
                is_self: true,
            }])
        }

        async fn post_reply(&self, _post_id: &str, _text: &str) -> Result<bool, SourceError> {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct OkProvider;

    #[async_trait]
    impl TextProvider for OkProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenError> {
            Ok("reply".into())
        }
    }

    async fn bot(sources: Vec<&str>) -> (Arc<Bot>, Arc<ScriptedSource>) {
        let store: Arc<dyn Store> = Arc::new(LibSqlStore::open_memory().await.unwrap());
        let source = Arc::new(ScriptedSource {
            fetch_calls: AtomicUsize::new(0),
            reply_calls: AtomicUsize::new(0),
        });
        let monitor = Arc::new(Monitor::new(vec![], vec![]));
        let gate = Arc::new(ReplyGate::new(10, Duration::from_secs(0)));

        let mut matcher = KeywordMatcher::new();
        matcher.add_rule(KeywordRule {
            keywords: vec!["india".into()],
            mode: MatchMode::WordBoundary,
            scope: MatchScope::Both,
            priority: 3,
            template: None,
        });

        let provider: Arc<dyn TextProvider> = Arc::new(OkProvider);
        let generator = Arc::new(ResponseGenerator::new(vec![provider], 500).unwrap());

        let mut config = BotConfig::default();
        config.sources = sources.iter().map(|s| s.to_string()).collect();
        config.post_delay = Duration::ZERO;
        config.source_delay = Duration::ZERO;

        let processor = PostProcessor::new(
            store.clone(),
            matcher,
            gate,
            generator,
            source.clone(),
            monitor.clone(),
            ProcessorConfig::default(),
        );

        (
            Arc::new(Bot::new(config, processor, store, source.clone(), monitor)),
            source,
        )
    }

    #[tokio::test]
    async fn cycle_skipped_unless_running() {
        let (bot, source) = bot(vec!["india"]).await;
        bot.run_cycle().await;
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);

        bot.monitor().set_status(BotStatus::Running).await;
        bot.run_cycle().await;
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_source_does_not_abort_cycle() {
        let (bot, source) = bot(vec!["broken", "india"]).await;
        bot.monitor().set_status(BotStatus::Running).await;
        bot.run_cycle().await;

        // Both sources attempted; the healthy one still got a reply.
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bot.monitor().status().await, BotStatus::Running);

        // The outage landed in the error feed.
        let errors = bot.monitor().recent_errors(10).await;
        assert!(errors.iter().any(|e| e.message.contains("broken")));
    }

    #[tokio::test]
    async fn pause_checkpoint_stops_before_next_source() {
        let (bot, source) = bot(vec!["india", "travel"]).await;
        bot.monitor().set_status(BotStatus::Paused).await;
        bot.run_cycle().await;
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cycle_is_idempotent_across_runs() {
        let (bot, source) = bot(vec!["india"]).await;
        bot.monitor().set_status(BotStatus::Running).await;
        bot.run_cycle().await;
        bot.run_cycle().await;

        // Same post fetched twice, replied to exactly once.
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.reply_calls.load(Ordering::SeqCst), 1);
    }
}
