use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use replybot::config::BotConfig;
use replybot::error::ConfigError;
use replybot::gate::ReplyGate;
use replybot::keywords::KeywordMatcher;
use replybot::llm::{self, ProviderKind, ResponseGenerator};
use replybot::monitor::{BotStatus, Monitor};
use replybot::pipeline::{PostProcessor, ProcessorConfig};
use replybot::reddit::{RedditClient, RedditCredentials};
use replybot::runner::{self, Bot};
use replybot::server;
use replybot::store::{LibSqlStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing: console plus a daily-rolling file log.
    let file_appender = tracing_appender::rolling::daily("logs", "replybot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let config = BotConfig::from_env().context("invalid configuration")?;

    eprintln!("replybot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sources: {}", config.sources.join(", "));
    eprintln!(
        "   Cycle: every {}min, max {}/hour, {}s cooldown",
        config.check_interval.as_secs() / 60,
        config.max_replies_per_hour,
        config.min_reply_interval.as_secs(),
    );

    // ── Generation providers ────────────────────────────────────────
    let providers = llm::providers_from_env(ProviderKind::Gemini);
    let generator = Arc::new(
        ResponseGenerator::new(providers, config.max_tokens)
            .context("no generation provider configured")?,
    );
    let provider_names = generator.provider_names();
    eprintln!("   Providers: {}", provider_names.join(", "));

    // ── Source client ───────────────────────────────────────────────
    let credentials = RedditCredentials::from_env().ok_or_else(|| {
        ConfigError::MissingEnvVar(
            "REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET / REDDIT_USERNAME / REDDIT_PASSWORD".into(),
        )
    })?;
    let source = Arc::new(RedditClient::new(credentials)?);

    // ── Durable state ───────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::open(std::path::Path::new(&config.db_path))
            .await
            .context("failed to open database")?,
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Shared state ────────────────────────────────────────────────
    let gate = Arc::new(ReplyGate::new(
        config.max_replies_per_hour,
        config.min_reply_interval,
    ));
    let monitor = Arc::new(Monitor::new(config.sources.clone(), provider_names));

    // ── Pipeline ────────────────────────────────────────────────────
    let processor = PostProcessor::new(
        store.clone(),
        KeywordMatcher::with_default_rules(),
        gate.clone(),
        generator,
        source.clone(),
        monitor.clone(),
        ProcessorConfig {
            min_priority: config.min_priority,
            min_score: config.min_score,
            max_post_age: config.max_post_age,
        },
    );
    let bot = Arc::new(Bot::new(
        config.clone(),
        processor,
        store.clone(),
        source,
        monitor.clone(),
    ));

    // ── Status/control API ──────────────────────────────────────────
    let router = server::api_routes(monitor.clone(), store.clone(), gate);
    let http_port = config.http_port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(router, http_port).await {
            tracing::error!(error = %e, "Status API exited");
        }
    });
    eprintln!("   Status API: http://0.0.0.0:{}/api/status\n", http_port);

    // ── Background tasks ────────────────────────────────────────────
    let _retention = runner::spawn_retention_task(
        store,
        monitor.clone(),
        config.ledger_retention_days,
        config.dedup_retention_days,
    );
    let _ticker = runner::spawn_cycle_ticker(bot.clone(), config.check_interval);

    // Start and run the initial cycle immediately.
    monitor.set_status(BotStatus::Running).await;
    bot.run_cycle().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    monitor.set_status(BotStatus::Stopped).await;

    Ok(())
}
