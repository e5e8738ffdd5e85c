//! Configuration types.
//!
//! All knobs come from the environment; `BotConfig::from_env()` is the
//! single place they are read and validated. Bad values are a
//! `ConfigError`, never a silent fallback.

use std::time::Duration;

use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Source channels to poll, in cycle order.
    pub sources: Vec<String>,
    /// Interval between check cycles.
    pub check_interval: Duration,
    /// Maximum replies dispatched per clock hour.
    pub max_replies_per_hour: u32,
    /// Minimum interval between any two dispatched replies.
    pub min_reply_interval: Duration,
    /// Minimum rule priority required to reply.
    pub min_priority: i32,
    /// Posts fetched per source per cycle.
    pub fetch_limit: usize,
    /// Pause between posts within a source.
    pub post_delay: Duration,
    /// Pause between sources within a cycle.
    pub source_delay: Duration,
    /// Posts with a score below this are never replied to.
    pub min_score: i64,
    /// Posts older than this are never replied to.
    pub max_post_age: chrono::Duration,
    /// Max tokens requested from generation providers.
    pub max_tokens: u32,
    /// Ledger entries older than this are pruned.
    pub ledger_retention_days: i64,
    /// Dedup records older than this are pruned. Must exceed the ledger
    /// window — replay protection outlives interaction history.
    pub dedup_retention_days: i64,
    /// Database file path.
    pub db_path: String,
    /// Status/control API port.
    pub http_port: u16,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            sources: vec!["india".to_string(), "AskReddit".to_string()],
            check_interval: Duration::from_secs(60 * 60),
            max_replies_per_hour: 3,
            min_reply_interval: Duration::from_secs(600),
            min_priority: 2,
            fetch_limit: 25,
            post_delay: Duration::from_secs(1),
            source_delay: Duration::from_secs(5),
            min_score: -5,
            max_post_age: chrono::Duration::hours(24),
            max_tokens: 500,
            ledger_retention_days: 30,
            dedup_retention_days: 90,
            db_path: "./data/replybot.db".to_string(),
            http_port: 5000,
        }
    }
}

impl BotConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("REPLYBOT_SOURCES") {
            let sources: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if sources.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "REPLYBOT_SOURCES".into(),
                    message: "no sources listed".into(),
                });
            }
            config.sources = sources;
        }

        if let Some(minutes) = parse_env::<u64>("REPLYBOT_CHECK_INTERVAL_MINUTES")? {
            if minutes == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "REPLYBOT_CHECK_INTERVAL_MINUTES".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.check_interval = Duration::from_secs(minutes * 60);
        }
        if let Some(n) = parse_env::<u32>("REPLYBOT_MAX_REPLIES_PER_HOUR")? {
            config.max_replies_per_hour = n;
        }
        if let Some(secs) = parse_env::<u64>("REPLYBOT_MIN_REPLY_INTERVAL_SECS")? {
            config.min_reply_interval = Duration::from_secs(secs);
        }
        if let Some(p) = parse_env::<i32>("REPLYBOT_MIN_PRIORITY")? {
            config.min_priority = p;
        }
        if let Some(n) = parse_env::<usize>("REPLYBOT_FETCH_LIMIT")? {
            config.fetch_limit = n.clamp(1, 100);
        }
        if let Some(secs) = parse_env::<u64>("REPLYBOT_POST_DELAY_SECS")? {
            config.post_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("REPLYBOT_SOURCE_DELAY_SECS")? {
            config.source_delay = Duration::from_secs(secs);
        }
        if let Some(s) = parse_env::<i64>("REPLYBOT_MIN_SCORE")? {
            config.min_score = s;
        }
        if let Some(hours) = parse_env::<i64>("REPLYBOT_MAX_POST_AGE_HOURS")? {
            config.max_post_age = chrono::Duration::hours(hours);
        }
        if let Some(n) = parse_env::<u32>("REPLYBOT_MAX_TOKENS")? {
            config.max_tokens = n;
        }
        if let Some(days) = parse_env::<i64>("REPLYBOT_LEDGER_RETENTION_DAYS")? {
            config.ledger_retention_days = days;
        }
        if let Some(days) = parse_env::<i64>("REPLYBOT_DEDUP_RETENTION_DAYS")? {
            config.dedup_retention_days = days;
        }
        if config.dedup_retention_days < config.ledger_retention_days {
            return Err(ConfigError::InvalidValue {
                key: "REPLYBOT_DEDUP_RETENTION_DAYS".into(),
                message: format!(
                    "must be >= ledger retention ({} days)",
                    config.ledger_retention_days
                ),
            });
        }
        if let Ok(path) = std::env::var("REPLYBOT_DB_PATH") {
            config.db_path = path;
        }
        if let Some(port) = parse_env::<u16>("REPLYBOT_HTTP_PORT")? {
            config.http_port = port;
        }

        Ok(config)
    }
}

/// Parse an optional environment variable, treating malformed values as
/// configuration errors rather than falling back to the default.
fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BotConfig::default();
        assert_eq!(config.max_replies_per_hour, 3);
        assert_eq!(config.min_reply_interval, Duration::from_secs(600));
        assert_eq!(config.min_priority, 2);
        assert!(config.dedup_retention_days > config.ledger_retention_days);
    }

    #[test]
    fn parse_env_rejects_garbage() {
        // SAFETY: test-local env mutation; no other test reads this key.
        unsafe { std::env::set_var("REPLYBOT_TEST_GARBAGE", "not-a-number") };
        let result = parse_env::<u32>("REPLYBOT_TEST_GARBAGE");
        assert!(result.is_err());
        unsafe { std::env::remove_var("REPLYBOT_TEST_GARBAGE") };
    }

    #[test]
    fn parse_env_absent_is_none() {
        let result = parse_env::<u32>("REPLYBOT_TEST_DEFINITELY_UNSET").unwrap();
        assert!(result.is_none());
    }
}
