//! libSQL store backend — async `Store` implementation over a local
//! database file (or `:memory:` in tests).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::{
    DailyStatsRow, InteractionKind, InteractionRecord, NewInteraction, PostRecord, PruneOutcome,
    Store, TotalStats,
};

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Bump the daily counter matching an interaction kind.
    ///
    /// The daily row is created lazily on the first event of a day; the
    /// counter column is selected by an explicit match over the closed
    /// kind set.
    async fn bump_daily_stat(&self, kind: InteractionKind) -> Result<(), StoreError> {
        let today = Utc::now().date_naive().to_string();

        self.conn
            .execute(
                "INSERT OR IGNORE INTO daily_stats (date) VALUES (?1)",
                params![today.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to seed daily stats row: {e}")))?;

        let update_sql = match kind {
            InteractionKind::Checked => {
                "UPDATE daily_stats SET posts_checked = posts_checked + 1 WHERE date = ?1"
            }
            InteractionKind::Matched => {
                "UPDATE daily_stats SET keywords_matched = keywords_matched + 1 WHERE date = ?1"
            }
            InteractionKind::Generated => {
                "UPDATE daily_stats SET responses_generated = responses_generated + 1 WHERE date = ?1"
            }
            InteractionKind::Posted => {
                "UPDATE daily_stats SET successful_replies = successful_replies + 1 WHERE date = ?1"
            }
            InteractionKind::Failed => {
                "UPDATE daily_stats SET failed_replies = failed_replies + 1 WHERE date = ?1"
            }
            InteractionKind::Error => {
                "UPDATE daily_stats SET errors = errors + 1 WHERE date = ?1"
            }
        };

        self.conn
            .execute(update_sql, params![today.as_str()])
            .await
            .map_err(|e| StoreError::Query(format!("Failed to update daily stats: {e}")))?;
        Ok(())
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_post(row: &libsql::Row) -> Result<PostRecord, libsql::Error> {
    let replied: i64 = row.get(7)?;
    Ok(PostRecord {
        post_id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        author: row.get::<String>(3).unwrap_or_default(),
        created_at: parse_datetime(&row.get::<String>(4)?),
        first_seen: parse_datetime(&row.get::<String>(5)?),
        last_checked: parse_datetime(&row.get::<String>(6)?),
        replied: replied != 0,
        reply_attempts: row.get(8)?,
    })
}

fn row_to_interaction(row: &libsql::Row) -> Result<InteractionRecord, libsql::Error> {
    let kind_str: String = row.get(2)?;
    let keywords_json: Option<String> = row.get::<String>(6).ok();
    let metadata_json: Option<String> = row.get::<String>(11).ok();

    Ok(InteractionRecord {
        id: row.get(0)?,
        created_at: parse_datetime(&row.get::<String>(1)?),
        kind: InteractionKind::parse(&kind_str).unwrap_or(InteractionKind::Error),
        post_id: row.get::<String>(3).ok(),
        source: row.get::<String>(4).ok(),
        post_title: row.get::<String>(5).ok(),
        matched_keywords: keywords_json.and_then(|j| serde_json::from_str(&j).ok()),
        provider: row.get::<String>(7).ok(),
        response_text: row.get::<String>(8).ok(),
        success: row.get::<i64>(9).ok().map(|v| v != 0),
        error_message: row.get::<String>(10).ok(),
        metadata: metadata_json.and_then(|j| serde_json::from_str(&j).ok()),
    })
}

fn row_to_daily(row: &libsql::Row) -> Result<DailyStatsRow, libsql::Error> {
    let date_str: String = row.get(0)?;
    Ok(DailyStatsRow {
        date: date_str
            .parse()
            .unwrap_or_else(|_| chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        posts_checked: row.get(1)?,
        keywords_matched: row.get(2)?,
        responses_generated: row.get(3)?,
        successful_replies: row.get(4)?,
        failed_replies: row.get(5)?,
        errors: row.get(6)?,
    })
}

const INTERACTION_COLUMNS: &str = "id, created_at, kind, post_id, source, post_title, \
     matched_keywords, provider, response_text, success, error_message, metadata";

#[async_trait]
impl Store for LibSqlStore {
    async fn is_processed(&self, post_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM processed_posts WHERE post_id = ?1",
                params![post_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to check processed post: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read processed row: {e}")))?;
        Ok(row.is_some())
    }

    async fn has_replied(&self, post_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM processed_posts WHERE post_id = ?1 AND replied = 1",
                params![post_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to check replied post: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read replied row: {e}")))?;
        Ok(row.is_some())
    }

    async fn mark_processed(
        &self,
        post_id: &str,
        source: &str,
        title: &str,
        author: &str,
        created_at: DateTime<Utc>,
        replied: bool,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let replied_int: i64 = if replied { 1 } else { 0 };

        // Upsert: the replied flag only ever ORs upward, and reply
        // attempts count only actual replied=true passes.
        self.conn
            .execute(
                "INSERT INTO processed_posts \
                     (post_id, source, title, author, created_at, first_seen, last_checked, replied, reply_attempts) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?7) \
                 ON CONFLICT(post_id) DO UPDATE SET \
                     last_checked = excluded.last_checked, \
                     replied = MAX(processed_posts.replied, excluded.replied), \
                     reply_attempts = processed_posts.reply_attempts + ?7",
                params![
                    post_id,
                    source,
                    title,
                    author,
                    created_at.to_rfc3339(),
                    now,
                    replied_int
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to mark post processed: {e}")))?;

        debug!(post_id, replied, "Post marked processed");
        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<PostRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT post_id, source, title, author, created_at, first_seen, last_checked, \
                        replied, reply_attempts \
                 FROM processed_posts WHERE post_id = ?1",
                params![post_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch post record: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read post record: {e}")))?
        {
            Some(row) => Ok(Some(row_to_post(&row).map_err(|e| {
                StoreError::Serialization(format!("Bad post row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    async fn log_interaction(&self, entry: NewInteraction) -> Result<i64, StoreError> {
        let kind = entry.kind.unwrap_or(InteractionKind::Error);

        let keywords_json = entry
            .matched_keywords
            .as_ref()
            .map(|k| serde_json::to_string(k))
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("Bad keyword list: {e}")))?;
        let metadata_json = entry
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m))
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("Bad metadata: {e}")))?;
        let success_int = entry.success.map(|s| if s { 1i64 } else { 0i64 });

        self.conn
            .execute(
                "INSERT INTO interactions \
                     (created_at, kind, post_id, source, post_title, matched_keywords, \
                      provider, response_text, success, error_message, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    Utc::now().to_rfc3339(),
                    kind.as_str(),
                    entry.post_id,
                    entry.source,
                    entry.post_title,
                    keywords_json,
                    entry.provider,
                    entry.response_text,
                    success_int,
                    entry.error_message,
                    metadata_json
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to insert ledger entry: {e}")))?;

        let id = self.conn.last_insert_rowid();
        self.bump_daily_stat(kind).await?;
        Ok(id)
    }

    async fn recent_interactions(
        &self,
        limit: usize,
        kind: Option<InteractionKind>,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let limit = limit as i64;
        let mut rows = match kind {
            Some(kind) => self
                .conn
                .query(
                    &format!(
                        "SELECT {INTERACTION_COLUMNS} FROM interactions \
                         WHERE kind = ?1 ORDER BY id DESC LIMIT ?2"
                    ),
                    params![kind.as_str(), limit],
                )
                .await,
            None => self
                .conn
                .query(
                    &format!(
                        "SELECT {INTERACTION_COLUMNS} FROM interactions \
                         ORDER BY id DESC LIMIT ?1"
                    ),
                    params![limit],
                )
                .await,
        }
        .map_err(|e| StoreError::Query(format!("Failed to fetch interactions: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read interaction row: {e}")))?
        {
            entries.push(
                row_to_interaction(&row)
                    .map_err(|e| StoreError::Serialization(format!("Bad interaction row: {e}")))?,
            );
        }
        Ok(entries)
    }

    async fn daily_stats(&self, days: usize) -> Result<Vec<DailyStatsRow>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT date, posts_checked, keywords_matched, responses_generated, \
                        successful_replies, failed_replies, errors \
                 FROM daily_stats ORDER BY date DESC LIMIT ?1",
                params![days as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch daily stats: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read daily stats row: {e}")))?
        {
            out.push(
                row_to_daily(&row)
                    .map_err(|e| StoreError::Serialization(format!("Bad daily stats row: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn total_stats(&self) -> Result<TotalStats, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(SUM(posts_checked), 0), COALESCE(SUM(keywords_matched), 0), \
                        COALESCE(SUM(responses_generated), 0), COALESCE(SUM(successful_replies), 0), \
                        COALESCE(SUM(failed_replies), 0), COALESCE(SUM(errors), 0) \
                 FROM daily_stats",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch total stats: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read total stats: {e}")))?;

        match row {
            Some(row) => Ok(TotalStats {
                posts_checked: row.get(0).unwrap_or(0),
                keywords_matched: row.get(1).unwrap_or(0),
                responses_generated: row.get(2).unwrap_or(0),
                successful_replies: row.get(3).unwrap_or(0),
                failed_replies: row.get(4).unwrap_or(0),
                errors: row.get(5).unwrap_or(0),
            }),
            None => Ok(TotalStats::default()),
        }
    }

    async fn prune(
        &self,
        ledger_keep_days: i64,
        dedup_keep_days: i64,
    ) -> Result<PruneOutcome, StoreError> {
        // Proper calendar-duration subtraction; day-of-month arithmetic
        // misbehaves near month boundaries.
        let now = Utc::now();
        let ledger_cutoff = (now - chrono::Duration::days(ledger_keep_days)).to_rfc3339();
        let dedup_cutoff = (now - chrono::Duration::days(dedup_keep_days)).to_rfc3339();

        let interactions_deleted = self
            .conn
            .execute(
                "DELETE FROM interactions WHERE created_at < ?1",
                params![ledger_cutoff],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to prune ledger: {e}")))?;

        let posts_deleted = self
            .conn
            .execute(
                "DELETE FROM processed_posts WHERE first_seen < ?1",
                params![dedup_cutoff],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to prune dedup records: {e}")))?;

        if interactions_deleted > 0 || posts_deleted > 0 {
            info!(interactions_deleted, posts_deleted, "Retention sweep complete");
        }
        Ok(PruneOutcome {
            interactions_deleted,
            posts_deleted,
        })
    }
}
