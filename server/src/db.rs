use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::{Message, UserId};

pub type DbPool = PgPool;

/// Default page size for conversation retrieval.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on a single conversation page, to prevent unbounded scans.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/freelancer_chat".to_string()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Initialize database connection pool with configuration
pub async fn init_db(config: DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool initialized"
    );

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

/// Initialize database with default configuration
pub async fn init_db_default() -> Result<DbPool> {
    init_db(DbConfig::default()).await
}

// =============================================================================
// Message Store
// =============================================================================

/// Persist one dispatched message. `created_at` and `is_read` take their
/// database defaults. Fails with an integrity violation when either user id
/// is unknown; the dispatcher decides what to do with that.
pub async fn create_message(
    pool: &DbPool,
    from_user_id: UserId,
    to_user_id: UserId,
    text: &str,
) -> Result<Message> {
    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (from_user_id, to_user_id, text)
        VALUES ($1, $2, $3)
        RETURNING id, from_user_id, to_user_id, text, is_read, created_at
        "#,
    )
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(text)
    .fetch_one(pool)
    .await
    .context("Failed to persist message")?;

    Ok(message)
}

/// Mark every unread message from `partner_id` to `reader_id` as read.
/// Returns the number of rows flipped.
pub async fn mark_conversation_read(
    pool: &DbPool,
    reader_id: UserId,
    partner_id: UserId,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET is_read = TRUE
        WHERE from_user_id = $1 AND to_user_id = $2 AND is_read = FALSE
        "#,
    )
    .bind(partner_id)
    .bind(reader_id)
    .execute(pool)
    .await
    .context("Failed to mark conversation read")?;

    Ok(result.rows_affected())
}

/// One page of the two-party conversation between `user_id` and
/// `partner_id`. Fetched newest-first with offset pagination, then reversed
/// so the returned page reads chronologically (oldest of the page first).
/// `page` starts at 1.
pub async fn get_conversation_page(
    pool: &DbPool,
    user_id: UserId,
    partner_id: UserId,
    page: i64,
    limit: i64,
) -> Result<Vec<Message>> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    // page is caller-controlled; saturate instead of overflowing
    let offset = page.saturating_sub(1).saturating_mul(limit);

    let mut messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, from_user_id, to_user_id, text, is_read, created_at
        FROM messages
        WHERE (from_user_id = $1 AND to_user_id = $2)
           OR (from_user_id = $2 AND to_user_id = $1)
        ORDER BY created_at DESC, id DESC
        OFFSET $3
        LIMIT $4
        "#,
    )
    .bind(user_id)
    .bind(partner_id)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch conversation page")?;

    messages.reverse();
    Ok(messages)
}

/// Inbox view: for each distinct partner `user_id` ever exchanged a message
/// with, the single latest message of that pair, newest conversation first.
/// `DISTINCT ON` over the normalized user pair gives the per-partner argmax
/// by `created_at`.
pub async fn get_inbox(pool: &DbPool, user_id: UserId) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, from_user_id, to_user_id, text, is_read, created_at
        FROM (
            SELECT DISTINCT ON (
                LEAST(from_user_id, to_user_id),
                GREATEST(from_user_id, to_user_id)
            ) id, from_user_id, to_user_id, text, is_read, created_at
            FROM messages
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY
                LEAST(from_user_id, to_user_id),
                GREATEST(from_user_id, to_user_id),
                created_at DESC, id DESC
        ) latest
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch inbox")?;

    Ok(messages)
}

/// True when the error chain bottoms out in a SQL integrity-constraint
/// violation (class 23), e.g. a message referencing an unknown user.
pub fn is_integrity_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err
            .code()
            .map(|code| code.starts_with("23"))
            .unwrap_or(false),
        _ => false,
    }
}
