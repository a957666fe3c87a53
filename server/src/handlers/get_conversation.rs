use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    auth::AuthUser,
    db::{self, DbPool, DEFAULT_PAGE_SIZE},
    models::{Message, UserId},
};

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    /// Conversation partner
    pub user_id: UserId,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Get one page of the conversation with a partner, oldest of the page
/// first. Opening the thread marks everything the partner sent as read.
/// GET /chat
#[tracing::instrument(skip(pool))]
pub async fn get_conversation(
    State(pool): State<DbPool>,
    auth_user: AuthUser,
    Query(params): Query<ConversationParams>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let reader = auth_user.user_id;
    let partner = params.user_id;
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    let marked = db::mark_conversation_read(&pool, reader, partner)
        .await
        .map_err(|e| {
            error!("Failed to mark conversation read: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let messages = db::get_conversation_page(&pool, reader, partner, page, limit)
        .await
        .map_err(|e| {
            error!("Failed to fetch conversation page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!(
        partner,
        page,
        marked_read = marked,
        count = messages.len(),
        "Fetched conversation page"
    );

    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConfig;
    use std::time::Duration;

    async fn setup_pool() -> Option<DbPool> {
        let Ok(db_url) = std::env::var("TEST_DATABASE_URL") else {
            return None;
        };
        let pool = crate::db::init_db(DbConfig {
            database_url: db_url,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        })
        .await
        .expect("test setup");
        Some(pool)
    }

    async fn create_user(pool: &DbPool, email: &str) -> UserId {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email) VALUES ($1) ON CONFLICT (email) DO UPDATE SET email = $1 RETURNING id",
        )
        .bind(email)
        .fetch_one(pool)
        .await
        .expect("test setup")
    }

    async fn clear_messages(pool: &DbPool, users: &[UserId]) {
        sqlx::query("DELETE FROM messages WHERE from_user_id = ANY($1) OR to_user_id = ANY($1)")
            .bind(users)
            .execute(pool)
            .await
            .expect("test cleanup");
    }

    async fn insert_message(pool: &DbPool, from: UserId, to: UserId, text: &str) {
        sqlx::query("INSERT INTO messages (from_user_id, to_user_id, text) VALUES ($1, $2, $3)")
            .bind(from)
            .bind(to)
            .bind(text)
            .execute(pool)
            .await
            .expect("test setup");
    }

    #[tokio::test]
    async fn test_get_conversation_marks_read_and_orders() {
        let Some(pool) = setup_pool().await else {
            return;
        };
        let alice = create_user(&pool, "conv-alice@example.com").await;
        let bob = create_user(&pool, "conv-bob@example.com").await;
        clear_messages(&pool, &[alice, bob]).await;

        insert_message(&pool, alice, bob, "hello bob").await;
        insert_message(&pool, bob, alice, "hello alice").await;
        insert_message(&pool, alice, bob, "how are you").await;

        let result = get_conversation(
            State(pool.clone()),
            AuthUser { user_id: alice },
            Query(ConversationParams {
                user_id: bob,
                page: None,
                limit: None,
            }),
        )
        .await;

        let messages = result.expect("handler should return Ok").0;
        assert_eq!(messages.len(), 3);
        for window in messages.windows(2) {
            assert!(window[0].created_at <= window[1].created_at);
            assert!(window[0].id < window[1].id);
        }

        // Bob's message to Alice is now read; Alice's own are untouched.
        let unread_from_bob: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE from_user_id = $1 AND to_user_id = $2 AND is_read = FALSE",
        )
        .bind(bob)
        .bind(alice)
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(unread_from_bob, 0);
    }

    #[tokio::test]
    async fn test_get_conversation_second_page_returns_oldest_remainder() {
        let Some(pool) = setup_pool().await else {
            return;
        };
        let alice = create_user(&pool, "page-alice@example.com").await;
        let bob = create_user(&pool, "page-bob@example.com").await;
        clear_messages(&pool, &[alice, bob]).await;

        for i in 0..15 {
            insert_message(&pool, alice, bob, &format!("msg-{}", i)).await;
        }

        let result = get_conversation(
            State(pool.clone()),
            AuthUser { user_id: alice },
            Query(ConversationParams {
                user_id: bob,
                page: Some(2),
                limit: Some(10),
            }),
        )
        .await;

        // Page 2 of 15 messages at limit 10 is the oldest 5.
        let messages = result.expect("handler should return Ok").0;
        assert_eq!(messages.len(), 5);
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
    }
}
