//! Database models shared by the dispatcher and the query handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user identifier, as minted by the marketplace API.
pub type UserId = i64;

/// Database representation of a point-to-point chat message.
/// Maps to the `messages` table. Rows are immutable after creation except
/// for the `is_read` flag, which flips to true when the recipient opens
/// the conversation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Event pushed over a recipient's live connection. Field names are part of
/// the client wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub text: String,
    pub to_user_id: UserId,
    pub from_user_id: UserId,
}
