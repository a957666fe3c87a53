use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info};

use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    models::Message,
};

/// Inbox view: the latest message per conversation partner, newest
/// conversation first.
/// GET /chat/inbox
#[tracing::instrument(skip(pool))]
pub async fn get_inbox(
    State(pool): State<DbPool>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let messages = db::get_inbox(&pool, auth_user.user_id).await.map_err(|e| {
        error!("Failed to fetch inbox: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!(count = messages.len(), "Fetched inbox");

    Ok(Json(messages))
}
