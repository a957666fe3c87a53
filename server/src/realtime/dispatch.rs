//! Fan-out of one inbound chat payload: best-effort live push to the
//! recipient's connection, unconditional persistence to the message store.
//!
//! Failures here never reach the sender. Malformed payloads and integrity
//! failures (unknown recipient) are dropped with a tagged outcome; only the
//! connection's own read loop can end the session.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{self, DbPool};
use crate::models::{ChatEvent, UserId};
use crate::realtime::ConnectionRegistry;

/// Inbound payload as read off the wire. `to_user_id` is accepted as either
/// a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    text: Option<String>,
    to_user_id: Option<Value>,
}

/// Why an inbound event was dropped without a trace to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `text` missing or empty.
    MissingText,
    /// `to_user_id` missing.
    MissingRecipient,
    /// `to_user_id` present but not coercible to a user id.
    InvalidRecipient,
    /// The store rejected the write (unknown user, constraint violation).
    PersistFailed,
}

/// Outcome of handling one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Message persisted; `live` is whether a push went to an open connection.
    Delivered { live: bool },
    /// Event discarded, nothing persisted, nothing surfaced to the sender.
    Dropped(DropReason),
}

/// Handle one inbound payload from `from_user_id`. At most one live push
/// and at most one durable write per call.
pub async fn dispatch(
    pool: &DbPool,
    registry: &ConnectionRegistry,
    from_user_id: UserId,
    payload: Value,
) -> DispatchOutcome {
    let inbound: InboundMessage = match serde_json::from_value(payload) {
        Ok(inbound) => inbound,
        Err(e) => {
            debug!(from_user_id, error = %e, "Dropping unparseable chat payload");
            return DispatchOutcome::Dropped(DropReason::MissingText);
        }
    };

    let text = match inbound.text.filter(|t| !t.is_empty()) {
        Some(text) => text,
        None => {
            debug!(from_user_id, "Dropping chat payload without text");
            return DispatchOutcome::Dropped(DropReason::MissingText);
        }
    };

    let to_user_id = match inbound.to_user_id {
        None => {
            debug!(from_user_id, "Dropping chat payload without recipient");
            return DispatchOutcome::Dropped(DropReason::MissingRecipient);
        }
        Some(value) => match coerce_user_id(&value) {
            Some(id) => id,
            None => {
                debug!(from_user_id, "Dropping chat payload with bad recipient id");
                return DispatchOutcome::Dropped(DropReason::InvalidRecipient);
            }
        },
    };

    // Best-effort live push. try_send keeps a slow or full recipient queue
    // from stalling this sender's read loop.
    let live = match registry.lookup(to_user_id) {
        Some(tx) => {
            let event = ChatEvent {
                text: text.clone(),
                to_user_id,
                from_user_id,
            };
            match tx.try_send(event) {
                Ok(()) => {
                    crate::metrics::record_live_push();
                    true
                }
                Err(e) => {
                    debug!(to_user_id, error = %e, "Live push skipped");
                    false
                }
            }
        }
        None => false,
    };

    // Persist regardless of live-delivery outcome. Integrity failures are
    // swallowed; the live push (if any) is not reconciled.
    match db::create_message(pool, from_user_id, to_user_id, &text).await {
        Ok(message) => {
            crate::metrics::record_message_persisted();
            debug!(
                message_id = message.id,
                from_user_id, to_user_id, live, "Message dispatched"
            );
            DispatchOutcome::Delivered { live }
        }
        Err(e) => {
            if db::is_integrity_violation(&e) {
                debug!(from_user_id, to_user_id, "Dropping message for unknown recipient");
            } else {
                warn!(from_user_id, to_user_id, error = %e, "Failed to persist message");
            }
            crate::metrics::record_event_dropped();
            DispatchOutcome::Dropped(DropReason::PersistFailed)
        }
    }
}

/// Coerce a JSON value to a user id. Accepts integers and integer strings.
fn coerce_user_id(value: &Value) -> Option<UserId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
