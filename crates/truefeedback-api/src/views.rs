//! Row → wire conversions.

use tracing::warn;
use uuid::Uuid;

use truefeedback_db::models::{MessageRow, UserRow};
use truefeedback_types::models::{Message, User};

fn parse_id(kind: &str, raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", kind, raw, e);
        Uuid::default()
    })
}

pub fn user_view(row: UserRow) -> User {
    User {
        id: parse_id("user", &row.id),
        username: row.username,
        email: row.email,
        is_verified: row.is_verified,
        is_accepting_message: row.is_accepting_message,
        created_at: row.created_at,
    }
}

pub fn message_view(row: MessageRow) -> Message {
    Message {
        id: parse_id("message", &row.id),
        content: row.content,
        created_at: row.created_at,
    }
}
