//! Database row types. These map directly to SQLite rows.
//! Distinct from truefeedback-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_verified: bool,
    pub verify_code: String,
    pub verify_code_expiry: DateTime<Utc>,
    pub is_accepting_message: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
