use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password, is_verified, verify_code, \
                            verify_code_expiry, is_accepting_message, created_at";

/// Credentials and code for a registration attempt that has not been verified yet.
#[derive(Debug, Clone)]
pub struct NewPendingUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verify_code: String,
    pub verify_code_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A fresh unverified account was inserted.
    Created(String),
    /// An abandoned unverified registration for the same email was overwritten.
    Refreshed(String),
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug)]
pub enum IntakeOutcome {
    Delivered(MessageRow),
    UnknownRecipient,
    NotAccepting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    MessageMissing,
    UserMissing,
}

impl Database {
    // -- Users --

    /// Registration policy, applied in one transaction:
    /// a verified owner of the name blocks it, a verified owner of the email
    /// blocks it, an unverified owner of the email is overwritten, otherwise
    /// a new account is created.
    pub fn upsert_pending_user(
        &self,
        new: &NewPendingUser,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let username_taken = tx
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 AND is_verified = 1",
                    [&new.username],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if username_taken {
                return Ok(RegisterOutcome::UsernameTaken);
            }

            let existing: Option<(String, bool)> = tx
                .query_row(
                    "SELECT id, is_verified FROM users WHERE email = ?1",
                    [&new.email],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = match existing {
                Some((_, true)) => return Ok(RegisterOutcome::EmailTaken),
                Some((id, false)) => {
                    tx.execute(
                        "UPDATE users
                         SET username = ?2, password = ?3, verify_code = ?4, verify_code_expiry = ?5
                         WHERE id = ?1",
                        rusqlite::params![
                            id,
                            new.username,
                            new.password_hash,
                            new.verify_code,
                            new.verify_code_expiry
                        ],
                    )?;
                    RegisterOutcome::Refreshed(id)
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO users (id, username, email, password, is_verified, verify_code,
                                            verify_code_expiry, is_accepting_message, created_at)
                         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, 1, ?7)",
                        rusqlite::params![
                            id,
                            new.username,
                            new.email,
                            new.password_hash,
                            new.verify_code,
                            new.verify_code_expiry,
                            now
                        ],
                    )?;
                    RegisterOutcome::Created(id)
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Only verified accounts own a username publicly.
    pub fn get_verified_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1 AND is_verified = 1", username))
    }

    /// Records a verification attempt for `username` may match: the verified
    /// owner alone if one exists, else every pending registration using the
    /// name, newest code first.
    pub fn get_verification_candidates(&self, username: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE username = ?1
                   AND (is_verified = 1 OR NOT EXISTS (
                        SELECT 1 FROM users WHERE username = ?1 AND is_verified = 1))
                 ORDER BY is_verified DESC, verify_code_expiry DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([username], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The verified owner of `username`, else its most recently issued
    /// pending registration.
    pub fn get_user_for_verification(&self, username: &str) -> Result<Option<UserRow>> {
        Ok(self.get_verification_candidates(username)?.into_iter().next())
    }

    /// Sign-in lookup by email or username. Emails are stored lowercased,
    /// usernames are matched exactly.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE email = ?1 OR username = ?2
                 ORDER BY is_verified DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_row([identifier.to_lowercase().as_str(), identifier], user_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// One-way switch: there is no statement anywhere that clears the flag.
    pub fn mark_verified(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE users SET is_verified = 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn set_accepting(&self, id: &str, accepting: bool) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_accepting_message = ?2 WHERE id = ?1",
                rusqlite::params![id, accepting],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id = ?1", id)
        })
    }

    // -- Messages --

    /// Append a message to `username`'s inbox if, at this instant, the
    /// recipient exists, is verified and accepts messages.
    pub fn deliver_message(
        &self,
        username: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<IntakeOutcome> {
        self.with_conn(|conn| {
            let Some(user) = query_user(conn, "username = ?1 AND is_verified = 1", username)? else {
                return Ok(IntakeOutcome::UnknownRecipient);
            };
            if !user.is_accepting_message {
                return Ok(IntakeOutcome::NotAccepting);
            }

            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO messages (id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user.id, content, now],
            )?;

            Ok(IntakeOutcome::Delivered(MessageRow {
                id,
                user_id: user.id,
                content: content.to_string(),
                created_at: now,
            }))
        })
    }

    /// Newest first; messages stamped with the same instant come back in
    /// reverse insertion order.
    pub fn get_messages(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, created_at
                 FROM messages
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Delete one message from the caller's own inbox. The `user_id` filter
    /// is what keeps one user from removing another user's messages.
    pub fn delete_message(&self, user_id: &str, message_id: &str) -> Result<DeleteOutcome> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                [message_id, user_id],
            )?;
            if removed > 0 {
                return Ok(DeleteOutcome::Deleted);
            }

            let user_exists = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |_| Ok(()))
                .optional()?
                .is_some();

            Ok(if user_exists {
                DeleteOutcome::MessageMissing
            } else {
                DeleteOutcome::UserMissing
            })
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        is_verified: row.get(4)?,
        verify_code: row.get(5)?,
        verify_code_expiry: row.get(6)?,
        is_accepting_message: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// `filter` is a fixed clause from this module with a single `?1` parameter.
fn query_user(conn: &Connection, filter: &str, param: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([param], user_from_row).optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
