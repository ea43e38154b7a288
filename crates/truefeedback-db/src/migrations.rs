use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users and messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                    TEXT PRIMARY KEY,
                username              TEXT NOT NULL,
                email                 TEXT NOT NULL UNIQUE,
                password              TEXT NOT NULL,
                is_verified           INTEGER NOT NULL DEFAULT 0,
                verify_code           TEXT NOT NULL,
                verify_code_expiry    TEXT NOT NULL,
                is_accepting_message  INTEGER NOT NULL DEFAULT 1,
                created_at            TEXT NOT NULL
            );

            -- A name is only claimed once its owner has verified; pending
            -- registrations may share it.
            CREATE UNIQUE INDEX idx_users_verified_username
                ON users(username) WHERE is_verified = 1;

            CREATE INDEX idx_users_username ON users(username);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_user
                ON messages(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
