use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY,
            content TEXT NOT NULL CHECK (length(trim(content)) > 0),
            category TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS entries_created_at
            ON entries (created_at DESC, id DESC);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
