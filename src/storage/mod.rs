use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::error::{FeedError, Result};
use crate::model::{Entry, EntryId, NewEntry};

#[cfg(test)]
pub(crate) mod memory;
mod schema;

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Remote collection of dated entries. Every call may fail on its own; none is
/// atomic with any local cache mutation.
pub trait RemoteStore: Send + Sync {
    /// Entries with `created_at` inside `range`, newest first.
    fn query(&self, range: &TimeRange) -> Result<Vec<Entry>>;

    fn insert(&self, entry: &NewEntry) -> Result<Entry>;

    fn update_content(&self, id: EntryId, content: &str) -> Result<()>;

    fn update_category(&self, id: EntryId, category: &str) -> Result<()>;
}

pub struct SqliteStore {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path, options: &StorageOptions) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn).map_err(FeedError::Network)
    }

    /// Inserts with an explicit creation time; used for imports and fixtures.
    pub fn insert_at(&self, entry: &NewEntry, created_at: OffsetDateTime) -> Result<Entry> {
        let content = entry.content.trim();
        if content.is_empty() {
            return Err(FeedError::validation("entry content cannot be empty"));
        }
        let category = entry.category.trim();
        if category.is_empty() {
            return Err(FeedError::validation("entry category cannot be empty"));
        }
        let created_at = created_at.replace_nanosecond(0).unwrap_or(created_at);
        let id = self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entries (content, category, created_at) VALUES (?1, ?2, ?3)",
                params![content, category, created_at.unix_timestamp()],
            )
            .context("inserting entry")?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Entry {
            id,
            content: content.to_string(),
            category: category.to_string(),
            created_at,
        })
    }

    fn update_column(&self, id: EntryId, column: &'static str, value: &str) -> Result<()> {
        let updated = self.with_connection(|conn| {
            let sql = format!("UPDATE entries SET {column} = ?1 WHERE id = ?2");
            conn.execute(&sql, params![value, id])
                .with_context(|| format!("updating entry {column}"))
        })?;
        if updated == 0 {
            return Err(FeedError::NotFound(id));
        }
        Ok(())
    }
}

impl RemoteStore for SqliteStore {
    fn query(&self, range: &TimeRange) -> Result<Vec<Entry>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, category, created_at
                 FROM entries
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at DESC, id DESC",
            )?;
            let entries = stmt
                .query_map(
                    params![range.start.unix_timestamp(), range.end.unix_timestamp()],
                    entry_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("querying entries in range")?;
            Ok(entries)
        })
    }

    fn insert(&self, entry: &NewEntry) -> Result<Entry> {
        self.insert_at(entry, OffsetDateTime::now_utc())
    }

    fn update_content(&self, id: EntryId, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(FeedError::validation("entry content cannot be empty"));
        }
        self.update_column(id, "content", content)
    }

    fn update_category(&self, id: EntryId, category: &str) -> Result<()> {
        self.update_column(id, "category", category.trim())
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let created_at: i64 = row.get(3)?;
    let created_at = OffsetDateTime::from_unix_timestamp(created_at).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(err))
    })?;
    Ok(Entry {
        id: row.get(0)?,
        content: row.get(1)?,
        category: row.get(2)?,
        created_at,
    })
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> anyhow::Result<SqliteStore> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    let parent = db_path
        .parent()
        .ok_or_else(|| anyhow!("database path {} has no parent", db_path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating data directory {}", parent.display()))?;
    let store = SqliteStore::open(db_path, storage)?;
    tracing::debug!(path = %db_path.display(), "opened journal store");
    Ok(store)
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> anyhow::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
