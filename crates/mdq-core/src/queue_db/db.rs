//! Connection, migrations and path helpers.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};

use crate::error::QueueError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite queue database.
///
/// The default file lives under the XDG state directory:
/// `~/.local/state/mdq/queue.db`.
#[derive(Clone)]
pub struct QueueDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl QueueDb {
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::config::state_dir()?.join("queue.db"))
    }

    /// Open (or create) the default queue database and run migrations.
    pub async fn open_default() -> Result<Self> {
        Self::open_at(Self::default_path()?).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("open queue database {}", path.display()))?;
        let db = QueueDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // AUTOINCREMENT keeps the id high-water mark in sqlite_sequence, so an
        // id is never handed out twice, even after its row is removed.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                destination TEXT NOT NULL,
                hints_json TEXT,
                state TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                progress_bytes INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER,
                last_error_json TEXT,
                resume_pending INTEGER NOT NULL DEFAULT 0,
                retry_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database failures surface as `SystemFault` where the queue taxonomy is used.
pub(crate) fn fault(e: impl std::fmt::Display) -> QueueError {
    QueueError::SystemFault(format!("queue database: {}", e))
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<QueueDb> {
    // Single connection so the pool never hands back a different empty DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = QueueDb { pool };
    db.migrate().await?;
    Ok(db)
}
