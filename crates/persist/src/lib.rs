//! Dex persistence: best-effort local response cache.
//! Keep code tiny and predictable. A cache, not a source of truth.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use dex_core::StorageError;
use metrics::histogram;
use rusqlite::OptionalExtension;

mod cache;

pub use cache::{PersistOutcome, ResponseCache, CACHE_KEY};

/// String key/value storage. Whole values are written at once.
pub trait Storage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// SQLite-backed storage. Simple, synchronous; values are small JSON blobs.
pub struct SqliteStorage {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStorage {
    /// Open at `DEX_DB_PATH` (or `~/.dex/dex.db`), honouring `DEX_CACHE_MAX_PAGES`.
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("DEX_DB_PATH").unwrap_or_else(|_| default_db_path());
        let max_pages = std::env::var("DEX_CACHE_MAX_PAGES").ok().and_then(|s| s.parse().ok());
        Self::open(&path, max_pages)
    }

    /// `max_pages` caps the database size; writes beyond it fail with
    /// [`StorageError::QuotaExceeded`].
    pub fn open(path: &str, max_pages: Option<u32>) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("creating kv table")?;
        if let Some(max) = max_pages {
            let applied: i64 = db
                .pragma_update_and_check(None, "max_page_count", max, |row| row.get(0))
                .context("setting max_page_count")?;
            tracing::debug!(path = %path, max_pages = applied, "sqlite page quota set");
        }
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StorageError> {
        self.db.lock().map_err(|_| StorageError::Backend("sqlite connection lock poisoned".into()))
    }
}

fn map_sqlite(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::DiskFull => StorageError::QuotaExceeded,
        _ => StorageError::Backend(e.to_string()),
    }
}

impl Storage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db = self.conn()?;
        db.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get::<_, String>(0))
            .optional()
            .map_err(map_sqlite)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO kv(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )
        .map_err(map_sqlite)?;
        histogram!("persist_write_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let db = self.conn()?;
        db.execute("DELETE FROM kv WHERE key = ?1", [key]).map_err(map_sqlite)?;
        Ok(())
    }
}

/// In-process storage with an optional byte quota over all keys and values.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self { map: Mutex::default(), quota_bytes: Some(quota_bytes) }
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.map.lock().map_err(|_| StorageError::Backend("memory storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map()?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = map.iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.map()?.remove(key);
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".dex");
        let _ = std::fs::create_dir_all(&p);
        p.push("dex.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "dex.db".to_string()
}
