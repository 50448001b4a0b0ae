//! SQLite-backed store
//!
//! One table holds the state blob of every consumer, keyed by consumer id,
//! so a single database file can serve all recorders of a process.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::DurableStore;
use crate::types::error::{RecorderError, Result};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a pooled database and make sure the state table exists
pub fn create_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder().max_size(4).build(manager)?;
    initialize_schema(&pool)?;
    Ok(pool)
}

/// Single-connection in-memory database (for testing)
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager)?;
    initialize_schema(&pool)?;
    Ok(pool)
}

fn initialize_schema(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    // synchronous = FULL: an acknowledged pop must survive power loss too
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;

         CREATE TABLE IF NOT EXISTS recorder_state (
             consumer_id  TEXT PRIMARY KEY,
             snapshot     BLOB NOT NULL,
             updated_at   INTEGER NOT NULL   -- unix epoch ms
         );",
    )
    .map_err(|e| RecorderError::Persistence(format!("Failed to initialize schema: {}", e)))?;

    Ok(())
}

/// Consumer ids that have saved state in this database
pub fn list_consumers(pool: &DbPool) -> Result<Vec<String>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT consumer_id FROM recorder_state ORDER BY consumer_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(ids)
}

/// One consumer's row in the shared state table
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    consumer_id: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P, consumer_id: &str) -> Result<Self> {
        let pool = create_pool(db_path.as_ref())?;
        Ok(Self::with_pool(pool, consumer_id))
    }

    pub fn in_memory(consumer_id: &str) -> Result<Self> {
        let pool = create_memory_pool()?;
        Ok(Self::with_pool(pool, consumer_id))
    }

    /// Share an existing pool; the schema must already exist
    pub fn with_pool(pool: DbPool, consumer_id: &str) -> Self {
        Self {
            pool,
            consumer_id: consumer_id.to_string(),
        }
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Forget this consumer's saved state
    pub fn clear(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM recorder_state WHERE consumer_id = ?1",
            params![self.consumer_id],
        )?;
        Ok(())
    }
}

impl DurableStore for SqliteStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        let conn = self.pool.get()?;
        let blob = conn
            .query_row(
                "SELECT snapshot FROM recorder_state WHERE consumer_id = ?1",
                params![self.consumer_id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT OR REPLACE INTO recorder_state (consumer_id, snapshot, updated_at)
             VALUES (?1, ?2, ?3)",
            params![self.consumer_id, bytes, now],
        )?;

        debug!(
            "Saved {} bytes of recorder state for consumer {}",
            bytes.len(),
            self.consumer_id
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.consumer_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let pool = create_memory_pool().expect("Failed to create in-memory database");
        let conn = pool.get().expect("Failed to get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"recorder_state".to_string()));
    }

    #[test]
    fn test_consumers_are_isolated() {
        let pool = create_memory_pool().expect("Failed to create database");
        let calendar = SqliteStore::with_pool(pool.clone(), "calendar-agent");
        let mail = SqliteStore::with_pool(pool.clone(), "mail-agent");

        calendar.save(b"calendar").unwrap();
        assert_eq!(mail.load().unwrap(), None);

        mail.save(b"mail").unwrap();
        mail.save(b"mail-2").unwrap();

        assert_eq!(calendar.load().unwrap(), Some(b"calendar".to_vec()));
        assert_eq!(mail.load().unwrap(), Some(b"mail-2".to_vec()));
        assert_eq!(
            list_consumers(&pool).unwrap(),
            vec!["calendar-agent".to_string(), "mail-agent".to_string()]
        );

        calendar.clear().unwrap();
        assert_eq!(calendar.load().unwrap(), None);
    }
}
