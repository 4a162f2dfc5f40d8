//! Two-tier board cache
//!
//! Callers see one `get`/`put`/`list` surface; internally a DashMap
//! memory tier sits over a durable SQLite tier that survives restarts.
//! Both tiers hold full [`BoardDocument`]s including the `dirty` flag,
//! so a board carrying unsaved edits can be recovered after a reload
//! and preferred over a fresh remote copy.
//!
//! Schema:
//! - boards table: bincode blob + searchable id/name/dirty/updated_at
//! - cache_metadata table: schema version for auto-invalidation
//!
//! Invalidation:
//! - Version mismatch on open clears all entries
//! - `remove` evicts a board from both tiers (board deleted remotely)

use crate::models::{BoardDocument, BoardId};
use anyhow::{Context, Result};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Current cache schema version
///
/// Increment when `BoardDocument` changes shape or the table layout
/// changes; stale entries are cleared automatically on open.
///
/// Version History:
/// - v1: Initial version
/// - v2: dirty/updated_at promoted to searchable columns
const CACHE_VERSION: i32 = 2;

/// Two-tier board cache (thread-safe)
pub struct BoardCache {
    memory: DashMap<String, Arc<BoardDocument>>,
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    cache_path: PathBuf,
}

impl BoardCache {
    /// Create or open the cache database
    pub fn open(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let cache_path = cache_dir.join("boards.db");
        let conn = Connection::open(&cache_path)
            .with_context(|| format!("Failed to open cache database: {}", cache_path.display()))?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        // Initialize schema
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS boards (
                board_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                dirty INTEGER NOT NULL,
                updated_at TEXT,
                data BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_dirty ON boards(dirty);
            CREATE INDEX IF NOT EXISTS idx_updated_at ON boards(updated_at);
            "#,
        )
        .context("Failed to create schema")?;

        // Check cache version and auto-invalidate if mismatch
        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query cache version")?;

        match stored_version {
            Some(v) if v != CACHE_VERSION => {
                warn!(
                    stored = v,
                    current = CACHE_VERSION,
                    "Cache version mismatch detected, clearing stale cache"
                );

                conn.execute("DELETE FROM boards", [])
                    .context("Failed to clear stale cache")?;

                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to update cache version")?;
            }
            None => {
                conn.execute(
                    "INSERT INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to initialize cache version")?;
            }
            Some(_) => {
                debug!("Cache version {} matches current", CACHE_VERSION);
            }
        }

        debug!(path = %cache_path.display(), "Board cache initialized");

        Ok(Self {
            memory: DashMap::new(),
            conn: Mutex::new(conn),
            cache_path,
        })
    }

    /// Get a cached board, memory tier first
    ///
    /// A durable hit hydrates the memory tier so the next lookup skips
    /// SQLite entirely.
    pub fn get(&self, id: &BoardId) -> Result<Option<BoardDocument>> {
        if let Some(entry) = self.memory.get(id.as_str()) {
            debug!(board_id = %id, "Cache hit (memory)");
            return Ok(Some(entry.value().as_ref().clone()));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        let result: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM boards WHERE board_id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query cache")?;

        match result {
            Some(bytes) => {
                let board: BoardDocument =
                    bincode::deserialize(&bytes).context("Failed to deserialize cached board")?;
                debug!(board_id = %id, dirty = board.dirty, "Cache hit (durable)");
                self.memory
                    .insert(id.as_str().to_string(), Arc::new(board.clone()));
                Ok(Some(board))
            }
            None => {
                debug!(board_id = %id, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Store a board in both tiers, replacing any entry for the same id
    pub fn put(&self, board: &BoardDocument) -> Result<()> {
        self.memory
            .insert(board.id.as_str().to_string(), Arc::new(board.clone()));

        let data = bincode::serialize(board).context("Failed to serialize board")?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        conn.execute(
            r#"
                INSERT OR REPLACE INTO boards (board_id, name, dirty, updated_at, data)
                VALUES (?, ?, ?, ?, ?)
                "#,
            params![
                board.id.as_str(),
                board.name.as_str(),
                if board.dirty { 1 } else { 0 },
                board.updated_at.as_ref().map(|t| t.to_rfc3339()),
                &data,
            ],
        )
        .context("Failed to insert board")?;

        debug!(board_id = %board.id, dirty = board.dirty, "Board cached");
        Ok(())
    }

    /// All cached boards, most recently updated first
    pub fn list(&self) -> Result<Vec<BoardDocument>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        let mut stmt = conn
            .prepare("SELECT data FROM boards ORDER BY updated_at DESC, board_id")
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                Ok(bytes)
            })
            .context("Failed to query boards")?;

        let mut boards = Vec::new();
        for row in rows {
            let bytes = row.context("Failed to read row")?;
            boards.push(
                bincode::deserialize(&bytes).context("Failed to deserialize cached board")?,
            );
        }

        Ok(boards)
    }

    /// Evict a board from both tiers
    pub fn remove(&self, id: &BoardId) -> Result<()> {
        self.memory.remove(id.as_str());

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        conn.execute("DELETE FROM boards WHERE board_id = ?", params![id.as_str()])
            .context("Failed to delete cache entry")?;

        debug!(board_id = %id, "Cache entry removed");
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        let total_entries: i64 = conn
            .query_row("SELECT COUNT(*) FROM boards", [], |row| row.get(0))
            .context("Failed to count entries")?;

        let dirty_entries: i64 = conn
            .query_row("SELECT COUNT(*) FROM boards WHERE dirty = 1", [], |row| {
                row.get(0)
            })
            .context("Failed to count dirty entries")?;

        let total_size: i64 = conn
            .query_row("SELECT SUM(LENGTH(data)) FROM boards", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(CacheStats {
            total_entries: total_entries as usize,
            dirty_entries: dirty_entries as usize,
            total_size_bytes: total_size as usize,
        })
    }

    /// Clear all entries in both tiers (for testing or rebuild)
    pub fn clear(&self) -> Result<()> {
        self.memory.clear();

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Board cache lock poisoned: {}", e))?;

        conn.execute("DELETE FROM boards", [])
            .context("Failed to clear cache")?;

        debug!("Cache cleared");
        Ok(())
    }
}

impl Drop for BoardCache {
    fn drop(&mut self) {
        // WAL checkpoint on drop so unsaved-edit markers reach the main
        // database file before the process exits
        if let Ok(conn) = self.conn.lock() {
            if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
                warn!("Failed to checkpoint WAL on BoardCache drop: {}", e);
            }
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub dirty_entries: usize,
    pub total_size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoardContent;
    use tempfile::tempdir;

    fn sample_board(id: &str, name: &str) -> BoardDocument {
        BoardDocument::new(id, name, &BoardContent::starter_template())
    }

    #[test]
    fn test_cache_creation() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_cache_put_get() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        let board = sample_board("b1", "Sprint 12");
        cache.put(&board).unwrap();

        let cached = cache.get(&BoardId::new("b1")).unwrap().unwrap();
        assert_eq!(cached, board);

        assert!(cache.get(&BoardId::new("b2")).unwrap().is_none());
    }

    #[test]
    fn test_dirty_flag_survives_reopen() {
        let dir = tempdir().unwrap();

        let mut board = sample_board("b1", "Sprint 12");
        board.dirty = true;

        {
            let cache = BoardCache::open(dir.path()).unwrap();
            cache.put(&board).unwrap();
        }

        // Fresh open: memory tier is cold, durable tier must answer
        let cache = BoardCache::open(dir.path()).unwrap();
        let cached = cache.get(&BoardId::new("b1")).unwrap().unwrap();
        assert!(cached.dirty, "unsaved-edit marker must survive a restart");
        assert_eq!(cache.stats().unwrap().dirty_entries, 1);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        let mut board = sample_board("b1", "Sprint 12");
        cache.put(&board).unwrap();

        board.name = "Sprint 13".to_string();
        board.dirty = true;
        cache.put(&board).unwrap();

        let cached = cache.get(&BoardId::new("b1")).unwrap().unwrap();
        assert_eq!(cached.name, "Sprint 13");
        assert!(cached.dirty);
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_cache_remove() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        cache.put(&sample_board("b1", "Sprint 12")).unwrap();
        cache.remove(&BoardId::new("b1")).unwrap();

        assert!(cache.get(&BoardId::new("b1")).unwrap().is_none());
    }

    #[test]
    fn test_cache_list() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        for i in 0..3 {
            cache
                .put(&sample_board(&format!("b{i}"), &format!("Board {i}")))
                .unwrap();
        }

        let boards = cache.list().unwrap();
        assert_eq!(boards.len(), 3);
    }

    #[test]
    fn test_cache_clear() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::open(dir.path()).unwrap();

        cache.put(&sample_board("b1", "Sprint 12")).unwrap();
        assert_eq!(cache.stats().unwrap().total_entries, 1);

        cache.clear().unwrap();

        assert_eq!(cache.stats().unwrap().total_entries, 0);
        assert!(cache.get(&BoardId::new("b1")).unwrap().is_none());
    }
}
