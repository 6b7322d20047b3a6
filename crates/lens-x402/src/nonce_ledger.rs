//! Set of consumed authorization nonces.
//!
//! A nonce enters the ledger only through [`NonceLedger::reserve`], which is
//! atomic. Nothing removes a nonce except expiry: an entry is evicted once
//! its authorization's `validBefore` plus the retention grace has passed, at
//! which point no verifier would accept the payload anyway.

use alloy::primitives::B256;
use dashmap::DashMap;
use std::sync::{Mutex, MutexGuard};

use crate::constants::DEFAULT_NONCE_RETENTION_SECS;
use crate::payment::nonce_prefix;

/// Storage backend for consumed nonces. Must be thread-safe.
pub trait NonceLedger: Send + Sync {
    /// Whether the nonce has been consumed.
    fn contains(&self, nonce: &B256) -> bool;

    /// Atomically insert the nonce if absent. Returns `true` if this call
    /// claimed it, `false` if it was already present (replay).
    fn reserve(&self, nonce: B256, valid_before: u64) -> bool;

    /// Drop entries whose `valid_before + retention < now`. Returns the number evicted.
    fn evict_expired(&self, now: u64) -> usize;
}

/// In-memory ledger backed by DashMap. Fast but lost on restart.
pub struct InMemoryNonceLedger {
    nonces: DashMap<B256, u64>,
    retention_secs: u64,
}

impl InMemoryNonceLedger {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_NONCE_RETENTION_SECS)
    }

    pub fn with_retention(retention_secs: u64) -> Self {
        Self {
            nonces: DashMap::new(),
            retention_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl Default for InMemoryNonceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceLedger for InMemoryNonceLedger {
    fn contains(&self, nonce: &B256) -> bool {
        self.nonces.contains_key(nonce)
    }

    fn reserve(&self, nonce: B256, valid_before: u64) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.nonces.entry(nonce) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(valid_before);
                true
            }
        }
    }

    fn evict_expired(&self, now: u64) -> usize {
        let before = self.nonces.len();
        let retention = self.retention_secs;
        self.nonces
            .retain(|_, valid_before| valid_before.saturating_add(retention) >= now);
        before.saturating_sub(self.nonces.len())
    }
}

/// Persistent ledger backed by SQLite. Survives restarts.
pub struct SqliteNonceLedger {
    conn: Mutex<rusqlite::Connection>,
    retention_secs: u64,
}

impl SqliteNonceLedger {
    /// Open (or create) a nonce database at `path`.
    ///
    /// On Unix the file is restricted to 0600.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        Self::open_with_retention(path, DEFAULT_NONCE_RETENTION_SECS)
    }

    pub fn open_with_retention(path: &str, retention_secs: u64) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS consumed_nonces (
                nonce BLOB PRIMARY KEY,
                valid_before INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_consumed_nonces_valid_before
                ON consumed_nonces(valid_before);
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set nonce database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            retention_secs,
        })
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("nonce ledger mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// SQLite INTEGER is signed; clamp rather than wrap.
fn to_sql_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

impl NonceLedger for SqliteNonceLedger {
    fn contains(&self, nonce: &B256) -> bool {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM consumed_nonces WHERE nonce = ?1",
            [nonce.as_slice()],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        // Fail-secure: a read error counts as consumed.
        .unwrap_or(true)
    }

    fn reserve(&self, nonce: B256, valid_before: u64) -> bool {
        let conn = self.conn();
        // PRIMARY KEY makes the INSERT the atomic test-and-set.
        match conn.execute(
            "INSERT INTO consumed_nonces (nonce, valid_before) VALUES (?1, ?2)",
            rusqlite::params![nonce.as_slice(), to_sql_secs(valid_before)],
        ) {
            Ok(_) => true,
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                false
            }
            Err(e) => {
                // Fail-closed: an unrecorded nonce must not be settled.
                tracing::error!(
                    nonce = %nonce_prefix(&nonce),
                    error = %e,
                    "nonce reservation failed, refusing settlement"
                );
                false
            }
        }
    }

    fn evict_expired(&self, now: u64) -> usize {
        let cutoff = to_sql_secs(now.saturating_sub(self.retention_secs));
        let conn = self.conn();
        conn.execute(
            "DELETE FROM consumed_nonces WHERE valid_before < ?1",
            rusqlite::params![cutoff],
        )
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "nonce eviction failed");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite(dir: &tempfile::TempDir) -> SqliteNonceLedger {
        let path = dir.path().join("nonces.db");
        SqliteNonceLedger::open_with_retention(path.to_str().unwrap(), 60).unwrap()
    }

    #[test]
    fn test_in_memory_reserve_is_single_use() {
        let ledger = InMemoryNonceLedger::new();
        let nonce = B256::repeat_byte(0x99);

        assert!(!ledger.contains(&nonce));
        assert!(ledger.reserve(nonce, 1_000));
        assert!(!ledger.reserve(nonce, 1_000));
        assert!(ledger.contains(&nonce));
    }

    #[test]
    fn test_in_memory_independent_nonces() {
        let ledger = InMemoryNonceLedger::new();
        assert!(ledger.reserve(B256::repeat_byte(0x01), 10));
        assert!(ledger.reserve(B256::repeat_byte(0x02), 10));
        assert!(!ledger.contains(&B256::repeat_byte(0x03)));
    }

    #[test]
    fn test_in_memory_evicts_only_past_retention() {
        let ledger = InMemoryNonceLedger::with_retention(60);
        let old = B256::repeat_byte(0x0a);
        let live = B256::repeat_byte(0x0b);
        ledger.reserve(old, 1_000);
        ledger.reserve(live, 1_950);

        // cutoff = 2_000 - 60 = 1_940
        assert_eq!(ledger.evict_expired(2_000), 1);
        assert!(!ledger.contains(&old));
        assert!(ledger.contains(&live));
    }

    #[test]
    fn test_in_memory_grace_boundary_is_kept() {
        let ledger = InMemoryNonceLedger::with_retention(60);
        let nonce = B256::repeat_byte(0x0c);
        ledger.reserve(nonce, 1_000);
        assert_eq!(ledger.evict_expired(1_060), 0);
        assert_eq!(ledger.evict_expired(1_061), 1);
    }

    #[test]
    fn test_sqlite_reserve_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sqlite(&dir);
        let nonce = B256::repeat_byte(0x42);

        assert!(!ledger.contains(&nonce));
        assert!(ledger.reserve(nonce, 1_000));
        assert!(!ledger.reserve(nonce, 1_000));
        assert!(ledger.contains(&nonce));
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let nonce = B256::repeat_byte(0xaa);
        {
            let ledger = sqlite(&dir);
            assert!(ledger.reserve(nonce, u64::MAX));
        }
        {
            let ledger = sqlite(&dir);
            assert!(ledger.contains(&nonce));
            assert!(!ledger.reserve(nonce, u64::MAX));
        }
    }

    #[test]
    fn test_sqlite_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sqlite(&dir);
        let old = B256::repeat_byte(0xbb);
        let live = B256::repeat_byte(0xcc);
        ledger.reserve(old, 1_000);
        ledger.reserve(live, 5_000);

        assert_eq!(ledger.evict_expired(2_000), 1);
        assert!(!ledger.contains(&old));
        assert!(ledger.contains(&live));
    }

    #[test]
    fn test_sqlite_in_memory_path() {
        let ledger = SqliteNonceLedger::open(":memory:").unwrap();
        assert!(ledger.reserve(B256::repeat_byte(0x01), 10));
        assert_eq!(ledger.retention_secs, DEFAULT_NONCE_RETENTION_SECS);
    }
}
