//! Content lookup for the gate. Content CRUD lives in another service; the
//! gate only reads records by hash.

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Seed used when neither `CONTENT_SEED_PATH` nor `CONTENT_DB_PATH` is set.
pub const DEMO_SEED: &str = include_str!("../data/content.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub content_hash: String,
    pub title: String,
    pub content: String,
    /// Uploader's wallet, paid for access. Falls back to `EVM_ADDRESS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Human price (`"$0.10"`). Falls back to `DEFAULT_PRICE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid content seed: {0}")]
    Seed(#[from] serde_json::Error),

    #[error("failed to read content seed: {0}")]
    Io(#[from] std::io::Error),

    #[error("content database lock poisoned")]
    Poisoned,
}

pub trait ContentStore: Send + Sync {
    fn get_by_hash(&self, hash: &str) -> Result<Option<ContentRecord>, ContentError>;
}

/// Records held in memory, seeded from a JSON array.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    records: HashMap<String, ContentRecord>,
}

impl InMemoryContentStore {
    pub fn from_records(records: impl IntoIterator<Item = ContentRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.content_hash.clone(), r))
                .collect(),
        }
    }

    pub fn from_json(seed: &str) -> Result<Self, ContentError> {
        let records: Vec<ContentRecord> = serde_json::from_str(seed)?;
        Ok(Self::from_records(records))
    }

    pub fn from_seed_file(path: &str) -> Result<Self, ContentError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn demo() -> Result<Self, ContentError> {
        Self::from_json(DEMO_SEED)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ContentStore for InMemoryContentStore {
    fn get_by_hash(&self, hash: &str) -> Result<Option<ContentRecord>, ContentError> {
        Ok(self.records.get(hash).cloned())
    }
}

/// Read-only view of the content service's SQLite table:
///
/// ```sql
/// CREATE TABLE content (
///     content_hash TEXT PRIMARY KEY,
///     title TEXT NOT NULL,
///     content TEXT NOT NULL,
///     user_address TEXT,
///     keywords TEXT,   -- JSON array
///     price TEXT
/// );
/// ```
pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    pub fn open(path: &str) -> Result<Self, ContentError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ContentStore for SqliteContentStore {
    fn get_by_hash(&self, hash: &str) -> Result<Option<ContentRecord>, ContentError> {
        let conn = self.conn.lock().map_err(|_| ContentError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT content_hash, title, content, user_address, keywords, price \
                 FROM content WHERE content_hash = ?1",
                [hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(content_hash, title, content, user_address, keywords, price)| ContentRecord {
                content_hash,
                title,
                content,
                user_address,
                keywords: keywords
                    .and_then(|k| serde_json::from_str(&k).ok())
                    .unwrap_or_default(),
                price,
            },
        ))
    }
}

/// Content hashes are opaque identifiers: ASCII alphanumerics, at most 128 chars.
pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.len() <= 128 && hash.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_seed_has_sample_record() {
        let store = InMemoryContentStore::demo().unwrap();
        let record = store.get_by_hash("abc123").unwrap().unwrap();
        assert_eq!(record.price.as_deref(), Some("$0.10"));
        assert!(store.get_by_hash("missing").unwrap().is_none());
    }

    #[test]
    fn test_bad_seed_is_an_error() {
        assert!(matches!(
            InMemoryContentStore::from_json("{not json"),
            Err(ContentError::Seed(_))
        ));
    }

    #[test]
    fn test_sqlite_store_reads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.db");
        let path = path.to_str().unwrap();
        {
            let conn = Connection::open(path).unwrap();
            conn.execute_batch(
                "CREATE TABLE content (content_hash TEXT PRIMARY KEY, title TEXT NOT NULL, \
                 content TEXT NOT NULL, user_address TEXT, keywords TEXT, price TEXT);
                 INSERT INTO content VALUES ('0xfeed', 'Title', 'Body', \
                 '0x4242424242424242424242424242424242424242', '[\"a\",\"b\"]', '0.50');
                 INSERT INTO content VALUES ('0xbare', 'Bare', 'Body', NULL, NULL, NULL);",
            )
            .unwrap();
        }

        let store = SqliteContentStore::open(path).unwrap();
        let record = store.get_by_hash("0xfeed").unwrap().unwrap();
        assert_eq!(record.keywords, vec!["a", "b"]);
        assert_eq!(record.price.as_deref(), Some("0.50"));

        let bare = store.get_by_hash("0xbare").unwrap().unwrap();
        assert!(bare.user_address.is_none());
        assert!(bare.keywords.is_empty());
        assert!(store.get_by_hash("nope").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_store_missing_file() {
        assert!(SqliteContentStore::open("/nonexistent/content.db").is_err());
    }

    #[test]
    fn test_hash_validation() {
        assert!(is_valid_hash("abc123"));
        assert!(is_valid_hash(&"f".repeat(128)));
        assert!(!is_valid_hash(""));
        assert!(!is_valid_hash("../etc"));
        assert!(!is_valid_hash(&"f".repeat(129)));
    }
}
