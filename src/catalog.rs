//! Catalog Store
//!
//! Durable mapping from an auto-assigned integer id to a display name and the
//! locator of the archived channel message it was indexed from.
//!
//! The SQLite backend opens a fresh connection per operation on the blocking
//! pool, so concurrent handlers never share a cursor. WAL journaling gives
//! lock-free readers alongside the single writer.
//!
//! Search semantics: case-insensitive (Unicode lowercase) substring match on
//! the name, ascending id order, unbounded. `%` and `_` are ordinary
//! characters. An empty substring matches every entry.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Catalog persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Locator of an archived message in the source channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginRef {
    pub channel_id: i64,
    pub message_id: i32,
}

impl OriginRef {
    pub fn new(channel_id: i64, message_id: i32) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

/// A single indexed media post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub origin: OriginRef,
    pub created_at: i64, // Unix timestamp
}

/// Catalog capability injected into the ingestion, routing and dispatch paths
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Append an entry; durable once this returns `Ok`
    async fn insert(&self, name: &str, origin: OriginRef) -> Result<i64, StorageError>;

    /// Entries whose name contains `substring`, case-insensitively, by ascending id
    async fn search(&self, substring: &str) -> Result<Vec<CatalogEntry>, StorageError>;

    /// Origin of the entry with `id`, if any
    async fn resolve(&self, id: i64) -> Result<Option<OriginRef>, StorageError>;

    /// Total number of entries
    async fn count(&self) -> Result<u64, StorageError>;
}

/// Case folding shared by insert and search
fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// Turn a connection string into a database file path.
///
/// Accepts a bare path, `sqlite://path` or `sqlite:path`. Query parameters are
/// dropped. In-memory databases are rejected because every operation opens
/// its own connection.
pub fn parse_database_url(url: &str) -> Result<PathBuf, StorageError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() {
        return Err(StorageError::InvalidUrl(format!("{:?} has no file path", url)));
    }
    if path == ":memory:" || url.contains("mode=memory") {
        return Err(StorageError::InvalidUrl(
            "in-memory databases are not supported".to_string(),
        ));
    }
    if path.contains("://") {
        return Err(StorageError::InvalidUrl(format!(
            "unsupported scheme in {:?} (expected a SQLite path)",
            url
        )));
    }

    Ok(PathBuf::from(path))
}

/// SQLite-backed catalog
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    /// Open or create the catalog addressed by a connection string
    pub fn open(database_url: &str) -> Result<Self, StorageError> {
        let path = parse_database_url(database_url)?;
        Self::open_path(&path)
    }

    /// Open or create the catalog at a file path
    pub fn open_path(path: &Path) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let catalog = Self {
            path: path.to_path_buf(),
        };

        let conn = catalog.connect()?;
        // journal_mode is persistent in the file, so once is enough
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        Self::init_schema(&conn)?;

        info!("Catalog store opened: {}", path.display());
        Ok(catalog)
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS catalog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // Per-connection setting: fsync on every commit
        conn.execute_batch("PRAGMA synchronous = FULL;")?;
        Ok(conn)
    }

    /// Run `op` on a dedicated connection off the async runtime
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let catalog = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = catalog.connect()?;
            op(&conn)
        })
        .await?
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        origin: OriginRef {
            channel_id: row.get(2)?,
            message_id: row.get(3)?,
        },
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn insert(&self, name: &str, origin: OriginRef) -> Result<i64, StorageError> {
        let name = name.to_string();
        let folded = fold(&name);
        let created_at = chrono::Utc::now().timestamp();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO catalog (name, name_folded, channel_id, message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, folded, origin.channel_id, origin.message_id, created_at],
            )?;
            let id = conn.last_insert_rowid();
            debug!("Catalog insert: id={}, name={:?}", id, name);
            Ok(id)
        })
        .await
    }

    async fn search(&self, substring: &str) -> Result<Vec<CatalogEntry>, StorageError> {
        let needle = fold(substring);

        self.with_conn(move |conn| {
            let entries = if needle.is_empty() {
                let mut stmt = conn.prepare(
                    "SELECT id, name, channel_id, message_id, created_at
                     FROM catalog ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], entry_from_row)?;
                let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                entries
            } else {
                let mut stmt = conn.prepare(
                    "SELECT id, name, channel_id, message_id, created_at
                     FROM catalog WHERE instr(name_folded, ?1) > 0 ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![needle], entry_from_row)?;
                let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                entries
            };
            Ok(entries)
        })
        .await
    }

    async fn resolve(&self, id: i64) -> Result<Option<OriginRef>, StorageError> {
        self.with_conn(move |conn| {
            let origin = conn
                .query_row(
                    "SELECT channel_id, message_id FROM catalog WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(OriginRef {
                            channel_id: row.get(0)?,
                            message_id: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(origin)
        })
        .await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path() {
        assert_eq!(
            parse_database_url("/var/lib/reelfinder/catalog.db").unwrap(),
            PathBuf::from("/var/lib/reelfinder/catalog.db")
        );
    }

    #[test]
    fn test_parse_sqlite_schemes() {
        assert_eq!(
            parse_database_url("sqlite:///tmp/catalog.db").unwrap(),
            PathBuf::from("/tmp/catalog.db")
        );
        assert_eq!(
            parse_database_url("sqlite:catalog.db?mode=rwc").unwrap(),
            PathBuf::from("catalog.db")
        );
    }

    #[test]
    fn test_parse_rejects_memory_and_foreign_schemes() {
        assert!(matches!(
            parse_database_url("sqlite::memory:"),
            Err(StorageError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_database_url("postgres://user@host/db"),
            Err(StorageError::InvalidUrl(_))
        ));
        assert!(matches!(parse_database_url("  "), Err(StorageError::InvalidUrl(_))));
    }

    #[test]
    fn test_fold_is_unicode_aware() {
        assert_eq!(fold("AMÉLIE"), "amélie");
        assert_eq!(fold("ИНТЕРСТЕЛЛАР"), "интерстеллар");
    }
}
