use crate::record::{parse_embeddings, NewRecord};
use facegate_core::{Embedding, Identity};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store connection is not established or the database cannot be
    /// reached right now.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected the operation due to access control.
    #[error("identity store permission denied: {0}")]
    PermissionDenied(String),
    #[error("encode identity record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sqlite: {0}")]
    Sqlite(rusqlite::Error),
}

/// Map low-level SQLite failures onto the store error taxonomy.
fn map_sqlite(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        match failure.code {
            rusqlite::ErrorCode::PermissionDenied | rusqlite::ErrorCode::ReadOnly => {
                return StoreError::PermissionDenied(e.to_string());
            }
            rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked => {
                return StoreError::Unavailable(e.to_string());
            }
            _ => {}
        }
    }
    StoreError::Sqlite(e)
}

/// The two operations the core requires of an identity store.
///
/// `list_all` returns a consistent-enough snapshot for one call; `create`
/// persists a brand-new identity and must fail loudly rather than drop
/// data.
pub trait IdentityStore {
    fn list_all(&self) -> Result<Vec<Identity>, StoreError>;
    fn create(&mut self, embedding: &Embedding) -> Result<String, StoreError>;
}

/// SQLite-backed document store.
///
/// One row per identity: `id`, a JSON document holding the embedding(s),
/// and a creation timestamp. The document column is what legacy
/// deployments migrated in, hence the dual-shape read adapter.
pub struct SqliteStore {
    conn: Connection,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS identities (
    id         TEXT PRIMARY KEY,
    doc        TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(map_sqlite)?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests and diagnostics.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(map_sqlite)?;
        Ok(Self { conn })
    }

    /// Number of stored identity rows, including records the read adapter
    /// would skip.
    pub fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(map_sqlite)
    }
}

impl IdentityStore for SqliteStore {
    fn list_all(&self) -> Result<Vec<Identity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, doc FROM identities ORDER BY created_at, id")
            .map_err(map_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(map_sqlite)?;

        let mut identities = Vec::new();
        for row in rows {
            let (id, doc) = row.map_err(map_sqlite)?;
            match parse_embeddings(&doc) {
                Some(embeddings) => identities.push(Identity { id, embeddings }),
                None => {
                    tracing::warn!(%id, "skipping identity record matching no known shape");
                }
            }
        }
        Ok(identities)
    }

    fn create(&mut self, embedding: &Embedding) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let doc = serde_json::to_string(&NewRecord {
            user_id: &id,
            encoding: &embedding.values,
        })?;
        let created_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO identities (id, doc, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, doc, created_at],
            )
            .map_err(map_sqlite)?;

        tracing::info!(%id, dim = embedding.dim(), "identity created");
        Ok(id)
    }
}

/// Vec-backed store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Vec<Identity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn list_all(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.identities.clone())
    }

    fn create(&mut self, embedding: &Embedding) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.identities.push(Identity {
            id: id.clone(),
            embeddings: vec![embedding.clone()],
        });
        Ok(id)
    }
}
