use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use super::migrations;
use crate::document::{Document, DocumentStore, merge, record_path};
use crate::error::{StoreError, StoreResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::unavailable(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}

/// Document store on a single SQLite table. Each record is one JSON body
/// keyed by `(collection, key)`.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<Database>,
}

impl SqliteDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::unavailable(format!("spawn_blocking join error: {}", e)))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn push(&self, collection: &str, document: Document) -> StoreResult<String> {
        let collection = collection.to_string();
        let key = Uuid::new_v4().to_string();
        let body = encode_body(&key, &document)?;

        self.blocking(move |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)",
                    (&collection, &key, &body),
                )?;
                Ok(key)
            })
        })
        .await
    }

    async fn read_all(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        let collection = collection.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, body FROM documents WHERE collection = ?1 ORDER BY key",
                )?;
                let rows = stmt
                    .query_map([&collection], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(key, body)| decode_body(&key, &body).map(|doc| (key, doc)))
                    .collect()
            })
        })
        .await
    }

    async fn read(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let body: Option<String> = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                        (&collection, &key),
                        |row| row.get(0),
                    )
                    .optional()?;
                body.map(|b| decode_body(&key, &b)).transpose()
            })
        })
        .await
    }

    async fn update(&self, collection: &str, key: &str, fields: Document) -> StoreResult<()> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                let tx = conn.unchecked_transaction()?;
                let body: Option<String> = tx
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                        (&collection, &key),
                        |row| row.get(0),
                    )
                    .optional()?;
                let body = body
                    .ok_or_else(|| StoreError::not_found(record_path(&collection, &key)))?;

                let mut doc = decode_body(&key, &body)?;
                merge(&mut doc, fields);
                tx.execute(
                    "UPDATE documents SET body = ?3 WHERE collection = ?1 AND key = ?2",
                    (&collection, &key, encode_body(&key, &doc)?),
                )?;
                tx.commit()?;
                Ok(())
            })
        })
        .await
    }

    async fn remove(&self, collection: &str, key: &str) -> StoreResult<()> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            db.with_conn(|conn| {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                    (&collection, &key),
                )?;
                Ok(())
            })
        })
        .await
    }
}

fn encode_body(key: &str, doc: &Document) -> StoreResult<String> {
    serde_json::to_string(doc).map_err(|e| StoreError::corrupt(key, e))
}

fn decode_body(key: &str, body: &str) -> StoreResult<Document> {
    serde_json::from_str(body).map_err(|e| StoreError::corrupt(key, e))
}
