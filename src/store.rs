use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};
use thiserror::Error;

use crate::gate::ActionKind;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Named document collections shared by every client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Scores,
    Chat,
    Users,
    Ledger(ActionKind),
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Scores => "scores",
            Collection::Chat => "chat",
            Collection::Users => "users",
            Collection::Ledger(ActionKind::Login) => "ledger_login",
            Collection::Ledger(ActionKind::Chat) => "ledger_chat",
            Collection::Ledger(ActionKind::Score) => "ledger_score",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage is busy, try again")]
    Busy,
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy | StoreError::Io(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Busy,
            _ => StoreError::Sqlite(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// the veto rejected the append; nothing was written
    Vetoed,
}

/// What `upsert` did with the collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// an existing document was rewritten to this body
    Updated(String),
}

/// Rewrites a matching document, `None` for documents it leaves alone
pub type Merge<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Decides, against the current contents, whether an append must not happen
pub type Veto<'a> = dyn Fn(&[String]) -> bool + 'a;

/// Ordered JSON documents per collection, oldest first.
///
/// Every mutating call is one critical section: nothing else touches the
/// collection between the veto check, the insert and the cap trim.
pub trait Persistence: Send + Sync {
    fn read_all(&self, collection: Collection) -> Result<Vec<String>, StoreError>;

    /// Append `body` and keep only the newest `cap` documents.
    fn append(
        &self,
        collection: Collection,
        body: &str,
        cap: usize,
        veto: Option<&Veto<'_>>,
    ) -> Result<AppendOutcome, StoreError>;

    /// Rewrite the first document `merge` accepts, or append `body` when
    /// none matches.
    fn upsert(
        &self,
        collection: Collection,
        body: &str,
        merge: &Merge<'_>,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Drop documents for which `keep` is false; returns the survivors.
    fn retain(
        &self,
        collection: Collection,
        keep: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, StoreError>;
}

/// SQLite-backed persistence, safe to share between processes
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout<P: AsRef<Path>>(
        path: P,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq)",
            [],
        )?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rows(conn: &Connection, collection: Collection) -> Result<Vec<(i64, String)>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT seq, body FROM documents WHERE collection = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![collection.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl Persistence for SqliteStore {
    fn read_all(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        Ok(Self::rows(&conn, collection)?
            .into_iter()
            .map(|(_, body)| body)
            .collect())
    }

    fn append(
        &self,
        collection: Collection,
        body: &str,
        cap: usize,
        veto: Option<&Veto<'_>>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(veto) = veto {
            let existing: Vec<String> = Self::rows(&tx, collection)?
                .into_iter()
                .map(|(_, body)| body)
                .collect();
            if veto(existing.as_slice()) {
                return Ok(AppendOutcome::Vetoed);
            }
        }

        tx.execute(
            "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
            params![collection.as_str(), body],
        )?;

        let trimmed = tx.execute(
            r#"
            DELETE FROM documents
            WHERE collection = ?1
              AND seq NOT IN (
                SELECT seq FROM documents WHERE collection = ?1 ORDER BY seq DESC LIMIT ?2
              )
            "#,
            params![collection.as_str(), i64::try_from(cap).unwrap_or(i64::MAX)],
        )?;

        tx.commit()?;

        if trimmed > 0 {
            tracing::debug!(collection = collection.as_str(), trimmed, "trimmed to cap");
        }
        Ok(AppendOutcome::Appended)
    }

    fn upsert(
        &self,
        collection: Collection,
        body: &str,
        merge: &Merge<'_>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let hit = Self::rows(&tx, collection)?
            .into_iter()
            .find_map(|(seq, existing)| merge(&existing).map(|merged| (seq, merged)));
        let outcome = match hit {
            Some((seq, merged)) => {
                tx.execute(
                    "UPDATE documents SET body = ?1 WHERE seq = ?2",
                    params![merged, seq],
                )?;
                UpsertOutcome::Updated(merged)
            }
            None => {
                tx.execute(
                    "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
                    params![collection.as_str(), body],
                )?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn retain(
        &self,
        collection: Collection,
        keep: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut survivors = Vec::new();
        let mut pruned = 0;
        for (seq, body) in Self::rows(&tx, collection)? {
            if keep(&body) {
                survivors.push(body);
            } else {
                tx.execute("DELETE FROM documents WHERE seq = ?1", params![seq])?;
                pruned += 1;
            }
        }

        tx.commit()?;

        if pruned > 0 {
            tracing::debug!(collection = collection.as_str(), pruned, "pruned documents");
        }
        Ok(survivors)
    }
}

/// Process-local persistence for tests and offline use
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Collection, Vec<String>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Persistence for MemoryStore {
    fn read_all(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().get(&collection).cloned().unwrap_or_default())
    }

    fn append(
        &self,
        collection: Collection,
        body: &str,
        cap: usize,
        veto: Option<&Veto<'_>>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut collections = self.lock();
        let docs = collections.entry(collection).or_default();
        if let Some(veto) = veto {
            if veto(docs.as_slice()) {
                return Ok(AppendOutcome::Vetoed);
            }
        }
        docs.push(body.to_string());
        if docs.len() > cap {
            let excess = docs.len() - cap;
            docs.drain(..excess);
        }
        Ok(AppendOutcome::Appended)
    }

    fn upsert(
        &self,
        collection: Collection,
        body: &str,
        merge: &Merge<'_>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut collections = self.lock();
        let docs = collections.entry(collection).or_default();
        for doc in docs.iter_mut() {
            if let Some(merged) = merge(doc) {
                *doc = merged.clone();
                return Ok(UpsertOutcome::Updated(merged));
            }
        }
        docs.push(body.to_string());
        Ok(UpsertOutcome::Inserted)
    }

    fn retain(
        &self,
        collection: Collection,
        keep: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, StoreError> {
        let mut collections = self.lock();
        let docs = collections.entry(collection).or_default();
        docs.retain(|body| keep(body));
        Ok(docs.clone())
    }
}
