//! Shared database service wrapper used across clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::Result;

/// Thread-safe service for database access.
///
/// Cheap to clone; every clone shares the same underlying connection behind
/// an async mutex, so spawned tasks can hold a handle without lifetimes.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Run a closure with exclusive access to the underlying database
    pub async fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().await;
        f(&db)
    }

    /// Filesystem path of the database, `None` for in-memory services
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
