//! Repository store implementation

use crate::error::Result;
use crate::models::{Repository, RepositoryId};
use rusqlite::{params, Connection};

/// Trait for repository storage operations
pub trait RepositoryStore {
    /// Get the repository row, creating it on first use
    fn get_or_create(&self, id: &RepositoryId, base_url: &str) -> Result<Repository>;

    /// Get a repository by id
    fn get(&self, id: &RepositoryId) -> Result<Option<Repository>>;

    /// List all known repositories, oldest first
    fn list(&self) -> Result<Vec<Repository>>;
}

/// `SQLite` implementation of `RepositoryStore`
pub struct SqliteRepositoryStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRepositoryStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a repository from a database row
    fn parse_repository(row: &rusqlite::Row<'_>) -> rusqlite::Result<Repository> {
        let id: String = row.get(0)?;
        Ok(Repository {
            id: RepositoryId::new(id),
            base_url: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

impl RepositoryStore for SqliteRepositoryStore<'_> {
    fn get_or_create(&self, id: &RepositoryId, base_url: &str) -> Result<Repository> {
        if let Some(existing) = self.get(id)? {
            return Ok(existing);
        }

        let repository = Repository::new(id.clone(), base_url);
        self.conn.execute(
            "INSERT INTO repositories (id, base_url, created_at) VALUES (?1, ?2, ?3)",
            params![
                repository.id.as_str(),
                repository.base_url,
                repository.created_at
            ],
        )?;

        Ok(repository)
    }

    fn get(&self, id: &RepositoryId) -> Result<Option<Repository>> {
        let result = self.conn.query_row(
            "SELECT id, base_url, created_at FROM repositories WHERE id = ?",
            params![id.as_str()],
            Self::parse_repository,
        );

        match result {
            Ok(repository) => Ok(Some(repository)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Repository>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, base_url, created_at FROM repositories ORDER BY created_at ASC")?;

        let repositories = stmt
            .query_map([], Self::parse_repository)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteRepositoryStore::new(db.connection());
        let id = RepositoryId::new("https://cm.example.com");

        let first = store.get_or_create(&id, "https://cm.example.com").unwrap();
        let second = store.get_or_create(&id, "https://cm.example.com").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_get_unknown_is_none() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteRepositoryStore::new(db.connection());

        let missing = store.get(&RepositoryId::new("https://other.example.com"));
        assert!(missing.unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_creation() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteRepositoryStore::new(db.connection());

        store
            .get_or_create(&RepositoryId::new("https://a.example.com"), "https://a.example.com")
            .unwrap();
        store
            .get_or_create(&RepositoryId::new("https://b.example.com"), "https://b.example.com")
            .unwrap();

        let repositories = store.list().unwrap();
        assert_eq!(repositories.len(), 2);
    }
}
