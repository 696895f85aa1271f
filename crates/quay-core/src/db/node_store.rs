//! Sync-node store implementation

use crate::error::{Error, Result};
use crate::models::{NodeId, RepositoryId, SyncFailure, SyncNode};
use rusqlite::{params, Connection};

/// Column list shared by every sync-node query
const NODE_COLUMNS: &str = "id, title, is_folder, is_top_level, unfavorited_has_local_changes, \
     reload_content, last_downloaded_at, content_path, node, parent_id, repository_id";

/// Trait for sync-node storage operations
pub trait SyncNodeStore {
    /// Insert a record or update it in place, keyed by node id
    fn upsert(&self, node: &SyncNode) -> Result<()>;

    /// Get a record by node id
    fn get(&self, id: &NodeId) -> Result<Option<SyncNode>>;

    /// Derived child set of a node, ordered by title
    fn children(&self, id: &NodeId) -> Result<Vec<SyncNode>>;

    /// Roots of synced subtrees for a repository, ordered by title
    fn top_level(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>>;

    /// Mark or unmark a record as a top-level sync entry
    fn set_top_level(&self, id: &NodeId, top_level: bool) -> Result<()>;

    /// Attach a record under a parent (or detach it with `None`).
    ///
    /// The parent must exist and be a folder.
    fn set_parent(&self, id: &NodeId, parent: Option<&NodeId>) -> Result<()>;

    /// Set the dirty flag on a node and, for folders, every descendant
    fn mark_for_reload(&self, id: &NodeId) -> Result<()>;

    /// Record a successful content download: stamps both download fields
    /// together and clears the dirty flag
    fn record_download(&self, id: &NodeId, content_path: &str, downloaded_at: i64) -> Result<()>;

    /// Flag or unflag a record as unfavorited-with-local-changes
    fn set_unfavorited_has_local_changes(&self, id: &NodeId, value: bool) -> Result<()>;

    /// Records retained after unfavoriting because local edits are un-pushed
    fn unfavorited_with_changes(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>>;

    /// Delete a record; descendants and any failure row go with it
    fn remove(&self, id: &NodeId) -> Result<()>;

    /// Record the most recent sync failure for a node (one row per node)
    fn record_failure(&self, failure: &SyncFailure) -> Result<()>;

    /// Get the recorded failure for a node, if any
    fn failure(&self, id: &NodeId) -> Result<Option<SyncFailure>>;

    /// Clear the recorded failure for a node; clearing an absent row is a no-op
    fn clear_failure(&self, id: &NodeId) -> Result<()>;

    /// Nodes of a repository with a recorded failure, most recent first
    fn failed_nodes(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>>;
}

/// `SQLite` implementation of `SyncNodeStore`
pub struct SqliteSyncNodeStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncNodeStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a sync node from a database row
    fn parse_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncNode> {
        let id: String = row.get(0)?;
        let node_json: Option<String> = row.get(8)?;
        let parent_id: Option<String> = row.get(9)?;
        let repository_id: String = row.get(10)?;

        Ok(SyncNode {
            id: id.parse().unwrap_or_default(),
            title: row.get(1)?,
            is_folder: row.get::<_, i32>(2)? != 0,
            is_top_level: row.get::<_, i32>(3)? != 0,
            unfavorited_has_local_changes: row.get::<_, i32>(4)? != 0,
            reload_content: row.get::<_, i32>(5)? != 0,
            last_downloaded_at: row.get(6)?,
            content_path: row.get(7)?,
            node: node_json.and_then(|json| serde_json::from_str(&json).ok()),
            parent_id: parent_id.and_then(|id| id.parse().ok()),
            repository_id: RepositoryId::new(repository_id),
        })
    }

    /// Parse a sync failure from a database row
    fn parse_failure(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncFailure> {
        let node_id: String = row.get(0)?;
        let code: String = row.get(1)?;

        Ok(SyncFailure {
            node_id: node_id.parse().unwrap_or_default(),
            code: code.parse().unwrap_or_default(),
            description: row.get(2)?,
            failed_at: row.get(3)?,
        })
    }
}

impl SyncNodeStore for SqliteSyncNodeStore<'_> {
    fn upsert(&self, node: &SyncNode) -> Result<()> {
        let node_json = node.node.as_ref().map(serde_json::to_string).transpose()?;

        // ON CONFLICT instead of INSERT OR REPLACE: a REPLACE would delete the
        // existing row first and cascade away its children.
        self.conn.execute(
            "INSERT INTO sync_nodes (id, title, is_folder, is_top_level, unfavorited_has_local_changes,
                                     reload_content, last_downloaded_at, content_path, node, parent_id, repository_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 is_folder = excluded.is_folder,
                 is_top_level = excluded.is_top_level,
                 unfavorited_has_local_changes = excluded.unfavorited_has_local_changes,
                 reload_content = excluded.reload_content,
                 last_downloaded_at = excluded.last_downloaded_at,
                 content_path = excluded.content_path,
                 node = excluded.node,
                 parent_id = excluded.parent_id,
                 repository_id = excluded.repository_id",
            params![
                node.id.as_str(),
                node.title,
                i32::from(node.is_folder),
                i32::from(node.is_top_level),
                i32::from(node.unfavorited_has_local_changes),
                i32::from(node.reload_content),
                node.last_downloaded_at,
                node.content_path,
                node_json,
                node.parent_id.as_ref().map(NodeId::as_str),
                node.repository_id.as_str(),
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: &NodeId) -> Result<Option<SyncNode>> {
        let result = self.conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM sync_nodes WHERE id = ?"),
            params![id.as_str()],
            Self::parse_node,
        );

        match result {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn children(&self, id: &NodeId) -> Result<Vec<SyncNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM sync_nodes
             WHERE parent_id = ?
             ORDER BY title COLLATE NOCASE ASC"
        ))?;

        let nodes = stmt
            .query_map(params![id.as_str()], Self::parse_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }

    fn top_level(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM sync_nodes
             WHERE repository_id = ? AND is_top_level = 1
             ORDER BY title COLLATE NOCASE ASC"
        ))?;

        let nodes = stmt
            .query_map(params![repository.as_str()], Self::parse_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }

    fn set_top_level(&self, id: &NodeId, top_level: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_nodes SET is_top_level = ? WHERE id = ?",
            params![i32::from(top_level), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn set_parent(&self, id: &NodeId, parent: Option<&NodeId>) -> Result<()> {
        if let Some(parent_id) = parent {
            let parent_node = self
                .get(parent_id)?
                .ok_or_else(|| Error::NotFound(parent_id.to_string()))?;
            if !parent_node.is_folder {
                return Err(Error::InvalidInput(format!(
                    "node {parent_id} is not a folder"
                )));
            }
        }

        let rows = self.conn.execute(
            "UPDATE sync_nodes SET parent_id = ? WHERE id = ?",
            params![parent.map(NodeId::as_str), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn mark_for_reload(&self, id: &NodeId) -> Result<()> {
        let rows = self.conn.execute(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM sync_nodes WHERE id = ?1
                 UNION ALL
                 SELECT n.id FROM sync_nodes n JOIN subtree s ON n.parent_id = s.id
             )
             UPDATE sync_nodes SET reload_content = 1
             WHERE id IN (SELECT id FROM subtree)",
            params![id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn record_download(&self, id: &NodeId, content_path: &str, downloaded_at: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_nodes
             SET last_downloaded_at = ?, content_path = ?, reload_content = 0
             WHERE id = ?",
            params![downloaded_at, content_path, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn set_unfavorited_has_local_changes(&self, id: &NodeId, value: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_nodes SET unfavorited_has_local_changes = ? WHERE id = ?",
            params![i32::from(value), id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn unfavorited_with_changes(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM sync_nodes
             WHERE repository_id = ? AND unfavorited_has_local_changes = 1
             ORDER BY title COLLATE NOCASE ASC"
        ))?;

        let nodes = stmt
            .query_map(params![repository.as_str()], Self::parse_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }

    fn remove(&self, id: &NodeId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_nodes WHERE id = ?", params![id.as_str()])?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn record_failure(&self, failure: &SyncFailure) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_failures (node_id, code, description, failed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id) DO UPDATE SET
                 code = excluded.code,
                 description = excluded.description,
                 failed_at = excluded.failed_at",
            params![
                failure.node_id.as_str(),
                failure.code.as_str(),
                failure.description,
                failure.failed_at,
            ],
        )?;

        Ok(())
    }

    fn failure(&self, id: &NodeId) -> Result<Option<SyncFailure>> {
        let result = self.conn.query_row(
            "SELECT node_id, code, description, failed_at FROM sync_failures WHERE node_id = ?",
            params![id.as_str()],
            Self::parse_failure,
        );

        match result {
            Ok(failure) => Ok(Some(failure)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_failure(&self, id: &NodeId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM sync_failures WHERE node_id = ?",
            params![id.as_str()],
        )?;

        Ok(())
    }

    fn failed_nodes(&self, repository: &RepositoryId) -> Result<Vec<SyncNode>> {
        let columns = NODE_COLUMNS
            .split(", ")
            .map(|column| format!("n.{column}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns} FROM sync_nodes n
             JOIN sync_failures f ON n.id = f.node_id
             WHERE n.repository_id = ?
             ORDER BY f.failed_at DESC"
        ))?;

        let nodes = stmt
            .query_map(params![repository.as_str()], Self::parse_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, RepositoryStore, SqliteRepositoryStore};
    use crate::models::{FailureCode, RemoteNode};
    use pretty_assertions::assert_eq;

    fn setup() -> (Database, RepositoryId) {
        let db = Database::open_in_memory().unwrap();
        let repository = RepositoryId::new("https://cm.example.com");
        SqliteRepositoryStore::new(db.connection())
            .get_or_create(&repository, "https://cm.example.com")
            .unwrap();
        (db, repository)
    }

    fn folder(store: &SqliteSyncNodeStore<'_>, repository: &RepositoryId, name: &str) -> SyncNode {
        let remote = RemoteNode::folder(name);
        let mut record = SyncNode::from_remote(&remote, repository.clone());
        record.is_top_level = true;
        store.upsert(&record).unwrap();
        record
    }

    fn document(
        store: &SqliteSyncNodeStore<'_>,
        repository: &RepositoryId,
        name: &str,
        parent: Option<&NodeId>,
    ) -> SyncNode {
        let remote = RemoteNode::document(name, 16);
        let mut record = SyncNode::from_remote(&remote, repository.clone());
        record.parent_id = parent.copied();
        store.upsert(&record).unwrap();
        record
    }

    #[test]
    fn test_upsert_and_get() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let record = document(&store, &repository, "report.pdf", None);
        let fetched = store.get(&record.id).unwrap().unwrap();

        assert_eq!(fetched, record);
        assert_eq!(fetched.node.unwrap().name, "report.pdf");
    }

    #[test]
    fn test_get_unknown_is_none() {
        let (db, _) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        assert!(store.get(&NodeId::new()).unwrap().is_none());
    }

    #[test]
    fn test_children_are_derived_and_ordered() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let parent = folder(&store, &repository, "Projects");
        document(&store, &repository, "zebra.txt", Some(&parent.id));
        document(&store, &repository, "Alpha.txt", Some(&parent.id));

        let children = store.children(&parent.id).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].title, "Alpha.txt");
        assert_eq!(children[1].title, "zebra.txt");
    }

    #[test]
    fn test_leaf_has_no_children() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let leaf = document(&store, &repository, "leaf.txt", None);
        assert!(store.children(&leaf.id).unwrap().is_empty());
    }

    #[test]
    fn test_top_level_filters() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let root = folder(&store, &repository, "Root");
        document(&store, &repository, "nested.txt", Some(&root.id));

        let roots = store.top_level(&repository).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);
    }

    #[test]
    fn test_upsert_preserves_children() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let mut parent = folder(&store, &repository, "Projects");
        let child = document(&store, &repository, "a.txt", Some(&parent.id));

        parent.title = "Projects (renamed)".to_string();
        store.upsert(&parent).unwrap();

        assert!(store.get(&child.id).unwrap().is_some());
        assert_eq!(store.children(&parent.id).unwrap().len(), 1);
    }

    #[test]
    fn test_set_parent_rejects_non_folder() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let not_a_folder = document(&store, &repository, "plain.txt", None);
        let child = document(&store, &repository, "child.txt", None);

        let error = store
            .set_parent(&child.id, Some(&not_a_folder.id))
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[test]
    fn test_set_parent_requires_existing_parent() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let child = document(&store, &repository, "child.txt", None);
        let error = store.set_parent(&child.id, Some(&NodeId::new())).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn test_set_parent_detaches_with_none() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let parent = folder(&store, &repository, "Projects");
        let child = document(&store, &repository, "a.txt", Some(&parent.id));

        store.set_parent(&child.id, None).unwrap();
        assert_eq!(store.get(&child.id).unwrap().unwrap().parent_id, None);
    }

    #[test]
    fn test_remove_cascades_to_subtree() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let root = folder(&store, &repository, "Root");
        let nested = folder(&store, &repository, "Nested");
        store.set_parent(&nested.id, Some(&root.id)).unwrap();
        let leaf = document(&store, &repository, "leaf.txt", Some(&nested.id));

        store.remove(&root.id).unwrap();

        assert!(store.get(&root.id).unwrap().is_none());
        assert!(store.get(&nested.id).unwrap().is_none());
        assert!(store.get(&leaf.id).unwrap().is_none());
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let (db, _) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let error = store.remove(&NodeId::new()).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn test_mark_for_reload_covers_subtree() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let root = folder(&store, &repository, "Root");
        let leaf = document(&store, &repository, "leaf.txt", Some(&root.id));
        let outside = document(&store, &repository, "outside.txt", None);

        store.mark_for_reload(&root.id).unwrap();

        assert!(store.get(&root.id).unwrap().unwrap().reload_content);
        assert!(store.get(&leaf.id).unwrap().unwrap().reload_content);
        assert!(!store.get(&outside.id).unwrap().unwrap().reload_content);
    }

    #[test]
    fn test_record_download_stamps_both_fields() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let mut record = document(&store, &repository, "a.txt", None);
        record.reload_content = true;
        store.upsert(&record).unwrap();

        let path = format!("{}/a.txt", record.id);
        store.record_download(&record.id, &path, 42_000).unwrap();

        let fetched = store.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.last_downloaded_at, Some(42_000));
        assert_eq!(fetched.content_path, Some(path));
        assert!(!fetched.reload_content);
        assert!(fetched.is_downloaded());
    }

    #[test]
    fn test_unfavorited_with_changes_filter() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let kept = document(&store, &repository, "kept.txt", None);
        document(&store, &repository, "clean.txt", None);
        store
            .set_unfavorited_has_local_changes(&kept.id, true)
            .unwrap();

        let pending = store.unfavorited_with_changes(&repository).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, kept.id);
    }

    #[test]
    fn test_failure_is_one_per_node() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let record = document(&store, &repository, "a.txt", None);
        store
            .record_failure(&SyncFailure::new(
                record.id,
                FailureCode::Network,
                "connection reset",
            ))
            .unwrap();
        store
            .record_failure(&SyncFailure::new(record.id, FailureCode::Remote, "HTTP 503"))
            .unwrap();

        let failure = store.failure(&record.id).unwrap().unwrap();
        assert_eq!(failure.code, FailureCode::Remote);
        assert_eq!(failure.description, "HTTP 503");

        let failed = store.failed_nodes(&repository).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, record.id);
    }

    #[test]
    fn test_clear_failure_is_idempotent() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let record = document(&store, &repository, "a.txt", None);
        store
            .record_failure(&SyncFailure::new(record.id, FailureCode::Io, "disk full"))
            .unwrap();

        store.clear_failure(&record.id).unwrap();
        store.clear_failure(&record.id).unwrap();

        assert!(store.failure(&record.id).unwrap().is_none());
    }

    #[test]
    fn test_removing_node_drops_its_failure() {
        let (db, repository) = setup();
        let store = SqliteSyncNodeStore::new(db.connection());

        let record = document(&store, &repository, "a.txt", None);
        store
            .record_failure(&SyncFailure::new(record.id, FailureCode::Remote, "HTTP 500"))
            .unwrap();

        store.remove(&record.id).unwrap();

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sync_failures", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
