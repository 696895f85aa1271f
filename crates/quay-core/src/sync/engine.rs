//! Sync pass orchestration: push retained edits, walk the synced tree,
//! download stale content.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::{SqliteSyncNodeStore, SyncNodeStore};
use crate::error::{Error, Result};
use crate::models::{NodeId, RemoteNode, RepositoryId, SyncFailure, SyncNode};
use crate::services::DatabaseService;
use crate::session::Session;

/// Counters for one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records visited during the walk
    pub examined: usize,
    /// Documents whose content was fetched
    pub downloaded: usize,
    /// Retained edits pushed back to the repository
    pub uploaded: usize,
    /// Records dropped because their remote counterpart vanished
    pub removed: usize,
    /// Nodes whose sync step failed and was recorded
    pub failed: usize,
}

/// Drives full sync passes over one repository's synced content.
///
/// Per-node failures are recorded on the node and the pass continues;
/// only database errors abort a pass.
pub struct SyncEngine {
    session: Arc<dyn Session>,
    db: DatabaseService,
    content_dir: PathBuf,
    repository_id: RepositoryId,
}

impl SyncEngine {
    /// Create an engine bound to a session, store, and content directory
    pub fn new(
        session: Arc<dyn Session>,
        db: DatabaseService,
        content_dir: impl Into<PathBuf>,
    ) -> Self {
        let repository_id = session.repository_id();
        Self {
            session,
            db,
            content_dir: content_dir.into(),
            repository_id,
        }
    }

    /// Run a full sync pass: push retained edits, walk the synced tree
    /// breadth-first, download stale content.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.push_unfavorited(&mut report).await?;

        let repository_id = self.repository_id.clone();
        let roots = self
            .db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).top_level(&repository_id))
            .await?;

        let mut queue: VecDeque<SyncNode> = roots.into();
        while let Some(record) = queue.pop_front() {
            report.examined += 1;

            if record.is_folder {
                match self.session.children(&record.id).await {
                    Ok(children) => {
                        let kept = self.reconcile_children(&record, children, &mut report).await?;
                        self.clear_failure(&record.id).await?;
                        queue.extend(kept);
                    }
                    Err(error) => self.record_failure(&record.id, &error, &mut report).await?,
                }
            } else {
                self.sync_document(record, &mut report).await?;
            }
        }

        tracing::info!(
            examined = report.examined,
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            removed = report.removed,
            failed = report.failed,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Push edits retained after unfavoriting, then drop the records
    async fn push_unfavorited(&self, report: &mut SyncReport) -> Result<()> {
        let repository_id = self.repository_id.clone();
        let pending = self
            .db
            .with_db(move |db| {
                SqliteSyncNodeStore::new(db.connection()).unfavorited_with_changes(&repository_id)
            })
            .await?;

        for record in pending {
            let Some(content_path) = record.content_path.clone() else {
                // Nothing was ever downloaded, so there is nothing to push.
                self.remove_record(&record.id).await?;
                continue;
            };

            let path = self.content_dir.join(&content_path);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    self.remove_record(&record.id).await?;
                    continue;
                }
                Err(error) => {
                    self.record_failure(&record.id, &error.into(), report).await?;
                    continue;
                }
            };

            match self.session.update_content(&record.id, &bytes).await {
                Ok(()) => {
                    self.remove_record(&record.id).await?;
                    let _ = std::fs::remove_file(&path);
                    report.uploaded += 1;
                    tracing::debug!(node = %record.id, "pushed retained edits");
                }
                Err(error) => self.record_failure(&record.id, &error, report).await?,
            }
        }

        Ok(())
    }

    /// Mirror a folder's fetched children into the store.
    ///
    /// Children present remotely are upserted under the parent; records whose
    /// remote counterpart vanished are dropped with their subtrees. Returns
    /// the refreshed child records for the walk to continue on.
    async fn reconcile_children(
        &self,
        parent: &SyncNode,
        children: Vec<RemoteNode>,
        report: &mut SyncReport,
    ) -> Result<Vec<SyncNode>> {
        let parent_id = parent.id;
        let repository_id = self.repository_id.clone();

        let (kept, removed) = self
            .db
            .with_db(move |db| {
                let store = SqliteSyncNodeStore::new(db.connection());
                let fetched: HashSet<NodeId> = children.iter().map(|child| child.id).collect();

                let mut removed = 0usize;
                for existing in store.children(&parent_id)? {
                    if !fetched.contains(&existing.id) {
                        store.remove(&existing.id)?;
                        removed += 1;
                    }
                }

                let mut kept = Vec::with_capacity(children.len());
                for child in children {
                    let mut record = store
                        .get(&child.id)?
                        .unwrap_or_else(|| SyncNode::from_remote(&child, repository_id.clone()));
                    record.title = child.name.clone();
                    record.is_folder = child.is_folder;
                    record.parent_id = Some(parent_id);
                    record.node = Some(child);
                    store.upsert(&record)?;
                    kept.push(record);
                }

                Ok((kept, removed))
            })
            .await?;

        report.removed += removed;
        Ok(kept)
    }

    /// Refresh one document and download its content when stale
    async fn sync_document(&self, record: SyncNode, report: &mut SyncReport) -> Result<()> {
        let id = record.id;

        let remote = match self.session.node(&id).await {
            Ok(remote) => remote,
            Err(error) => return self.record_failure(&id, &error, report).await,
        };

        let mut updated = record;
        updated.title = remote.name.clone();

        if !updated.needs_download(remote.modified_at) {
            updated.node = Some(remote);
            self.db
                .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).upsert(&updated))
                .await?;
            self.clear_failure(&id).await?;
            return Ok(());
        }

        let bytes = match self.session.content(&id).await {
            Ok(bytes) => bytes,
            Err(error) => return self.record_failure(&id, &error, report).await,
        };

        let content_path = content_path_for(&remote);
        let path = self.content_dir.join(&content_path);
        if let Err(error) = write_content(&path, &bytes) {
            return self.record_failure(&id, &error, report).await;
        }

        updated.node = Some(remote);
        let downloaded_at = chrono::Utc::now().timestamp_millis();
        self.db
            .with_db(move |db| {
                let store = SqliteSyncNodeStore::new(db.connection());
                store.upsert(&updated)?;
                store.record_download(&id, &content_path, downloaded_at)
            })
            .await?;
        self.clear_failure(&id).await?;

        report.downloaded += 1;
        tracing::debug!(node = %id, "downloaded content");
        Ok(())
    }

    async fn record_failure(&self, id: &NodeId, error: &Error, report: &mut SyncReport) -> Result<()> {
        tracing::warn!(node = %id, error = %error, "sync step failed");
        report.failed += 1;

        let failure = SyncFailure::from_error(*id, error);
        self.db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).record_failure(&failure))
            .await
    }

    async fn clear_failure(&self, id: &NodeId) -> Result<()> {
        let id = *id;
        self.db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).clear_failure(&id))
            .await
    }

    async fn remove_record(&self, id: &NodeId) -> Result<()> {
        let id = *id;
        self.db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).remove(&id))
            .await
    }
}

/// Content lands under `<content_dir>/<node-id>/<name>`, with path
/// separators in the remote name flattened out.
fn content_path_for(remote: &RemoteNode) -> String {
    let name = remote.name.replace(['/', '\\'], "_");
    format!("{}/{name}", remote.id)
}

fn write_content(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{RepositoryStore, SqliteRepositoryStore};
    use crate::session::testing::MockSession;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    async fn setup() -> (Arc<MockSession>, DatabaseService, SyncEngine, TempDir) {
        let session = Arc::new(MockSession::new());
        let db = DatabaseService::open_in_memory().unwrap();

        let repository = session.repository_id();
        db.with_db(move |db| {
            SqliteRepositoryStore::new(db.connection())
                .get_or_create(&repository, repository.as_str())
                .map(|_| ())
        })
        .await
        .unwrap();

        let tmp = tempdir().unwrap();
        let engine = SyncEngine::new(
            Arc::clone(&session) as Arc<dyn Session>,
            db.clone(),
            tmp.path(),
        );
        (session, db, engine, tmp)
    }

    async fn track_top_level(db: &DatabaseService, session: &MockSession, remote: &RemoteNode) {
        let mut record = SyncNode::from_remote(remote, session.repository_id());
        record.is_top_level = true;
        db.with_db(move |db| SqliteSyncNodeStore::new(db.connection()).upsert(&record))
            .await
            .unwrap();
    }

    async fn stored(db: &DatabaseService, id: NodeId) -> Option<SyncNode> {
        db.with_db(move |db| SqliteSyncNodeStore::new(db.connection()).get(&id))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_downloads_new_documents() {
        let (session, db, engine, tmp) = setup().await;

        let doc = RemoteNode::document("report.pdf", 5);
        session.insert_node(&doc, None, Some(b"hello"));
        track_top_level(&db, &session, &doc).await;

        let report = engine.sync().await.unwrap();
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, 0);

        let record = stored(&db, doc.id).await.unwrap();
        assert!(record.is_downloaded());

        let cached = tmp.path().join(record.content_path.unwrap());
        assert_eq!(std::fs::read(cached).unwrap(), b"hello");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_pass_skips_fresh_content() {
        let (session, db, engine, _tmp) = setup().await;

        let doc = RemoteNode::document("report.pdf", 5);
        session.insert_node(&doc, None, Some(b"hello"));
        track_top_level(&db, &session, &doc).await;

        engine.sync().await.unwrap();
        let report = engine.sync().await.unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(session.content_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_newer_remote_content_is_refetched() {
        let (session, db, engine, _tmp) = setup().await;

        let doc = RemoteNode::document("report.pdf", 5);
        session.insert_node(&doc, None, Some(b"v1"));
        track_top_level(&db, &session, &doc).await;
        engine.sync().await.unwrap();

        let mut newer = doc.clone();
        newer.modified_at = chrono::Utc::now().timestamp_millis() + 60_000;
        session.insert_node(&newer, None, Some(b"v2"));

        let report = engine.sync().await.unwrap();
        assert_eq!(report.downloaded, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_flag_forces_redownload() {
        let (session, db, engine, _tmp) = setup().await;

        let doc = RemoteNode::document("report.pdf", 5);
        session.insert_node(&doc, None, Some(b"hello"));
        track_top_level(&db, &session, &doc).await;
        engine.sync().await.unwrap();

        let id = doc.id;
        db.with_db(move |db| SqliteSyncNodeStore::new(db.connection()).mark_for_reload(&id))
            .await
            .unwrap();

        let report = engine.sync().await.unwrap();
        assert_eq!(report.downloaded, 1);
        assert_eq!(session.content_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_walks_folders_and_prunes_vanished_children() {
        let (session, db, engine, _tmp) = setup().await;

        let folder = RemoteNode::folder("Projects");
        let kept = RemoteNode::document("kept.txt", 4);
        let gone = RemoteNode::document("gone.txt", 4);
        session.insert_node(&folder, None, None);
        session.insert_node(&kept, Some(&folder.id), Some(b"keep"));
        session.insert_node(&gone, Some(&folder.id), Some(b"gone"));
        track_top_level(&db, &session, &folder).await;

        let report = engine.sync().await.unwrap();
        assert_eq!(report.downloaded, 2);
        assert_eq!(stored(&db, kept.id).await.unwrap().parent_id, Some(folder.id));

        session.delete_node(&gone.id);
        let report = engine.sync().await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(stored(&db, gone.id).await.is_none());
        assert!(stored(&db, kept.id).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_and_clears_failures() {
        let (session, db, engine, _tmp) = setup().await;

        let doc = RemoteNode::document("flaky.txt", 4);
        session.insert_node(&doc, None, Some(b"data"));
        session.fail_content_for(&doc.id);
        track_top_level(&db, &session, &doc).await;

        let report = engine.sync().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.downloaded, 0);

        let id = doc.id;
        let failure = db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).failure(&id))
            .await
            .unwrap();
        assert!(failure.is_some());

        session.restore_content_for(&doc.id);
        let report = engine.sync().await.unwrap();
        assert_eq!(report.downloaded, 1);

        let failure = db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).failure(&id))
            .await
            .unwrap();
        assert!(failure.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_folder_listing_failure_is_recorded() {
        let (session, db, engine, _tmp) = setup().await;

        let folder = RemoteNode::folder("Projects");
        session.insert_node(&folder, None, None);
        session.fail_children_for(&folder.id);
        track_top_level(&db, &session, &folder).await;

        let report = engine.sync().await.unwrap();
        assert_eq!(report.failed, 1);

        let id = folder.id;
        let failure = db
            .with_db(move |db| SqliteSyncNodeStore::new(db.connection()).failure(&id))
            .await
            .unwrap();
        assert!(failure.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pushes_unfavorited_edits_and_drops_record() {
        let (session, db, engine, tmp) = setup().await;

        let doc = RemoteNode::document("draft.txt", 5);
        session.insert_node(&doc, None, Some(b"original"));
        track_top_level(&db, &session, &doc).await;
        engine.sync().await.unwrap();

        let record = stored(&db, doc.id).await.unwrap();
        let cached = tmp.path().join(record.content_path.clone().unwrap());
        std::fs::write(&cached, b"edited locally").unwrap();

        let id = doc.id;
        db.with_db(move |db| {
            let store = SqliteSyncNodeStore::new(db.connection());
            store.set_top_level(&id, false)?;
            store.set_unfavorited_has_local_changes(&id, true)
        })
        .await
        .unwrap();

        let report = engine.sync().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(session.uploads(), vec![(doc.id, b"edited locally".to_vec())]);
        assert!(stored(&db, doc.id).await.is_none());
        assert!(!cached.exists());
    }
}
