//! Favorite-status manager.
//!
//! Mediates favorite and unfavorite operations against the remote session
//! and mirrors the outcome into the local sync-node store. Every operation
//! is asynchronous and cancellable through the returned [`Request`] handle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{SqliteSyncNodeStore, SyncNodeStore};
use crate::error::Result;
use crate::models::{NodeId, RemoteNode, RepositoryId, SyncNode};
use crate::request::Request;
use crate::services::DatabaseService;
use crate::session::Session;
use crate::sync::local_changes;

/// Favorites listing primed by the last full fetch
struct FavoriteCache {
    nodes: Vec<RemoteNode>,
    ids: HashSet<NodeId>,
}

impl FavoriteCache {
    fn new(nodes: Vec<RemoteNode>) -> Self {
        let ids = nodes.iter().map(|node| node.id).collect();
        Self { nodes, ids }
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, node: RemoteNode) {
        if self.ids.insert(node.id) {
            self.nodes.push(node);
        } else if let Some(existing) = self.nodes.iter_mut().find(|entry| entry.id == node.id) {
            *existing = node;
        }
    }

    fn remove(&mut self, id: &NodeId) {
        if self.ids.remove(id) {
            self.nodes.retain(|node| node.id != *id);
        }
    }
}

/// Mediates favorite/unfavorite operations and favorite-listing queries.
///
/// Constructed once per session by [`crate::services::Client`]; operations
/// return immediately with a [`Request`] handle that can be awaited for the
/// outcome or cancelled.
pub struct FavoriteManager {
    session: Arc<dyn Session>,
    db: DatabaseService,
    content_dir: PathBuf,
    repository_id: RepositoryId,
    cache: Arc<Mutex<Option<FavoriteCache>>>,
}

impl FavoriteManager {
    /// Create a manager bound to a session, store, and content directory
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
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Mark `node` as a favorite.
    ///
    /// On success the node is tracked as a top-level sync entry and the
    /// cached listing picks it up. Resolves to `true` once both sides agree.
    pub fn add(&self, node: &RemoteNode) -> Request<bool> {
        let session = Arc::clone(&self.session);
        let db = self.db.clone();
        let cache = Arc::clone(&self.cache);
        let repository_id = self.repository_id.clone();
        let node = node.clone();

        Request::spawn(async move {
            session.add_favorite(&node.id).await?;

            let stored = node.clone();
            db.with_db(move |db| {
                let store = SqliteSyncNodeStore::new(db.connection());
                let mut record = store
                    .get(&stored.id)?
                    .unwrap_or_else(|| SyncNode::from_remote(&stored, repository_id));
                record.title = stored.name.clone();
                record.is_folder = stored.is_folder;
                record.is_top_level = true;
                record.unfavorited_has_local_changes = false;
                record.node = Some(stored);
                store.upsert(&record)
            })
            .await?;

            let mut guard = cache.lock().await;
            if let Some(cache) = guard.as_mut() {
                cache.insert(node.clone());
            }

            tracing::debug!(node = %node.id, "added favorite");
            Ok(true)
        })
    }

    /// Remove `node` from favorites.
    ///
    /// A record whose cached content carries un-pushed edits is kept with
    /// `unfavorited_has_local_changes` set so the next sync pass can push
    /// them first; otherwise the record and its subtree are dropped.
    pub fn remove(&self, node: &RemoteNode) -> Request<bool> {
        let session = Arc::clone(&self.session);
        let db = self.db.clone();
        let cache = Arc::clone(&self.cache);
        let content_dir = self.content_dir.clone();
        let node = node.clone();

        Request::spawn(async move {
            session.remove_favorite(&node.id).await?;

            let id = node.id;
            db.with_db(move |db| {
                let store = SqliteSyncNodeStore::new(db.connection());
                let Some(record) = store.get(&id)? else {
                    return Ok(());
                };
                release_record(&store, &record, &content_dir)
            })
            .await?;

            let mut guard = cache.lock().await;
            if let Some(cache) = guard.as_mut() {
                cache.remove(&node.id);
            }

            tracing::debug!(node = %node.id, "removed favorite");
            Ok(true)
        })
    }

    /// Query whether a node is currently favorited.
    ///
    /// Answered from the cached listing when primed; a cold cache triggers
    /// one full fetch that also primes it.
    pub fn is_favorite(&self, id: &NodeId) -> Request<bool> {
        let session = Arc::clone(&self.session);
        let db = self.db.clone();
        let cache = Arc::clone(&self.cache);
        let content_dir = self.content_dir.clone();
        let repository_id = self.repository_id.clone();
        let id = *id;

        Request::spawn(async move {
            {
                let guard = cache.lock().await;
                if let Some(cache) = guard.as_ref() {
                    return Ok(cache.contains(&id));
                }
            }

            let nodes =
                refresh_favorites(&session, &db, &content_dir, &repository_id, &cache).await?;
            Ok(nodes.iter().any(|node| node.id == id))
        })
    }

    /// Fetch the user's top-level favorite nodes.
    ///
    /// Serves the cached listing unless `ignore_cache` forces a refetch. A
    /// fetch persists every favorite as a top-level sync node and reconciles
    /// records that are no longer favorited.
    pub fn top_level(&self, ignore_cache: bool) -> Request<Vec<RemoteNode>> {
        let session = Arc::clone(&self.session);
        let db = self.db.clone();
        let cache = Arc::clone(&self.cache);
        let content_dir = self.content_dir.clone();
        let repository_id = self.repository_id.clone();

        Request::spawn(async move {
            if !ignore_cache {
                let guard = cache.lock().await;
                if let Some(cache) = guard.as_ref() {
                    return Ok(cache.nodes.clone());
                }
            }

            refresh_favorites(&session, &db, &content_dir, &repository_id, &cache).await
        })
    }
}

/// Fetch the favorites listing, mirror it into the store, and prime the cache
async fn refresh_favorites(
    session: &Arc<dyn Session>,
    db: &DatabaseService,
    content_dir: &Path,
    repository_id: &RepositoryId,
    cache: &Mutex<Option<FavoriteCache>>,
) -> Result<Vec<RemoteNode>> {
    let nodes = session.favorites().await?;

    let stored = nodes.clone();
    let repository_id = repository_id.clone();
    let content_dir = content_dir.to_path_buf();
    db.with_db(move |db| {
        let store = SqliteSyncNodeStore::new(db.connection());
        let fetched: HashSet<NodeId> = stored.iter().map(|node| node.id).collect();

        for node in stored {
            let mut record = store
                .get(&node.id)?
                .unwrap_or_else(|| SyncNode::from_remote(&node, repository_id.clone()));
            record.title = node.name.clone();
            record.is_folder = node.is_folder;
            record.is_top_level = true;
            record.unfavorited_has_local_changes = false;
            record.node = Some(node);
            store.upsert(&record)?;
        }

        for record in store.top_level(&repository_id)? {
            if !fetched.contains(&record.id) {
                release_record(&store, &record, &content_dir)?;
            }
        }

        Ok(())
    })
    .await?;

    let mut guard = cache.lock().await;
    *guard = Some(FavoriteCache::new(nodes.clone()));

    tracing::debug!(count = nodes.len(), "refreshed favorites listing");
    Ok(nodes)
}

/// Drop an unfavorited record, or retain it when local edits still need a push
fn release_record(
    store: &SqliteSyncNodeStore<'_>,
    record: &SyncNode,
    content_dir: &Path,
) -> Result<()> {
    if local_changes(record, content_dir)? {
        store.set_top_level(&record.id, false)?;
        store.set_unfavorited_has_local_changes(&record.id, true)
    } else {
        store.remove(&record.id)
    }
}
