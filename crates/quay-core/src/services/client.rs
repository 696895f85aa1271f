//! Client context assembled once at startup.

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::{RepositoryStore, SqliteRepositoryStore};
use crate::error::Result;
use crate::favorites::FavoriteManager;
use crate::services::DatabaseService;
use crate::session::Session;
use crate::sync::SyncEngine;

/// Explicit context object wiring the store, session, favorites manager,
/// and sync engine together.
///
/// Constructed once at process start and passed by reference to whatever
/// needs these capabilities; there is no process-global shared manager.
pub struct Client {
    db: DatabaseService,
    session: Arc<dyn Session>,
    favorites: FavoriteManager,
    sync: SyncEngine,
}

impl Client {
    /// Assemble a client: registers the session's repository in the store
    /// and creates the content directory if needed.
    pub async fn new(
        db: DatabaseService,
        session: Arc<dyn Session>,
        content_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let content_dir = content_dir.into();
        std::fs::create_dir_all(&content_dir)?;

        let repository_id = session.repository_id();
        db.with_db(move |db| {
            SqliteRepositoryStore::new(db.connection())
                .get_or_create(&repository_id, repository_id.as_str())
                .map(|_| ())
        })
        .await?;

        let favorites = FavoriteManager::new(Arc::clone(&session), db.clone(), content_dir.clone());
        let sync = SyncEngine::new(Arc::clone(&session), db.clone(), content_dir);

        Ok(Self {
            db,
            session,
            favorites,
            sync,
        })
    }

    /// The favorites manager
    pub const fn favorites(&self) -> &FavoriteManager {
        &self.favorites
    }

    /// The sync engine
    pub const fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    /// The shared database service
    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    /// The remote session
    pub fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.session)
    }
}
