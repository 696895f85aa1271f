//! Sync node model

use serde::{Deserialize, Serialize};

use super::{NodeId, RemoteNode, RepositoryId};

/// A locally tracked record of one remote item selected for offline sync.
///
/// Records form an arena keyed by the remote node id: each row stores an
/// optional `parent_id` back-reference, and child sets are derived by
/// indexing on that column rather than stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNode {
    /// Unique identifier, equal to the remote node's id
    pub id: NodeId,
    /// Display title
    pub title: String,
    /// Whether the item is a folder
    pub is_folder: bool,
    /// Root of its own synced subtree (not nested under another synced folder)
    pub is_top_level: bool,
    /// The item was unfavorited while local edits were still un-pushed;
    /// the record stays until those edits are uploaded
    pub unfavorited_has_local_changes: bool,
    /// Dirty flag forcing a re-download on the next sync pass
    pub reload_content: bool,
    /// When content was last downloaded (Unix ms), `None` before the first download
    pub last_downloaded_at: Option<i64>,
    /// Cached content file path, relative to the content directory.
    /// Set if and only if `last_downloaded_at` is set.
    pub content_path: Option<String>,
    /// Last known remote representation
    pub node: Option<RemoteNode>,
    /// Parent sync node, `None` for top-level entries
    pub parent_id: Option<NodeId>,
    /// Owning repository
    pub repository_id: RepositoryId,
}

impl SyncNode {
    /// Seed a record from a remote node: nothing downloaded, all flags clear.
    #[must_use]
    pub fn from_remote(remote: &RemoteNode, repository_id: RepositoryId) -> Self {
        Self {
            id: remote.id,
            title: remote.name.clone(),
            is_folder: remote.is_folder,
            is_top_level: false,
            unfavorited_has_local_changes: false,
            reload_content: false,
            last_downloaded_at: None,
            content_path: None,
            node: Some(remote.clone()),
            parent_id: None,
            repository_id,
        }
    }

    /// Whether content has been downloaded for this record
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.last_downloaded_at.is_some() && self.content_path.is_some()
    }

    /// Whether the next sync pass should fetch content for this record.
    ///
    /// Folders carry no content. Documents need a download when the dirty
    /// flag is set, when nothing was downloaded yet, or when the remote
    /// modification stamp is newer than the last download.
    #[must_use]
    pub fn needs_download(&self, remote_modified_at: i64) -> bool {
        if self.is_folder {
            return false;
        }
        if self.reload_content {
            return true;
        }
        match self.last_downloaded_at {
            None => true,
            Some(downloaded_at) => remote_modified_at > downloaded_at,
        }
    }
}
