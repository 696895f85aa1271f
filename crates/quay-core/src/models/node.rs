//! Remote node model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a remote node, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new unique node ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One item of the remote content repository, as reported by the session.
///
/// This is the value persisted alongside a sync node so offline clients can
/// render the item without a round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote identifier
    pub id: NodeId,
    /// Display name (file or folder name)
    pub name: String,
    /// Whether the item is a folder
    pub is_folder: bool,
    /// Remote last-modification timestamp (Unix ms)
    pub modified_at: i64,
    /// Content size in bytes, `None` for folders
    pub size_bytes: Option<u64>,
}

impl RemoteNode {
    /// Create a folder node with the given name
    #[must_use]
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            is_folder: true,
            modified_at: chrono::Utc::now().timestamp_millis(),
            size_bytes: None,
        }
    }

    /// Create a document node with the given name and content size
    #[must_use]
    pub fn document(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            is_folder: false,
            modified_at: chrono::Utc::now().timestamp_millis(),
            size_bytes: Some(size_bytes),
        }
    }
}
