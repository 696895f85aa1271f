//! Repository model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remote content repository (a normalized server address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Create a repository ID from an account or server identity
    ///
    /// The value is trimmed; repository identities are compared verbatim.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote repository known to the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identity
    pub id: RepositoryId,
    /// Server base URL
    pub base_url: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Repository {
    /// Create a new repository record
    #[must_use]
    pub fn new(id: RepositoryId, base_url: impl Into<String>) -> Self {
        Self {
            id,
            base_url: base_url.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_id_trims() {
        let id = RepositoryId::new("  https://cm.example.com  ");
        assert_eq!(id.as_str(), "https://cm.example.com");
    }

    #[test]
    fn test_repository_new() {
        let repo = Repository::new(RepositoryId::new("https://cm.example.com"), "https://cm.example.com");
        assert_eq!(repo.base_url, "https://cm.example.com");
        assert!(repo.created_at > 0);
    }
}
