//! Sync failure model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::NodeId;
use crate::error::Error;

/// Broad classification of what interrupted a node's last sync attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCode {
    /// Transport-level failure reaching the server
    Network,
    /// The server answered with an error
    #[default]
    Remote,
    /// The payload could not be decoded
    Content,
    /// Local filesystem failure while writing or reading cached content
    Io,
}

impl FailureCode {
    /// Stable text form used in the persisted store
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Remote => "remote",
            Self::Content => "content",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "remote" => Ok(Self::Remote),
            "content" => Ok(Self::Content),
            "io" => Ok(Self::Io),
            other => Err(format!("unknown failure code: {other}")),
        }
    }
}

/// The most recent failed sync attempt for one node.
///
/// At most one per node; cleared by the next successful pass over that node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// The node whose sync attempt failed
    pub node_id: NodeId,
    /// Failure classification
    pub code: FailureCode,
    /// Human-readable description
    pub description: String,
    /// When the attempt failed (Unix ms)
    pub failed_at: i64,
}

impl SyncFailure {
    /// Create a failure record stamped with the current time
    #[must_use]
    pub fn new(node_id: NodeId, code: FailureCode, description: impl Into<String>) -> Self {
        Self {
            node_id,
            code,
            description: description.into(),
            failed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Classify a core error into a persisted failure record
    #[must_use]
    pub fn from_error(node_id: NodeId, error: &Error) -> Self {
        let code = match error {
            Error::Http(_) => FailureCode::Network,
            Error::Io(_) => FailureCode::Io,
            Error::Serialization(_) => FailureCode::Content,
            _ => FailureCode::Remote,
        };
        Self::new(node_id, code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_code_round_trip() {
        for code in [
            FailureCode::Network,
            FailureCode::Remote,
            FailureCode::Content,
            FailureCode::Io,
        ] {
            assert_eq!(code.as_str().parse::<FailureCode>().unwrap(), code);
        }
    }

    #[test]
    fn test_failure_code_rejects_unknown() {
        assert!("gremlins".parse::<FailureCode>().is_err());
    }

    #[test]
    fn test_from_error_classifies_io() {
        let node_id = NodeId::new();
        let error = Error::Io(std::io::Error::other("disk full"));
        let failure = SyncFailure::from_error(node_id, &error);
        assert_eq!(failure.code, FailureCode::Io);
        assert_eq!(failure.node_id, node_id);
        assert!(failure.description.contains("disk full"));
        assert!(failure.failed_at > 0);
    }

    #[test]
    fn test_from_error_defaults_to_remote() {
        let failure = SyncFailure::from_error(NodeId::new(), &Error::Remote("HTTP 503".into()));
        assert_eq!(failure.code, FailureCode::Remote);
    }
}
