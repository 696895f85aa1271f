//! Data models for quay

mod node;
mod repository;
mod sync_error;
mod sync_node;

pub use node::{NodeId, RemoteNode};
pub use repository::{Repository, RepositoryId};
pub use sync_error::{FailureCode, SyncFailure};
pub use sync_node::SyncNode;
