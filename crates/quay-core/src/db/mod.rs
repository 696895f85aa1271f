//! Database layer for quay

mod connection;
mod migrations;
mod node_store;
mod repository_store;

pub use connection::Database;
pub use node_store::{SqliteSyncNodeStore, SyncNodeStore};
pub use repository_store::{RepositoryStore, SqliteRepositoryStore};
