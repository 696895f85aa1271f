//! Sync machinery keeping cached content in step with the remote repository

mod engine;
mod local;

pub use engine::{SyncEngine, SyncReport};
pub use local::local_changes;
