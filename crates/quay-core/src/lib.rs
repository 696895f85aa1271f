//! quay-core - Core library for quay
//!
//! This crate contains the persisted sync-node store, the favorite-status
//! manager, and the sync engine shared by all quay clients.

pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod models;
pub mod request;
pub mod services;
pub mod session;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{NodeId, RemoteNode, SyncNode};
