//! Service-layer context objects shared by clients

mod client;
mod database;

pub use client::Client;
pub use database::DatabaseService;
