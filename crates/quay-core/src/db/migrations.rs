//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: i32 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if exists == 0 {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: repositories and the sync-node arena
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS repositories (
             id TEXT PRIMARY KEY,
             base_url TEXT NOT NULL,
             created_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS sync_nodes (
             id TEXT PRIMARY KEY,
             title TEXT NOT NULL,
             is_folder INTEGER NOT NULL DEFAULT 0,
             is_top_level INTEGER NOT NULL DEFAULT 0,
             unfavorited_has_local_changes INTEGER NOT NULL DEFAULT 0,
             reload_content INTEGER NOT NULL DEFAULT 0,
             last_downloaded_at INTEGER,
             content_path TEXT,
             node TEXT,
             parent_id TEXT REFERENCES sync_nodes(id) ON DELETE CASCADE,
             repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE
         );
         CREATE INDEX IF NOT EXISTS idx_sync_nodes_parent ON sync_nodes(parent_id);
         CREATE INDEX IF NOT EXISTS idx_sync_nodes_repository ON sync_nodes(repository_id);
         CREATE INDEX IF NOT EXISTS idx_sync_nodes_top_level ON sync_nodes(is_top_level);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: per-node sync failure records
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS sync_failures (
             node_id TEXT PRIMARY KEY REFERENCES sync_nodes(id) ON DELETE CASCADE,
             code TEXT NOT NULL,
             description TEXT NOT NULL,
             failed_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_sync_failures_failed_at ON sync_failures(failed_at DESC);
         INSERT INTO schema_version (version) VALUES (2);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
