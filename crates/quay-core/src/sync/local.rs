//! Local-change detection for cached content

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::SyncNode;

/// Whether the cached content file for `node` has been modified since the
/// last recorded download.
///
/// Records without a completed download, and records whose cached file is
/// gone, have nothing to push and report `false`.
pub fn local_changes(node: &SyncNode, content_dir: &Path) -> Result<bool> {
    let (Some(last_downloaded_at), Some(content_path)) =
        (node.last_downloaded_at, node.content_path.as_deref())
    else {
        return Ok(false);
    };

    let path = content_dir.join(content_path);
    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error.into()),
    };

    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(modified.timestamp_millis() > last_downloaded_at)
}
