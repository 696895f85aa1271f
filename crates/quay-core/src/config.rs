//! Client configuration resolved from the environment.
//!
//! Values are read from `QUAY_*` environment variables; binaries load a
//! `.env` file first so development setups stay out of shell profiles.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Server base URL of the remote content repository
pub const ENV_SERVER_URL: &str = "QUAY_SERVER_URL";
/// Bearer token for the remote session
pub const ENV_AUTH_TOKEN: &str = "QUAY_AUTH_TOKEN";
/// Local database file path
pub const ENV_DB_PATH: &str = "QUAY_DB_PATH";
/// Directory for cached content files
pub const ENV_CONTENT_DIR: &str = "QUAY_CONTENT_DIR";

/// Runtime configuration for a quay client.
///
/// Only `server_url` and `auth_token` are required to open a session; the
/// paths have per-platform defaults chosen by the binary.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub content_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("db_path", &self.db_path)
            .field("content_dir", &self.content_dir)
            .finish()
    }
}

impl ClientConfig {
    /// Resolve configuration from `QUAY_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server_url: normalize_text_option(std::env::var(ENV_SERVER_URL).ok()),
            auth_token: normalize_text_option(std::env::var(ENV_AUTH_TOKEN).ok()),
            db_path: std::env::var_os(ENV_DB_PATH).map(PathBuf::from),
            content_dir: std::env::var_os(ENV_CONTENT_DIR).map(PathBuf::from),
        }
    }

    /// Whether enough is configured to open a remote session
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let valid_url = self
            .server_url
            .as_deref()
            .is_some_and(is_http_url);
        valid_url && self.auth_token.is_some()
    }
}
