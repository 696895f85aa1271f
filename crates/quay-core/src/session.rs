//! Remote content-repository session boundary.
//!
//! `Session` is the authenticated access the favorites manager and the sync
//! engine consume; `HttpSession` talks to a JSON REST surface over HTTPS.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{NodeId, RemoteNode, RepositoryId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Authenticated access to a remote content repository.
///
/// Only the operations the local store, favorites manager, and sync engine
/// consume; not a full SDK surface.
#[async_trait]
pub trait Session: Send + Sync {
    /// Identity of the repository this session talks to
    fn repository_id(&self) -> RepositoryId;

    /// Fetch one node's current remote state
    async fn node(&self, id: &NodeId) -> Result<RemoteNode>;

    /// List the children of a folder
    async fn children(&self, id: &NodeId) -> Result<Vec<RemoteNode>>;

    /// Download a document's content
    async fn content(&self, id: &NodeId) -> Result<Vec<u8>>;

    /// Push locally edited content back to the repository
    async fn update_content(&self, id: &NodeId, content: &[u8]) -> Result<()>;

    /// Mark a node as one of the user's favorites
    async fn add_favorite(&self, id: &NodeId) -> Result<()>;

    /// Remove a node from the user's favorites
    async fn remove_favorite(&self, id: &NodeId) -> Result<()>;

    /// Fetch the user's favorite nodes
    async fn favorites(&self) -> Result<Vec<RemoteNode>>;
}

/// HTTP implementation of [`Session`] against a JSON REST surface
pub struct HttpSession {
    base_url: String,
    auth_token: String,
    repository_id: RepositoryId,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSession")
            .field("base_url", &self.base_url)
            .field("auth_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSession {
    /// Create a session for the given server and bearer token.
    ///
    /// The base URL must include http:// or https:// and is normalized with
    /// the trailing slash stripped; that normalized URL doubles as the
    /// repository identity.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::InvalidInput("server URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "server URL must include http:// or https://".to_string(),
            ));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let auth_token = normalize_text_option(Some(auth_token.into()))
            .ok_or_else(|| Error::InvalidInput("auth token must not be empty".to_string()))?;

        Ok(Self {
            repository_id: RepositoryId::new(&base_url),
            base_url,
            auth_token,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Pass successful responses through; turn error responses into `Error::Remote`
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(parse_api_error(status, &body)))
}

#[async_trait]
impl Session for HttpSession {
    fn repository_id(&self) -> RepositoryId {
        self.repository_id.clone()
    }

    async fn node(&self, id: &NodeId) -> Result<RemoteNode> {
        let response = self
            .client
            .get(self.url(&format!("/api/nodes/{id}")))
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn children(&self, id: &NodeId) -> Result<Vec<RemoteNode>> {
        let response = self
            .client
            .get(self.url(&format!("/api/nodes/{id}/children")))
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn content(&self, id: &NodeId) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/api/nodes/{id}/content")))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;

        Ok(check(response).await?.bytes().await?.to_vec())
    }

    async fn update_content(&self, id: &NodeId, content: &[u8]) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/api/nodes/{id}/content")))
            .bearer_auth(&self.auth_token)
            .body(content.to_vec())
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn add_favorite(&self, id: &NodeId) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/favorites/{id}")))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn remove_favorite(&self, id: &NodeId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/favorites/{id}")))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn favorites(&self) -> Result<Vec<RemoteNode>> {
        let response = self
            .client
            .get(self.url("/api/favorites"))
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
