//! HTTP session used by search connections

use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::models::{SearchError, SearchResult};

/// Minimal HTTP reply: status code and body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of a connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a GET request, failing with a transport error on timeout or
    /// connection failure. Non-2xx replies are returned, not raised.
    async fn get(&self, url: &str, timeout: Duration) -> SearchResult<HttpReply>;

    /// Release any held resources. Must be safe to call more than once.
    fn close(&self) {}
}

/// Who is responsible for closing a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOwnership {
    /// Created lazily by the connection and closed by it
    Owned,
    /// Supplied by the caller; never closed by the connection
    Borrowed,
}

/// reqwest-backed session
pub struct HttpSession {
    ownership: SessionOwnership,
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpSession {
    /// A session the connection opens on first use and closes itself
    pub fn owned() -> Self {
        Self {
            ownership: SessionOwnership::Owned,
            client: RwLock::new(None),
        }
    }

    /// Wrap a caller-supplied client, e.g. one configured with a TLS client
    /// certificate. It is never closed by the connection.
    pub fn borrowed(client: reqwest::Client) -> Self {
        Self {
            ownership: SessionOwnership::Borrowed,
            client: RwLock::new(Some(client)),
        }
    }

    pub fn ownership(&self) -> SessionOwnership {
        self.ownership
    }

    /// Whether a client is currently held
    pub fn is_open(&self) -> bool {
        self.client.read().is_some()
    }

    fn acquire(&self) -> SearchResult<reqwest::Client> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("esgf-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::transport(format!("Failed to create HTTP client: {}", e)))?;
        debug!("Opened HTTP session");
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpSession {
    async fn get(&self, url: &str, timeout: Duration) -> SearchResult<HttpReply> {
        let client = self.acquire()?;

        let response = client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpReply { status, body })
    }

    fn close(&self) {
        if self.ownership == SessionOwnership::Borrowed {
            return;
        }
        if self.client.write().take().is_some() {
            debug!("Closed HTTP session");
        }
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("ownership", &self.ownership)
            .field("open", &self.is_open())
            .finish()
    }
}
