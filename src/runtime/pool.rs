use super::NetworkPool;
use crate::error::SyncError;
use std::time::Duration;

/// HTTP connection pool backed by a `reqwest` client.
///
/// Idle connections are kept for the keep-alive timeout. Closing drops the
/// client, which drops every pooled connection with it.
#[derive(Debug)]
pub struct HttpPool {
    client: Option<reqwest::Client>,
    keep_alive: Duration,
}

impl HttpPool {
    pub fn new(keep_alive: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(keep_alive)
            .tcp_keepalive(keep_alive)
            .build()
            .map_err(|e| SyncError::Context(format!("Failed to create HTTP pool: {}", e)))?;

        Ok(Self {
            client: Some(client),
            keep_alive,
        })
    }

    /// Client for requests issued inside the session; `None` once closed
    pub fn client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref()
    }
}

impl NetworkPool for HttpPool {
    fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!("Closed HTTP pool");
        }
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}
