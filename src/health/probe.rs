// ABOUTME: Probe trait answering pass/fail for a single endpoint.
// ABOUTME: Ships a TCP connect probe; other protocols plug in through the trait.

use async_trait::async_trait;

use crate::types::Endpoint;

#[derive(Debug, Clone, thiserror::Error)]
#[error("probe of {endpoint} failed: {reason}")]
pub struct ProbeError {
    pub endpoint: String,
    pub reason: String,
}

impl ProbeError {
    pub fn new(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single health check against one endpoint.
///
/// The monitor enforces the per-probe timeout; implementations do not need to.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;
}

/// Passes when a TCP connection to the endpoint can be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        tokio::net::TcpStream::connect((endpoint.host(), endpoint.port()))
            .await
            .map(drop)
            .map_err(|e| ProbeError::new(endpoint, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_probe_passes_against_listening_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = TcpProbe.check(&Endpoint::new("127.0.0.1", port)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn tcp_probe_fails_against_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpProbe
            .check(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(err.endpoint.ends_with(&port.to_string()));
    }
}
