use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a successful remote invocation. The queue does not interpret the
/// body beyond the optional server-assigned `id` used for temp-ID
/// reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub data: serde_json::Value,
}

impl RemoteResponse {
    /// Server-assigned id, when the backend returns one.
    pub fn server_id(&self) -> Option<&str> {
        self.data.get("id").and_then(serde_json::Value::as_str)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote rejected operation: {0}")]
    Rejected(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl RemoteError {
    /// Validation failures are programmer errors; retrying cannot fix them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Rejected(_))
    }
}

/// Opaque named-operation invocation against the backend. The concrete
/// transport (serverless function calls in production) lives in the host app.
#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn invoke(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<RemoteResponse, RemoteError>;
}
