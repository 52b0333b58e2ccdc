#![forbid(unsafe_code)]

// Control-plane interface to the meeting server.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConferenceError {
    #[error("meeting server request failed: {0}")]
    Request(String),

    #[error("meeting server rejected the call: {0}")]
    Rejected(String),

    #[error("malformed meeting server response: {0}")]
    Malformed(String),
}

/// Resolves meeting credentials and per-client join endpoints. A failed
/// password fetch aborts the run before any client launches; a failed join
/// URL is scoped to the one client asking for it.
#[async_trait]
pub trait ConferenceClient: Send + Sync {
    async fn moderator_password(&self, meeting_id: &str) -> Result<String, ConferenceError>;

    fn join_url(
        &self,
        identity: &str,
        meeting_id: &str,
        password: &str,
    ) -> Result<String, ConferenceError>;
}
