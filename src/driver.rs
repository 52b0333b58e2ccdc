#![forbid(unsafe_code)]

// Interface to the UI automation layer (puppeteer, chromiumoxide, ...).
// The harness never talks to a browser directly; everything goes through
// these traits so the engine can be exercised against fakes.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the automation layer. Timeouts are distinguished from
/// everything else because the retry policy reports them differently, but
/// both kinds are eligible for retry.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("driver error: {0}")]
    Driver(String),
}

impl DriverError {
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Launches the shared automation session. One session serves the whole run;
/// the orchestrator owns it and clients only open isolated contexts in it.
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, DriverError>;
}

/// A running automation session (a browser process, typically).
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opens an isolated execution context (a fresh page/tab). Contexts do
    /// not share state, so one client's failure cannot corrupt another's.
    async fn open_context(&self) -> Result<Box<dyn PageContext>, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// One client's isolated page. Methods take `&self`; implementations keep
/// their mutable state behind interior mutability so waits can be retried
/// without exclusive borrows.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Navigate and wait for the network to go substantially idle.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait for an element matching `selector` to become visible.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait for every element matching `selector` to be gone.
    async fn wait_gone(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Non-blocking presence probe.
    async fn is_present(&self, selector: &str) -> Result<bool, DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinguishable() {
        let t = DriverError::timeout("selector", Duration::from_secs(5));
        assert!(t.is_timeout());
        assert!(!DriverError::Driver("boom".into()).is_timeout());
    }

    #[test]
    fn test_timeout_message_names_the_wait() {
        let t = DriverError::timeout("[aria-label=\"Microphone\"]", Duration::from_secs(90));
        let msg = t.to_string();
        assert!(msg.contains("Microphone"));
        assert!(msg.contains("90"));
    }
}
