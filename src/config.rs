#![forbid(unsafe_code)]

// Run configuration. Every pacing value that was ever tuned between runs
// (batch size, delays, retry budget, timeouts) lives here rather than as a
// constant inside the engine.

use crate::population::ClassCounts;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the population is dispatched against the meeting. Unconstrained
/// parallelism is deliberately not offered; every strategy throttles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum LaunchPolicy {
    /// One client at a time, fixed delay between launches.
    Sequential {
        #[serde(with = "duration_ms")]
        client_delay: Duration,
    },
    /// Batches of `batch_size`, sequential inside a batch with a short
    /// per-client delay, longer delay between batches.
    Batched {
        batch_size: usize,
        #[serde(with = "duration_ms")]
        client_delay: Duration,
        #[serde(with = "duration_ms")]
        batch_delay: Duration,
    },
    /// Batches of `batch_size` launched concurrently; the whole batch must
    /// reach a terminal state before the next one starts.
    Parallel { batch_size: usize },
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        LaunchPolicy::Batched {
            batch_size: 5,
            client_delay: Duration::from_secs(2),
            batch_delay: Duration::from_secs(10),
        }
    }
}

/// Whether a lingering confirmation overlay fails the client or is merely
/// logged. Both behaviors exist in the wild; make the choice explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModalPolicy {
    /// Retry the dismissal wait; a still-present overlay after the retry
    /// budget is a hard failure for this client.
    RetryThenFail,
    /// Wait once; if the overlay is still there, log and carry on.
    BestEffort,
}

/// Per-step wait timeouts for the join sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTimeouts {
    /// Navigation to the join URL, up to network-idle.
    #[serde(with = "duration_ms")]
    pub navigation: Duration,
    /// Any element visibility wait.
    #[serde(with = "duration_ms")]
    pub element: Duration,
    /// One attempt at waiting for the confirmation overlay to clear.
    #[serde(with = "duration_ms")]
    pub modal: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            element: Duration::from_secs(90),
            modal: Duration::from_secs(10),
        }
    }
}

/// Everything the join state machine needs besides the client itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSettings {
    pub timeouts: StepTimeouts,
    pub retry: RetryPolicy,
    pub modal_policy: ModalPolicy,
    /// Selector for the transient confirmation overlay shown after picking
    /// an audio mode.
    pub modal_selector: String,
    /// Settle time between clicking "share webcam" and the camera options
    /// list starting to populate.
    #[serde(with = "duration_ms")]
    pub webcam_settle: Duration,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            timeouts: StepTimeouts::default(),
            retry: RetryPolicy::default(),
            modal_policy: ModalPolicy::RetryThenFail,
            modal_selector: ".ReactModal__Overlay".to_string(),
            webcam_settle: Duration::from_secs(2),
        }
    }
}

/// Everything needed to execute one load run. Read-only input to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    pub meeting_id: String,
    pub class_counts: ClassCounts,
    /// How long joined clients stay connected after the last batch resolves.
    #[serde(with = "duration_ms")]
    pub hold: Duration,
    pub policy: LaunchPolicy,
    pub join: JoinSettings,
}

impl RunSpec {
    pub fn new(meeting_id: impl Into<String>, class_counts: ClassCounts) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            class_counts,
            hold: Duration::from_secs(60),
            policy: LaunchPolicy::default(),
            join: JoinSettings::default(),
        }
    }
}

/// Serialize `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
