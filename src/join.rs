#![forbid(unsafe_code)]

// The join sequence: the ordered steps one simulated client walks through
// before it counts as a participant. Selectors match the BigBlueButton HTML5
// client. Every wait is wrapped by the shared retry policy; failures carry
// the step they died in.

use crate::config::{JoinSettings, ModalPolicy};
use crate::driver::{DriverError, PageContext};
use crate::population::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

const AUDIO_MICROPHONE: &str = r#"[aria-label="Microphone"]"#;
const AUDIO_LISTEN_ONLY: &str = r#"[aria-label="Listen only"]"#;
const MUTE_TOGGLE: &str = r#"[aria-label="Mute"],[aria-label="Unmute"]"#;
const UNMUTE: &str = r#"[aria-label="Unmute"]"#;
const SHARE_WEBCAM: &str = r#"[aria-label="Share webcam"]"#;
const WEBCAM_OPTIONS: &str = "#setCam > option";
const START_SHARING: &str = r#"[aria-label="Start sharing"]"#;

/// Steps of the join sequence, in required order. `EnsureUnmuted` runs only
/// for audio clients, `ShareWebcam` only for camera clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinStep {
    Navigate,
    AwaitAudioPrompt,
    SelectAudioMode,
    DismissModal,
    EnsureUnmuted,
    ShareWebcam,
}

impl JoinStep {
    pub fn name(self) -> &'static str {
        match self {
            JoinStep::Navigate => "navigate",
            JoinStep::AwaitAudioPrompt => "awaitAudioPrompt",
            JoinStep::SelectAudioMode => "selectAudioMode",
            JoinStep::DismissModal => "dismissModal",
            JoinStep::EnsureUnmuted => "ensureUnmuted",
            JoinStep::ShareWebcam => "shareWebcam",
        }
    }
}

impl std::fmt::Display for JoinStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal failure of one client's join sequence.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct StepFailure {
    pub step: JoinStep,
    #[source]
    pub source: DriverError,
}

impl StepFailure {
    fn new(step: JoinStep, source: DriverError) -> Self {
        Self { step, source }
    }
}

/// Drives `page` through the full join sequence for `client`. Returns only
/// once the client is a participant or has failed terminally; the caller
/// decides what to do with the page afterwards.
pub async fn run_join(
    page: &dyn PageContext,
    client: &ClientConfig,
    join_url: &str,
    settings: &JoinSettings,
) -> Result<(), StepFailure> {
    let identity = client.identity.as_str();
    let retry = &settings.retry;
    let timeouts = &settings.timeouts;
    let started = tokio::time::Instant::now();

    let trace = |step: JoinStep| {
        debug!(client = identity, step = %step, elapsed_ms = started.elapsed().as_millis() as u64, "step");
    };

    trace(JoinStep::Navigate);
    retry
        .run("navigation", || page.goto(join_url, timeouts.navigation))
        .await
        .map_err(|e| StepFailure::new(JoinStep::Navigate, e))?;

    let audio_choice = if client.wants_audio {
        AUDIO_MICROPHONE
    } else {
        AUDIO_LISTEN_ONLY
    };

    trace(JoinStep::AwaitAudioPrompt);
    retry
        .run("audio prompt", || {
            page.wait_visible(audio_choice, timeouts.element)
        })
        .await
        .map_err(|e| StepFailure::new(JoinStep::AwaitAudioPrompt, e))?;

    trace(JoinStep::SelectAudioMode);
    page.click(audio_choice)
        .await
        .map_err(|e| StepFailure::new(JoinStep::SelectAudioMode, e))?;

    trace(JoinStep::DismissModal);
    dismiss_modal(page, identity, settings).await?;

    if client.wants_audio {
        trace(JoinStep::EnsureUnmuted);
        ensure_unmuted(page, identity, retry, timeouts.element).await?;
    }

    if client.wants_video {
        trace(JoinStep::ShareWebcam);
        share_webcam(page, identity, settings).await?;
    }

    debug!(client = identity, elapsed_ms = started.elapsed().as_millis() as u64, "join sequence complete");
    Ok(())
}

/// Waits out the transient confirmation overlay. This is the flakiest wait
/// in the whole sequence, so whether exhaustion is fatal is a named policy.
async fn dismiss_modal(
    page: &dyn PageContext,
    identity: &str,
    settings: &JoinSettings,
) -> Result<(), StepFailure> {
    let selector = settings.modal_selector.as_str();
    let modal_timeout = settings.timeouts.modal;

    match settings.modal_policy {
        ModalPolicy::RetryThenFail => settings
            .retry
            .run("modal dismissal", || page.wait_gone(selector, modal_timeout))
            .await
            .map_err(|e| StepFailure::new(JoinStep::DismissModal, e)),
        ModalPolicy::BestEffort => {
            if let Err(e) = page.wait_gone(selector, modal_timeout).await {
                warn!(client = identity, error = %e, "overlay still present, continuing");
            }
            Ok(())
        }
    }
}

/// Waits for the mute toggle, then unmutes if the client came up muted.
/// A toggle that never appears is fatal; a failed unmute click is not —
/// a muted participant still holds its slot in the meeting.
async fn ensure_unmuted(
    page: &dyn PageContext,
    identity: &str,
    retry: &crate::retry::RetryPolicy,
    element_timeout: Duration,
) -> Result<(), StepFailure> {
    retry
        .run("mute toggle", || {
            page.wait_visible(MUTE_TOGGLE, element_timeout)
        })
        .await
        .map_err(|e| StepFailure::new(JoinStep::EnsureUnmuted, e))?;

    match page.is_present(UNMUTE).await {
        Ok(true) => {
            debug!(client = identity, "unmuting");
            if let Err(e) = page.click(UNMUTE).await {
                warn!(client = identity, error = %e, "unmute click failed, staying muted");
            }
        }
        Ok(false) => {}
        Err(e) => {
            warn!(client = identity, error = %e, "unmute probe failed, staying muted");
        }
    }
    Ok(())
}

/// Share webcam: click, let the device list settle, wait for camera options
/// to populate, then start sharing.
async fn share_webcam(
    page: &dyn PageContext,
    identity: &str,
    settings: &JoinSettings,
) -> Result<(), StepFailure> {
    let retry = &settings.retry;
    let element_timeout = settings.timeouts.element;
    let fail = |e| StepFailure::new(JoinStep::ShareWebcam, e);

    retry
        .run("share webcam button", || {
            page.wait_visible(SHARE_WEBCAM, element_timeout)
        })
        .await
        .map_err(fail)?;
    page.click(SHARE_WEBCAM).await.map_err(fail)?;

    sleep(settings.webcam_settle).await;

    retry
        .run("camera options", || {
            page.wait_visible(WEBCAM_OPTIONS, element_timeout)
        })
        .await
        .map_err(fail)?;
    retry
        .run("start sharing button", || {
            page.wait_visible(START_SHARING, element_timeout)
        })
        .await
        .map_err(fail)?;

    debug!(client = identity, "starting webcam share");
    page.click(START_SHARING).await.map_err(fail)
}
