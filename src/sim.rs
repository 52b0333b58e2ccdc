#![forbid(unsafe_code)]

// Simulated driver and conference client. Lets the harness be exercised
// end to end (pacing, batching, retry, reporting) with no browser and no
// meeting server: every UI wait sleeps a configurable latency and fails
// with a configurable probability.

use crate::conference::{ConferenceClient, ConferenceError};
use crate::driver::{BrowserSession, DriverError, PageContext, UiDriver};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Latency of every simulated UI wait.
    pub step_latency: Duration,
    /// Probability in [0, 1] that any single wait times out.
    pub failure_rate: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_latency: Duration::from_millis(50),
            failure_rate: 0.0,
        }
    }
}

pub struct SimDriver {
    config: SimConfig,
}

impl SimDriver {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl UiDriver for SimDriver {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, DriverError> {
        sleep(self.config.step_latency).await;
        Ok(Arc::new(SimSession {
            config: self.config,
        }))
    }
}

struct SimSession {
    config: SimConfig,
}

#[async_trait]
impl BrowserSession for SimSession {
    async fn open_context(&self) -> Result<Box<dyn PageContext>, DriverError> {
        Ok(Box::new(SimPage {
            config: self.config,
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct SimPage {
    config: SimConfig,
}

impl SimPage {
    async fn simulated_wait(&self, what: &str) -> Result<(), DriverError> {
        sleep(self.config.step_latency).await;
        if rand::random::<f64>() < self.config.failure_rate {
            return Err(DriverError::timeout(what, self.config.step_latency));
        }
        Ok(())
    }
}

#[async_trait]
impl PageContext for SimPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.simulated_wait(url).await
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.simulated_wait(selector).await
    }

    async fn wait_gone(&self, selector: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.simulated_wait(selector).await
    }

    async fn is_present(&self, _selector: &str) -> Result<bool, DriverError> {
        // The simulated client never comes up muted.
        Ok(false)
    }

    async fn click(&self, _selector: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Conference fake with a fixed password and deterministic join URLs.
pub struct SimConference;

#[async_trait]
impl ConferenceClient for SimConference {
    async fn moderator_password(&self, _meeting_id: &str) -> Result<String, ConferenceError> {
        Ok("sim-moderator-pw".to_string())
    }

    fn join_url(
        &self,
        identity: &str,
        meeting_id: &str,
        _password: &str,
    ) -> Result<String, ConferenceError> {
        Ok(format!("sim://{meeting_id}/{identity}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LaunchPolicy, RunSpec};
    use crate::identity::RandomNameSource;
    use crate::orchestrator;
    use crate::population::ClassCounts;
    use crate::retry::RetryPolicy;

    #[tokio::test(start_paused = true)]
    async fn test_reliable_sim_run_joins_everyone() {
        let mut spec = RunSpec::new(
            "sim-meeting",
            ClassCounts {
                cameras: 2,
                microphones: 1,
                listeners: 2,
            },
        );
        spec.hold = Duration::from_millis(10);
        spec.policy = LaunchPolicy::Parallel { batch_size: 3 };
        spec.join.retry = RetryPolicy::new(2, Duration::from_millis(5));
        spec.join.webcam_settle = Duration::from_millis(5);

        let report = orchestrator::run(
            &spec,
            Arc::new(SimDriver::new(SimConfig {
                step_latency: Duration::from_millis(5),
                failure_rate: 0.0,
            })),
            Arc::new(SimConference),
            Arc::new(RandomNameSource::new()),
        )
        .await
        .unwrap();

        assert_eq!(report.total_clients, 5);
        assert_eq!(report.joined, 5);
        assert!(report.failures_by_step.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_sim_reports_every_client_failed() {
        let mut spec = RunSpec::new("sim-meeting", ClassCounts {
            cameras: 0,
            microphones: 0,
            listeners: 3,
        });
        spec.hold = Duration::from_millis(1);
        spec.policy = LaunchPolicy::Sequential {
            client_delay: Duration::from_millis(1),
        };
        spec.join.retry = RetryPolicy::new(2, Duration::from_millis(1));

        let report = orchestrator::run(
            &spec,
            Arc::new(SimDriver::new(SimConfig {
                step_latency: Duration::from_millis(1),
                failure_rate: 1.0,
            })),
            Arc::new(SimConference),
            Arc::new(RandomNameSource::new()),
        )
        .await
        .unwrap();

        assert_eq!(report.total_clients, 3);
        assert_eq!(report.failed, 3);
        // Everything dies at the first wait.
        assert_eq!(report.failures_by_step.get("navigate"), Some(&3));
    }
}
