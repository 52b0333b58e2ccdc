#![forbid(unsafe_code)]

// Top-level run coordination: acquire shared resources, dispatch the
// population, aggregate outcomes, hold the meeting open, tear down.

use crate::conference::{ConferenceClient, ConferenceError};
use crate::config::RunSpec;
use crate::driver::{BrowserSession, DriverError, PageContext, UiDriver};
use crate::identity::IdentitySource;
use crate::join::run_join;
use crate::population::{generate_population, ClientConfig};
use crate::report::{JoinAttemptResult, RunReport};
use crate::scheduler;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failures that abort the whole run before any client launches. Everything
/// past setup is scoped to a single client and lands in the report instead.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to launch automation session: {0}")]
    Session(#[from] DriverError),

    #[error("failed to fetch moderator credential: {0}")]
    Credential(#[from] ConferenceError),
}

/// Runs one full load test: setup, dispatch, hold, teardown. Always returns
/// one result per generated client unless setup itself fails.
pub async fn run(
    spec: &RunSpec,
    driver: Arc<dyn UiDriver>,
    conference: Arc<dyn ConferenceClient>,
    identities: Arc<dyn IdentitySource>,
) -> Result<RunReport, SetupError> {
    // Session launch and credential fetch are independent prerequisites.
    let (session, password) = tokio::try_join!(
        async { driver.launch().await.map_err(SetupError::from) },
        async {
            conference
                .moderator_password(&spec.meeting_id)
                .await
                .map_err(SetupError::from)
        },
    )?;

    let population = generate_population(&spec.class_counts, identities.as_ref());
    info!(
        meeting = %spec.meeting_id,
        total = population.len(),
        cameras = spec.class_counts.cameras,
        microphones = spec.class_counts.microphones,
        listeners = spec.class_counts.listeners,
        "population generated"
    );

    // Pages of joined clients stay open until the hold expires; that is what
    // keeps the load on the meeting.
    let open_pages: Arc<Mutex<Vec<Box<dyn PageContext>>>> = Arc::new(Mutex::new(Vec::new()));
    let settings = Arc::new(spec.join.clone());
    let password = Arc::new(password);
    let meeting_id = Arc::new(spec.meeting_id.clone());

    let launch = |client: ClientConfig| {
        let session = session.clone();
        let conference = conference.clone();
        let settings = settings.clone();
        let password = password.clone();
        let meeting_id = meeting_id.clone();
        let open_pages = open_pages.clone();
        async move {
            launch_client(
                client, session, conference, settings, meeting_id, password, open_pages,
            )
            .await
        }
    };

    let results = scheduler::dispatch(&spec.policy, population, launch).await;
    let report = RunReport::from_results(results);

    info!(
        joined = report.joined,
        failed = report.failed,
        hold_secs = spec.hold.as_secs(),
        "all clients terminal, holding meeting open"
    );
    tokio::time::sleep(spec.hold).await;

    info!("hold elapsed, tearing down");
    for page in open_pages.lock().await.drain(..) {
        if let Err(e) = page.close().await {
            warn!(error = %e, "page close failed during teardown");
        }
    }
    if let Err(e) = session.close().await {
        warn!(error = %e, "session close failed during teardown");
    }

    Ok(report)
}

/// Drives a single client to a terminal state. Never propagates an error:
/// every failure becomes a recorded outcome so siblings keep going.
async fn launch_client(
    client: ClientConfig,
    session: Arc<dyn BrowserSession>,
    conference: Arc<dyn ConferenceClient>,
    settings: Arc<crate::config::JoinSettings>,
    meeting_id: Arc<String>,
    password: Arc<String>,
    open_pages: Arc<Mutex<Vec<Box<dyn PageContext>>>>,
) -> JoinAttemptResult {
    let started = tokio::time::Instant::now();
    info!(client = %client.identity, class = client.class.name(), "joining the conference");

    let join_url = match conference.join_url(&client.identity, &meeting_id, &password) {
        Ok(url) => url,
        Err(e) => {
            warn!(client = %client.identity, error = %e, "join URL resolution failed");
            return JoinAttemptResult::failed(
                client,
                "resolveJoinUrl",
                e.to_string(),
                started.elapsed(),
            );
        }
    };

    let page = match session.open_context().await {
        Ok(page) => page,
        Err(e) => {
            warn!(client = %client.identity, error = %e, "could not open execution context");
            return JoinAttemptResult::failed(
                client,
                "openContext",
                e.to_string(),
                started.elapsed(),
            );
        }
    };

    match run_join(page.as_ref(), &client, &join_url, &settings).await {
        Ok(()) => {
            let elapsed = started.elapsed();
            info!(
                client = %client.identity,
                elapsed_ms = elapsed.as_millis() as u64,
                "client joined"
            );
            open_pages.lock().await.push(page);
            JoinAttemptResult::joined(client, elapsed)
        }
        Err(failure) => {
            warn!(
                client = %client.identity,
                step = failure.step.name(),
                error = %failure.source,
                "client failed to join"
            );
            if let Err(e) = page.close().await {
                warn!(client = %client.identity, error = %e, "failed page close also failed");
            }
            JoinAttemptResult::failed(
                client,
                failure.step.name(),
                failure.source.to_string(),
                started.elapsed(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchPolicy;
    use crate::population::ClassCounts;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct CountingNames(AtomicUsize);

    impl IdentitySource for CountingNames {
        fn display_name(&self) -> String {
            format!("user-{}", self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    fn names() -> Arc<dyn IdentitySource> {
        Arc::new(CountingNames(AtomicUsize::new(0)))
    }

    /// Conference fake: password fetch optionally fails; join URL embeds the
    /// identity so pages know which client they serve.
    struct FakeConference {
        fail_password: bool,
        fail_join_url_for: Option<String>,
    }

    impl FakeConference {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail_password: false,
                fail_join_url_for: None,
            })
        }
    }

    #[async_trait]
    impl ConferenceClient for FakeConference {
        async fn moderator_password(&self, _meeting_id: &str) -> Result<String, ConferenceError> {
            if self.fail_password {
                Err(ConferenceError::Rejected("checksum mismatch".into()))
            } else {
                Ok("mod-pw".into())
            }
        }

        fn join_url(
            &self,
            identity: &str,
            meeting_id: &str,
            _password: &str,
        ) -> Result<String, ConferenceError> {
            if self.fail_join_url_for.as_deref() == Some(identity) {
                return Err(ConferenceError::Request("connection refused".into()));
            }
            Ok(format!("https://meet.test/{meeting_id}/{identity}"))
        }
    }

    #[derive(Default)]
    struct FakePage {
        url: std::sync::Mutex<String>,
        fail_selector: Option<String>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl PageContext for FakePage {
        async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
            if self.fail_selector.as_deref() == Some(selector) {
                return Err(DriverError::timeout(selector, timeout));
            }
            Ok(())
        }

        async fn wait_gone(&self, _selector: &str, _timeout: Duration) -> Result<(), DriverError> {
            Ok(())
        }

        async fn is_present(&self, _selector: &str) -> Result<bool, DriverError> {
            Ok(false)
        }

        async fn click(&self, _selector: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), DriverError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Session fake handing out pages in open order. The Nth opened context
    /// can be scripted to fail one selector forever.
    struct FakeSession {
        pages: std::sync::Mutex<Vec<Arc<FakePage>>>,
        fail_selector_for_page: std::sync::Mutex<std::collections::HashMap<usize, String>>,
        closed: AtomicBool,
    }

    impl FakeSession {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pages: std::sync::Mutex::new(Vec::new()),
                fail_selector_for_page: std::sync::Mutex::new(Default::default()),
                closed: AtomicBool::new(false),
            })
        }

        fn fail_selector_on_page(&self, page_idx: usize, selector: &str) {
            self.fail_selector_for_page
                .lock()
                .unwrap()
                .insert(page_idx, selector.to_string());
        }

        fn opened(&self) -> usize {
            self.pages.lock().unwrap().len()
        }
    }

    struct PageHandle(Arc<FakePage>);

    #[async_trait]
    impl PageContext for PageHandle {
        async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
            self.0.goto(url, timeout).await
        }
        async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
            self.0.wait_visible(selector, timeout).await
        }
        async fn wait_gone(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
            self.0.wait_gone(selector, timeout).await
        }
        async fn is_present(&self, selector: &str) -> Result<bool, DriverError> {
            self.0.is_present(selector).await
        }
        async fn click(&self, selector: &str) -> Result<(), DriverError> {
            self.0.click(selector).await
        }
        async fn close(&self) -> Result<(), DriverError> {
            self.0.close().await
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn open_context(&self) -> Result<Box<dyn PageContext>, DriverError> {
            let mut pages = self.pages.lock().unwrap();
            let idx = pages.len();
            let fail_selector = self.fail_selector_for_page.lock().unwrap().get(&idx).cloned();
            let page = Arc::new(FakePage {
                fail_selector,
                ..FakePage::default()
            });
            pages.push(page.clone());
            Ok(Box::new(PageHandle(page)))
        }

        async fn close(&self) -> Result<(), DriverError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeDriver {
        session: Arc<FakeSession>,
        fail_launch: bool,
    }

    impl FakeDriver {
        fn with(session: Arc<FakeSession>) -> Arc<Self> {
            Arc::new(Self {
                session,
                fail_launch: false,
            })
        }
    }

    #[async_trait]
    impl UiDriver for FakeDriver {
        async fn launch(&self) -> Result<Arc<dyn BrowserSession>, DriverError> {
            if self.fail_launch {
                return Err(DriverError::Driver("browser binary missing".into()));
            }
            Ok(self.session.clone())
        }
    }

    fn spec(cameras: usize, microphones: usize, listeners: usize) -> RunSpec {
        let mut spec = RunSpec::new(
            "test-meeting",
            ClassCounts {
                cameras,
                microphones,
                listeners,
            },
        );
        spec.hold = Duration::from_secs(30);
        spec.policy = LaunchPolicy::Sequential {
            client_delay: Duration::from_millis(1),
        };
        spec.join.retry = RetryPolicy::new(2, Duration::from_millis(1));
        spec.join.webcam_settle = Duration::from_millis(1);
        spec
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_client_yields_exactly_one_result() {
        let session = FakeSession::new();
        let report = run(&spec(2, 1, 2), FakeDriver::with(session.clone()), FakeConference::ok(), names())
            .await
            .unwrap();
        assert_eq!(report.total_clients, 5);
        assert_eq!(report.joined, 5);
        assert_eq!(session.opened(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_failure_aborts_before_any_client_launches() {
        let session = FakeSession::new();
        let conference = Arc::new(FakeConference {
            fail_password: true,
            fail_join_url_for: None,
        });
        let err = run(&spec(1, 1, 1), FakeDriver::with(session.clone()), conference, names())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Credential(_)));
        assert_eq!(session.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_launch_failure_is_setup_error() {
        let session = FakeSession::new();
        let driver = Arc::new(FakeDriver {
            session,
            fail_launch: true,
        });
        let err = run(&spec(0, 0, 1), driver, FakeConference::ok(), names())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Session(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_client_does_not_stop_the_rest() {
        let session = FakeSession::new();
        // Sequential dispatch: page 0 belongs to the first camera client.
        session.fail_selector_on_page(0, r#"[aria-label="Start sharing"]"#);

        let report = run(&spec(2, 1, 2), FakeDriver::with(session.clone()), FakeConference::ok(), names())
            .await
            .unwrap();

        assert_eq!(report.total_clients, 5);
        assert_eq!(report.joined, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures_by_step.get("shareWebcam"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_client_closes_its_page_survivors_close_at_teardown() {
        let session = FakeSession::new();
        session.fail_selector_on_page(0, r#"[aria-label="Microphone"]"#);

        run(&spec(0, 2, 0), FakeDriver::with(session.clone()), FakeConference::ok(), names())
            .await
            .unwrap();

        let pages = session.pages.lock().unwrap();
        assert_eq!(pages.len(), 2);
        // Both end up closed: the failure right away, the survivor at teardown.
        assert!(pages.iter().all(|p| p.closed.load(Ordering::SeqCst)));
        assert!(session.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_url_failure_is_scoped_to_one_client() {
        let session = FakeSession::new();
        let conference = Arc::new(FakeConference {
            fail_password: false,
            fail_join_url_for: Some("user-1".into()),
        });

        let report = run(&spec(0, 0, 3), FakeDriver::with(session.clone()), conference, names())
            .await
            .unwrap();

        assert_eq!(report.total_clients, 3);
        assert_eq!(report.joined, 2);
        assert_eq!(report.failures_by_step.get("resolveJoinUrl"), Some(&1));
        // The failed client never opened a context.
        assert_eq!(session.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_is_applied_once_after_last_client_resolves() {
        let session = FakeSession::new();
        let mut spec = spec(0, 0, 2);
        spec.hold = Duration::from_secs(45);
        spec.policy = LaunchPolicy::Parallel { batch_size: 2 };

        let started = Instant::now();
        run(&spec, FakeDriver::with(session), FakeConference::ok(), names())
            .await
            .unwrap();
        // Parallel policy adds no pacing delays and the fakes never sleep, so
        // the run's only delay is the hold itself.
        assert_eq!(started.elapsed(), Duration::from_secs(45));
    }
}
