//! Scenario steps and their execution against a session

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::condition::{Condition, resolve_url, wait_for};
use crate::config::RunnerOptions;
use crate::error::{SessionError, SessionErrorKind, StepError};
use crate::locator::Locator;
use crate::session::Session;

/// A single action in a scenario
///
/// `Debug` never prints fill values since they usually carry credentials.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the scenario base URL)
    Navigate { url: String },

    /// Replace the value of a form control
    Fill {
        locator: Locator,
        value: String,
    },

    /// Click an element. Does not wait for whatever the click triggers.
    Click { locator: Locator },

    /// Poll a condition until it holds
    WaitFor {
        condition: Condition,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Screenshot the page into a named artifact
    Capture {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Write a log line into a named artifact
    Log {
        name: String,
        message: String,
    },
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate { url: url.into() }
    }

    pub fn fill(locator: Locator, value: impl Into<String>) -> Self {
        Step::Fill {
            locator,
            value: value.into(),
        }
    }

    pub fn click(locator: Locator) -> Self {
        Step::Click { locator }
    }

    pub fn wait_for(condition: Condition, timeout: Option<Duration>) -> Self {
        Step::WaitFor {
            condition,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        }
    }

    pub fn capture(name: impl Into<String>) -> Self {
        Step::Capture {
            name: name.into(),
            full_page: false,
        }
    }

    /// Name of the artifact this step writes, if any
    pub fn artifact_name(&self) -> Option<&str> {
        match self {
            Step::Capture { name, .. } | Step::Log { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Locators referenced by this step
    pub fn locators(&self) -> Vec<&Locator> {
        match self {
            Step::Fill { locator, .. } | Step::Click { locator } => vec![locator],
            Step::WaitFor { condition, .. } => condition.locator().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Step::WaitFor { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Human readable summary; never includes filled values
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { locator, .. } => format!("fill:{}", locator),
            Step::Click { locator } => format!("click:{}", locator),
            Step::WaitFor { condition, .. } => format!("wait_for:{}", condition),
            Step::Capture { name, .. } => format!("capture:{}", name),
            Step::Log { name, .. } => format!("log:{}", name),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Navigate { url } => f.debug_struct("Navigate").field("url", url).finish(),
            Step::Fill { locator, .. } => f
                .debug_struct("Fill")
                .field("locator", locator)
                .field("value", &"<redacted>")
                .finish(),
            Step::Click { locator } => f.debug_struct("Click").field("locator", locator).finish(),
            Step::WaitFor { condition, timeout_ms } => f
                .debug_struct("WaitFor")
                .field("condition", condition)
                .field("timeout_ms", timeout_ms)
                .finish(),
            Step::Capture { name, full_page } => f
                .debug_struct("Capture")
                .field("name", name)
                .field("full_page", full_page)
                .finish(),
            Step::Log { name, message } => f
                .debug_struct("Log")
                .field("name", name)
                .field("message", message)
                .finish(),
        }
    }
}

/// Where a step runs
pub struct StepContext<'a> {
    pub scenario: &'a str,
    pub base_url: &'a str,
    pub index: usize,
    pub store: &'a ArtifactStore,
    pub options: &'a RunnerOptions,
}

/// Result of executing one step
#[derive(Debug)]
pub enum StepOutcome {
    Ok(Option<Artifact>),
    Failed(StepError),
}

impl StepOutcome {
    pub fn into_result(self) -> Result<Option<Artifact>, StepError> {
        match self {
            StepOutcome::Ok(artifact) => Ok(artifact),
            StepOutcome::Failed(err) => Err(err),
        }
    }
}

impl Step {
    /// Execute against a session. Interaction steps fail on the first session
    /// error and never wait for the page to settle afterwards.
    pub async fn execute<S: Session + ?Sized>(
        &self,
        session: &S,
        ctx: &StepContext<'_>,
    ) -> StepOutcome {
        debug!(
            scenario = ctx.scenario,
            step = ctx.index,
            action = %self.describe(),
            "Executing step"
        );
        match self.run(session, ctx).await {
            Ok(artifact) => StepOutcome::Ok(artifact),
            Err(err) => StepOutcome::Failed(err),
        }
    }

    async fn run<S: Session + ?Sized>(
        &self,
        session: &S,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Artifact>, StepError> {
        let budget = ctx.options.action_timeout;
        match self {
            Step::Navigate { url } => {
                let target = resolve_url(ctx.base_url, url);
                bounded("navigate", budget, session.open(&target)).await?;
                Ok(None)
            }
            Step::Fill { locator, value } => {
                bounded("fill", budget, session.fill(locator, value)).await?;
                Ok(None)
            }
            Step::Click { locator } => {
                bounded("click", budget, session.click(locator)).await?;
                Ok(None)
            }
            Step::WaitFor { condition, timeout_ms } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(ctx.options.default_timeout);
                let poll = ctx.options.poll_interval;
                wait_for(session, condition, ctx.base_url, timeout, poll).await?;
                Ok(None)
            }
            Step::Capture { name, full_page } => {
                let png = bounded("screenshot", budget, session.screenshot(*full_page)).await?;
                let artifact = ctx
                    .store
                    .write(ctx.scenario, name, ArtifactKind::Screenshot, ctx.index, &png)?;
                Ok(Some(artifact))
            }
            Step::Log { name, message } => {
                info!(scenario = ctx.scenario, artifact = name.as_str(), "{}", message);
                let line = format!("{}\n", message);
                let artifact = ctx
                    .store
                    .write(ctx.scenario, name, ArtifactKind::Log, ctx.index, line.as_bytes())?;
                Ok(Some(artifact))
            }
        }
    }
}

/// Bound a session primitive by the action budget
pub(crate) async fn bounded<T>(
    what: &str,
    budget: Duration,
    fut: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    tokio::time::timeout(budget, fut).await.map_err(|_| {
        SessionError::new(
            SessionErrorKind::Timeout,
            format!("{} did not finish within {} ms", what, budget.as_millis()),
        )
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSession, Op};

    fn ctx<'a>(store: &'a ArtifactStore, options: &'a RunnerOptions) -> StepContext<'a> {
        StepContext {
            scenario: "steps",
            base_url: "http://localhost:5173",
            index: 2,
            store,
            options,
        }
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = r#"
- action: navigate
  url: /login
- action: fill
  locator: 'label=Email'
  value: u@x.com
- action: click
  locator: 'role=button[name="Sign in"]'
- action: wait_for
  condition:
    url_equals: /profile
  timeout_ms: 10000
- action: wait_for
  condition:
    element_has_class:
      locator: html
      class: dark
- action: capture
  name: final
  full_page: true
"#;
        let steps: Vec<Step> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[1], Step::fill(Locator::label("Email"), "u@x.com"));
        assert_eq!(
            steps[3],
            Step::wait_for(Condition::UrlEquals("/profile".into()), Some(Duration::from_secs(10)))
        );
        assert_eq!(steps[5].artifact_name(), Some("final"));
    }

    #[test]
    fn test_describe_hides_filled_value() {
        let step = Step::fill(Locator::label("Password"), "hunter2");
        assert_eq!(step.describe(), "fill:label=Password");
        let debug = format!("{:?}", step);
        assert!(!debug.contains("hunter2"), "{}", debug);
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_navigate_resolves_relative_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions::default();
        let session = FakeSession::new();

        Step::navigate("/login")
            .execute(&session, &ctx(&store, &options))
            .await
            .into_result()
            .unwrap();

        assert_eq!(session.calls(), vec!["open:http://localhost:5173/login".to_string()]);
    }

    #[tokio::test]
    async fn test_click_does_not_wait_for_settling() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions::default();
        let session = FakeSession::new();
        session.show("role=button[name=\"Add Match\"]");

        Step::click(Locator::role("button", "Add Match"))
            .execute(&session, &ctx(&store, &options))
            .await
            .into_result()
            .unwrap();

        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_click_missing_element_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions::default();
        let session = FakeSession::new();

        let outcome = Step::click(Locator::css("#missing"))
            .execute(&session, &ctx(&store, &options))
            .await;

        match outcome {
            StepOutcome::Failed(StepError::Session(err)) => {
                assert_eq!(err.kind, SessionErrorKind::ElementNotFound)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions::default();
        let session = FakeSession::new();

        let artifact = Step::capture("final")
            .execute(&session, &ctx(&store, &options))
            .await
            .into_result()
            .unwrap()
            .unwrap();

        assert_eq!(artifact.step_index, 2);
        assert_eq!(artifact.path, dir.path().join("steps/final.png"));
        assert!(artifact.path.exists());
    }

    #[tokio::test]
    async fn test_log_writes_text_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions::default();
        let session = FakeSession::new();

        let step = Step::Log {
            name: "progress".into(),
            message: "Opening menu".into(),
        };
        let artifact = step
            .execute(&session, &ctx(&store, &options))
            .await
            .into_result()
            .unwrap()
            .unwrap();

        assert_eq!(std::fs::read_to_string(artifact.path).unwrap(), "Opening menu\n");
        assert!(session.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_primitive_is_bounded_by_action_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let options = RunnerOptions {
            action_timeout: Duration::from_secs(5),
            ..RunnerOptions::default()
        };
        let session = FakeSession::new();
        session.hang(Op::Open);

        let outcome = Step::navigate("/slow").execute(&session, &ctx(&store, &options)).await;

        match outcome {
            StepOutcome::Failed(StepError::Session(err)) => {
                assert_eq!(err.kind, SessionErrorKind::Timeout)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
