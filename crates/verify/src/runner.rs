//! Scenario runner
//!
//! Executes a scenario's steps in order against a fresh session, stops at the
//! first failing step, takes a best-effort diagnostic screenshot and always
//! releases the session exactly once.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::{Artifact, ArtifactKind, ArtifactStore, diagnostic_name};
use crate::config::RunnerOptions;
use crate::error::{FailureCause, StepError};
use crate::scenario::Scenario;
use crate::session::{Session, SessionFactory};
use crate::step::{StepContext, StepOutcome, bounded};

/// Outcome of one scenario run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Completed(RunSuccess),
    Failed(RunFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSuccess {
    pub scenario: String,
    pub artifacts: Vec<Artifact>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub scenario: String,

    /// Index of the failing step; `None` when no session could be acquired
    pub step_index: Option<usize>,

    /// Description of the failing step
    pub step: Option<String>,

    pub cause: FailureCause,

    /// Screenshot of the page at failure time
    pub diagnostic: Option<Artifact>,

    /// Why the diagnostic is missing, when it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_error: Option<String>,

    /// Artifacts captured before the failure
    pub artifacts: Vec<Artifact>,

    pub duration_ms: u64,
}

impl RunResult {
    pub fn scenario(&self) -> &str {
        match self {
            RunResult::Completed(s) => &s.scenario,
            RunResult::Failed(f) => &f.scenario,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed(_))
    }

    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            RunResult::Completed(s) => &s.artifacts,
            RunResult::Failed(f) => &f.artifacts,
        }
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts().iter().find(|a| a.name == name)
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunResult::Completed(_) => None,
            RunResult::Failed(f) => Some(f),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RunResult::Completed(s) => s.duration_ms,
            RunResult::Failed(f) => f.duration_ms,
        }
    }
}

/// Runs scenarios, each against its own session from the factory
pub struct VerificationRunner<F: SessionFactory> {
    factory: F,
    options: RunnerOptions,
    store: ArtifactStore,
}

impl<F: SessionFactory> VerificationRunner<F> {
    pub fn new(factory: F, store: ArtifactStore) -> Self {
        Self {
            factory,
            options: RunnerOptions::default(),
            store,
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run a scenario to completion or first failure
    pub async fn run(&self, scenario: &Scenario) -> RunResult {
        self.run_until(scenario, &CancellationToken::new()).await
    }

    /// Run a scenario, giving up early when `cancel` fires
    ///
    /// Cancellation and the deadline apply from the start, including while a
    /// session is still being acquired.
    pub async fn run_until(&self, scenario: &Scenario, cancel: &CancellationToken) -> RunResult {
        let start = Instant::now();
        let name = scenario.name();
        info!(scenario = name, steps = scenario.steps().len(), "Running scenario");

        let deadline = async {
            match self.options.deadline {
                Some(deadline) => sleep_until(start + deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureCause::Cancelled),
            _ = &mut deadline => Err(self.deadline_exceeded()),
            acquired = self.factory.acquire() => {
                acquired.map_err(FailureCause::SessionUnavailable)
            }
        };
        let mut session = match acquired {
            Ok(session) => session,
            Err(cause) => {
                error!(scenario = name, cause = %cause, "No session for scenario");
                return RunResult::Failed(RunFailure {
                    scenario: name.to_string(),
                    step_index: None,
                    step: None,
                    cause,
                    diagnostic: None,
                    diagnostic_error: None,
                    artifacts: Vec::new(),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let mut artifacts = Vec::new();
        let mut cursor = 0usize;
        let outcome = {
            let steps = self.execute_steps(&session, scenario, &mut artifacts, &mut cursor);
            tokio::select! {
                biased;
                result = steps => result.map_err(FailureCause::Step),
                _ = cancel.cancelled() => Err(FailureCause::Cancelled),
                _ = &mut deadline => Err(self.deadline_exceeded()),
            }
        };

        let result = match outcome {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    scenario = name,
                    artifacts = artifacts.len(),
                    duration_ms,
                    "Scenario completed"
                );
                RunResult::Completed(RunSuccess {
                    scenario: name.to_string(),
                    artifacts,
                    duration_ms,
                })
            }
            Err(cause) => {
                let index = cursor.min(scenario.steps().len().saturating_sub(1));
                let step = scenario.steps().get(index).map(|s| s.describe());
                error!(
                    scenario = name,
                    step = index,
                    action = step.as_deref().unwrap_or_default(),
                    cause = %cause,
                    "Scenario failed"
                );

                let (diagnostic, diagnostic_error) =
                    self.capture_diagnostic(&session, scenario, index, &cause).await;
                RunResult::Failed(RunFailure {
                    scenario: name.to_string(),
                    step_index: Some(index),
                    step,
                    cause,
                    diagnostic,
                    diagnostic_error,
                    artifacts,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        };

        if let Err(err) = session.close().await {
            warn!(scenario = name, error = %err, "Failed to close session");
        }
        result
    }

    /// Run many scenarios with bounded concurrency, results in input order
    pub async fn run_many(&self, scenarios: &[Scenario], parallelism: usize) -> Vec<RunResult> {
        self.run_many_until(scenarios, parallelism, &CancellationToken::new()).await
    }

    /// Like [`run_many`](Self::run_many); scenarios not yet finished when
    /// `cancel` fires report `Cancelled`
    pub async fn run_many_until(
        &self,
        scenarios: &[Scenario],
        parallelism: usize,
        cancel: &CancellationToken,
    ) -> Vec<RunResult> {
        stream::iter(scenarios)
            .map(|scenario| self.run_until(scenario, cancel))
            .buffered(parallelism.max(1))
            .collect()
            .await
    }

    fn deadline_exceeded(&self) -> FailureCause {
        FailureCause::DeadlineExceeded {
            deadline_ms: self
                .options
                .deadline
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    async fn execute_steps(
        &self,
        session: &F::Session,
        scenario: &Scenario,
        artifacts: &mut Vec<Artifact>,
        cursor: &mut usize,
    ) -> Result<(), StepError> {
        for (index, step) in scenario.steps().iter().enumerate() {
            *cursor = index;
            let ctx = StepContext {
                scenario: scenario.name(),
                base_url: scenario.base_url(),
                index,
                store: &self.store,
                options: &self.options,
            };

            let started = Instant::now();
            match step.execute(session, &ctx).await {
                StepOutcome::Ok(artifact) => {
                    debug!(
                        scenario = scenario.name(),
                        step = index,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Step done"
                    );
                    artifacts.extend(artifact);
                }
                StepOutcome::Failed(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// A failed screenshot is recorded next to the cause, never in place of it
    async fn capture_diagnostic(
        &self,
        session: &F::Session,
        scenario: &Scenario,
        index: usize,
        cause: &FailureCause,
    ) -> (Option<Artifact>, Option<String>) {
        if let FailureCause::Step(StepError::Session(err)) = cause {
            if err.is_unreachable() {
                return (None, Some("session unreachable at failure time".to_string()));
            }
        }

        let budget = self.options.action_timeout;
        let png = match bounded("diagnostic screenshot", budget, session.screenshot(true)).await {
            Ok(png) => png,
            Err(err) => {
                warn!(scenario = scenario.name(), error = %err, "Diagnostic screenshot failed");
                return (None, Some(err.to_string()));
            }
        };

        let name = diagnostic_name(scenario.name());
        match self
            .store
            .write(scenario.name(), &name, ArtifactKind::Screenshot, index, &png)
        {
            Ok(mut artifact) => {
                let step = scenario.steps().get(index).map(|s| s.describe()).unwrap_or_default();
                artifact.note = Some(format!("step {} ({}): {}", index, step, cause));
                (Some(artifact), None)
            }
            Err(err) => {
                warn!(
                    scenario = scenario.name(),
                    error = %err,
                    "Could not store diagnostic screenshot"
                );
                (None, Some(err.to_string()))
            }
        }
    }
}
