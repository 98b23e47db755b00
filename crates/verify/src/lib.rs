//! Scripted UI verification against a real browser
//!
//! This crate runs declarative scenarios against a web application:
//! - Scenarios are ordered steps (navigate, fill, click, wait, capture)
//! - Waits poll a condition with a bounded timeout instead of sleeping
//! - Screenshots and log lines are stored as named artifacts
//! - A failed run reports the failing step and a diagnostic screenshot
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  VerificationRunner<F: SessionFactory>                      │
//! │    ├── run(scenario) -> RunResult                           │
//! │    ├── run_until(scenario, cancel) -> RunResult             │
//! │    └── run_many(scenarios, parallelism) -> [RunResult]      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (builder or YAML via ScenarioLoader)              │
//! │    ├── name, base_url, expected_artifacts                   │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { url }                               │
//! │          ├── fill { locator, value }                        │
//! │          ├── click { locator }                              │
//! │          ├── wait_for { condition, timeout_ms? }            │
//! │          ├── capture { name, full_page? }                   │
//! │          └── log { name, message }                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session (chromiumoxide)        ArtifactStore (filesystem)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod condition;
pub mod config;
pub mod error;
pub mod locator;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod step;

#[cfg(test)]
mod testing;

pub use artifact::{Artifact, ArtifactKind, ArtifactStore};
pub use condition::{Condition, Evaluation};
pub use config::{Credentials, RunnerOptions, VerifyConfig};
pub use error::{
    ArtifactError, ConfigError, FailureCause, InvalidScenarioError, LoadError,
    MalformedConditionError, SessionError, SessionErrorKind, StepError, TimeoutError,
};
pub use locator::Locator;
pub use runner::{RunFailure, RunResult, RunSuccess, VerificationRunner};
pub use scenario::{Scenario, ScenarioBuilder, ScenarioLoader};
pub use session::{ChromiumSession, ChromiumSessionFactory, Session, SessionFactory};
pub use step::Step;
