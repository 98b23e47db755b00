//! Error types for UI verification runs

use serde::Serialize;
use thiserror::Error;

/// What kind of session primitive failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// The browser could not be started or attached
    Launch,
    /// The session was already released or the target went away
    Closed,
    /// A navigation did not complete
    Navigation,
    /// No element matched the locator
    ElementNotFound,
    /// The browser rejected the locator syntax
    InvalidSelector,
    /// A primitive exceeded its action budget
    Timeout,
    /// Anything else reported by the DevTools protocol
    Protocol,
}

/// A browser primitive could not complete
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("session error ({kind:?}): {reason}")]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub reason: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Closed, reason)
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Protocol, reason)
    }

    /// Whether the session itself is gone, as opposed to one primitive failing
    pub fn is_unreachable(&self) -> bool {
        matches!(self.kind, SessionErrorKind::Closed | SessionErrorKind::Launch)
    }
}

/// A `WaitFor` condition never held within its budget
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error(
    "timed out after {elapsed_ms} ms waiting for {condition} (timeout: {timeout_ms} ms){}",
    last_error_suffix(.last_error)
)]
pub struct TimeoutError {
    pub condition: String,
    pub elapsed_ms: u64,
    pub timeout_ms: u64,
    /// The most recent evaluation failure, if polling ever failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!("; last error: {}", err),
        None => String::new(),
    }
}

/// A condition that can never be evaluated (bad locator syntax)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("malformed condition {condition}: {reason}")]
pub struct MalformedConditionError {
    pub condition: String,
    pub reason: String,
}

/// Scenario failed construction-time validation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid scenario '{scenario}': {reason}")]
pub struct InvalidScenarioError {
    pub scenario: String,
    pub reason: String,
}

impl InvalidScenarioError {
    pub fn new(scenario: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            reason: reason.into(),
        }
    }
}

/// Writing an artifact to durable storage failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("failed to store artifact '{name}': {reason}")]
pub struct ArtifactError {
    pub name: String,
    pub reason: String,
}

/// Why a single step failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum StepError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    MalformedCondition(#[from] MalformedConditionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Why a scenario run did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("step failed: {0}")]
    Step(StepError),

    #[error("session unavailable: {0}")]
    SessionUnavailable(SessionError),

    #[error("scenario deadline of {deadline_ms} ms exceeded")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("run cancelled")]
    Cancelled,
}

impl FailureCause {
    /// Short label used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            FailureCause::Step(StepError::Session(_)) => "SessionError",
            FailureCause::Step(StepError::Timeout(_)) => "TimeoutError",
            FailureCause::Step(StepError::MalformedCondition(_)) => "MalformedConditionError",
            FailureCause::Step(StepError::Artifact(_)) => "ArtifactError",
            FailureCause::SessionUnavailable(_) => "SessionUnavailable",
            FailureCause::DeadlineExceeded { .. } => "DeadlineExceeded",
            FailureCause::Cancelled => "Cancelled",
        }
    }
}

/// Configuration could not be read
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Scenario file could not be loaded
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] InvalidScenarioError),
}
