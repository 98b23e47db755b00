//! Conditions polled against live session state
//!
//! A condition is evaluated repeatedly until it holds or its timeout elapses.
//! "Not yet" is never an error; only a locator the browser cannot parse is,
//! and that ends the wait immediately.

use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout};
use tracing::trace;

use crate::error::{
    MalformedConditionError, SessionError, SessionErrorKind, StepError, TimeoutError,
};
use crate::locator::Locator;
use crate::session::Session;

/// A predicate over the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Current URL equals this one (relative values resolve against the base URL)
    UrlEquals(String),

    /// Current URL matches a glob where `*` stays within a path segment and `**` does not
    UrlMatches(String),

    ElementVisible(Locator),

    /// No match, or the match is not rendered
    ElementHidden(Locator),

    ElementHasClass {
        locator: Locator,
        class: String,
    },

    ElementCountAtLeast {
        locator: Locator,
        count: usize,
    },

    /// Visible and not disabled
    ElementEnabled(Locator),
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Satisfied,
    NotYet,
    Malformed(MalformedConditionError),
}

impl Condition {
    /// Evaluate once against the session
    pub async fn evaluate<S: Session + ?Sized>(
        &self,
        session: &S,
        base_url: &str,
    ) -> Result<Evaluation, SessionError> {
        match self.check(session, base_url).await {
            Ok(true) => Ok(Evaluation::Satisfied),
            Ok(false) => Ok(Evaluation::NotYet),
            Err(CheckError::Malformed(reason)) => Ok(Evaluation::Malformed(MalformedConditionError {
                condition: self.to_string(),
                reason,
            })),
            Err(CheckError::Session(err)) => Err(err),
        }
    }

    async fn check<S: Session + ?Sized>(
        &self,
        session: &S,
        base_url: &str,
    ) -> Result<bool, CheckError> {
        Ok(match self {
            Condition::UrlEquals(expected) => {
                let current = session.current_url().await?;
                urls_equal(&current, &resolve_url(base_url, expected))
            }
            Condition::UrlMatches(pattern) => {
                let regex = glob_to_regex(pattern).map_err(CheckError::Malformed)?;
                regex.is_match(&session.current_url().await?)
            }
            Condition::ElementVisible(locator) => session.is_visible(locator).await?,
            Condition::ElementHidden(locator) => !session.is_visible(locator).await?,
            Condition::ElementHasClass { locator, class } => {
                session.has_class(locator, class).await?
            }
            Condition::ElementCountAtLeast { locator, count } => {
                session.count(locator).await? >= *count
            }
            Condition::ElementEnabled(locator) => {
                let located = session.locate(locator).await?;
                located.count > 0 && located.visible && located.enabled
            }
        })
    }

    /// Locator this condition queries, if any
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Condition::UrlEquals(_) | Condition::UrlMatches(_) => None,
            Condition::ElementVisible(l)
            | Condition::ElementHidden(l)
            | Condition::ElementEnabled(l)
            | Condition::ElementHasClass { locator: l, .. }
            | Condition::ElementCountAtLeast { locator: l, .. } => Some(l),
        }
    }
}

enum CheckError {
    Malformed(String),
    Session(SessionError),
}

/// A locator the browser cannot parse is a programmer error, not a timing issue
impl From<SessionError> for CheckError {
    fn from(err: SessionError) -> Self {
        if err.kind == SessionErrorKind::InvalidSelector {
            CheckError::Malformed(err.reason)
        } else {
            CheckError::Session(err)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::UrlEquals(url) => write!(f, "url == {}", url),
            Condition::UrlMatches(glob) => write!(f, "url ~ {}", glob),
            Condition::ElementVisible(l) => write!(f, "visible({})", l),
            Condition::ElementHidden(l) => write!(f, "hidden({})", l),
            Condition::ElementHasClass { locator, class } => {
                write!(f, "has_class({}, {})", locator, class)
            }
            Condition::ElementCountAtLeast { locator, count } => {
                write!(f, "count({}) >= {}", locator, count)
            }
            Condition::ElementEnabled(l) => write!(f, "enabled({})", l),
        }
    }
}

/// Poll `condition` until it holds or `budget` elapses
///
/// The condition is evaluated at least once. Each evaluation is itself bounded
/// by the remaining budget so a hung primitive cannot stall the wait.
pub async fn wait_for<S: Session + ?Sized>(
    session: &S,
    condition: &Condition,
    base_url: &str,
    budget: Duration,
    poll_interval: Duration,
) -> Result<(), StepError> {
    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        let remaining = budget.saturating_sub(start.elapsed()).max(poll_interval);

        match timeout(remaining, condition.evaluate(session, base_url)).await {
            Ok(Ok(Evaluation::Satisfied)) => {
                trace!(%condition, attempts, "Condition satisfied");
                return Ok(());
            }
            Ok(Ok(Evaluation::Malformed(err))) => return Err(err.into()),
            Ok(Ok(Evaluation::NotYet)) => {}
            Ok(Err(err)) if err.is_unreachable() => return Err(err.into()),
            Ok(Err(err)) => {
                trace!(%condition, error = %err, "Evaluation failed; treating as not yet");
                last_error = Some(err.to_string());
            }
            Err(_) => trace!(%condition, "Evaluation exceeded remaining budget"),
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(TimeoutError {
                condition: condition.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                timeout_ms: budget.as_millis() as u64,
                last_error,
            }
            .into());
        }

        sleep(poll_interval.min(budget - elapsed)).await;
    }
}

/// Resolve a possibly relative URL against a base
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        format!("{}/{}", base, url)
    }
}

fn urls_equal(a: &str, b: &str) -> bool {
    a.strip_suffix('/').unwrap_or(a) == b.strip_suffix('/').unwrap_or(b)
}

fn glob_to_regex(glob: &str) -> Result<Regex, String> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                pattern.push_str(".*");
            } else {
                pattern.push_str("[^/]*");
            }
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| e.to_string())
}
