//! Browser sessions
//!
//! A [`Session`] wraps one browser page and exposes the small set of
//! primitives steps and conditions are written against. Every primitive either
//! returns a value or fails with a [`SessionError`]; none of them retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::locator::Locator;

pub mod chromium;
pub mod dom;

pub use chromium::{ChromiumSession, ChromiumSessionFactory};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Browser launched, page not yet answering
    Opening,
    Ready,
    Closed,
}

impl SessionState {
    /// Only a ready session runs primitives
    pub fn accepts_commands(self) -> bool {
        self == SessionState::Ready
    }
}

/// What a locator resolved to at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Located {
    /// Number of matching elements
    #[serde(default)]
    pub count: usize,

    /// Whether the first match is rendered
    #[serde(default)]
    pub visible: bool,

    /// Whether the first match accepts interaction
    #[serde(default)]
    pub enabled: bool,

    /// Class list of the first match
    #[serde(default)]
    pub classes: Vec<String>,
}

/// One live browser page
#[async_trait]
pub trait Session: Send + Sync {
    fn state(&self) -> SessionState;

    /// Navigate the page and wait for the load to finish
    async fn open(&self, url: &str) -> Result<(), SessionError>;

    /// Resolve a locator against the current DOM
    async fn locate(&self, locator: &Locator) -> Result<Located, SessionError>;

    /// Replace the value of the first matching form control
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SessionError>;

    /// Click the first matching element
    async fn click(&self, locator: &Locator) -> Result<(), SessionError>;

    async fn current_url(&self) -> Result<String, SessionError>;

    /// Capture the page as PNG bytes. Must work whatever state the page is in.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, SessionError>;

    /// Release the browser. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool, SessionError> {
        Ok(self.locate(locator).await?.visible)
    }

    async fn has_class(&self, locator: &Locator, class_name: &str) -> Result<bool, SessionError> {
        let located = self.locate(locator).await?;
        Ok(located.classes.iter().any(|c| c == class_name))
    }

    async fn count(&self, locator: &Locator) -> Result<usize, SessionError> {
        Ok(self.locate(locator).await?.count)
    }
}

/// Hands out fresh, independent sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    async fn acquire(&self) -> Result<Self::Session, SessionError>;
}
