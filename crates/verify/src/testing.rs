//! Scripted in-memory session for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{SessionError, SessionErrorKind};
use crate::locator::Locator;
use crate::session::{Located, Session, SessionFactory, SessionState};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Something the fake page does in response to an action
#[derive(Debug, Clone)]
pub enum Reaction {
    SetUrl(String),
    Show(String),
    AddClass(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Locate,
    Fill,
    Click,
    Url,
    Screenshot,
}

#[derive(Default)]
struct Page {
    url: String,
    elements: HashMap<String, Located>,
    invalid: HashSet<String>,
    on_click: HashMap<String, Vec<Reaction>>,
    on_poll: Vec<(usize, Reaction)>,
    polls: usize,
    failures: HashMap<Op, SessionError>,
    hangs: HashSet<Op>,
    calls: Vec<String>,
    closed: bool,
}

impl Page {
    fn apply(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::SetUrl(url) => self.url = url,
            Reaction::Show(key) => {
                let element = self.elements.entry(key).or_default();
                element.count = element.count.max(1);
                element.visible = true;
                element.enabled = true;
            }
            Reaction::AddClass(key, class) => {
                let element = self.elements.entry(key).or_default();
                element.count = element.count.max(1);
                element.classes.push(class);
            }
        }
    }
}

fn key(selector: &str) -> String {
    Locator::parse(selector)
        .map(|l| l.to_string())
        .unwrap_or_else(|_| selector.to_string())
}

/// Cheap handle; clones share the same page
#[derive(Clone, Default)]
pub struct FakeSession {
    page: Arc<Mutex<Page>>,
    closes: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Page) -> T) -> T {
        let mut page = self.page.lock().unwrap();
        f(&mut page)
    }

    pub fn set_url(&self, url: &str) {
        self.with(|p| p.url = url.to_string());
    }

    pub fn set_element(&self, selector: &str, f: impl FnOnce(&mut Located)) {
        self.with(|p| f(p.elements.entry(key(selector)).or_default()));
    }

    /// A visible, enabled, single element
    pub fn show(&self, selector: &str) {
        self.with(|p| p.apply(Reaction::Show(key(selector))));
    }

    pub fn set_invalid_selector(&self, selector: &str) {
        self.with(|p| p.invalid.insert(key(selector)));
    }

    pub fn on_click(&self, selector: &str, reaction: Reaction) {
        let reaction = match reaction {
            Reaction::Show(k) => Reaction::Show(key(&k)),
            Reaction::AddClass(k, c) => Reaction::AddClass(key(&k), c),
            other => other,
        };
        self.with(|p| p.on_click.entry(key(selector)).or_default().push(reaction));
    }

    /// Apply `reaction` once the page has been polled `after` times
    pub fn on_poll(&self, after: usize, reaction: Reaction) {
        self.with(|p| p.on_poll.push((after, reaction)));
    }

    pub fn fail(&self, op: Op, err: SessionError) {
        self.with(|p| p.failures.insert(op, err));
    }

    pub fn hang(&self, op: Op) {
        self.with(|p| p.hangs.insert(op));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|p| p.calls.clone())
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn enter(&self, op: Op, call: String) -> Result<bool, SessionError> {
        self.with(|p| {
            if p.closed {
                return Err(SessionError::closed("fake session closed"));
            }
            p.calls.push(call);
            if matches!(op, Op::Locate | Op::Url) {
                p.polls += 1;
                let polls = p.polls;
                let due: Vec<Reaction> = p
                    .on_poll
                    .iter()
                    .filter(|(after, _)| *after == polls)
                    .map(|(_, r)| r.clone())
                    .collect();
                for reaction in due {
                    p.apply(reaction);
                }
            }
            if let Some(err) = p.failures.get(&op) {
                return Err(err.clone());
            }
            Ok(p.hangs.contains(&op))
        })
    }

    async fn gate(&self, op: Op, call: String) -> Result<(), SessionError> {
        if self.enter(op, call)? {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for FakeSession {
    fn state(&self) -> SessionState {
        if self.with(|p| p.closed) {
            SessionState::Closed
        } else {
            SessionState::Ready
        }
    }

    async fn open(&self, url: &str) -> Result<(), SessionError> {
        self.gate(Op::Open, format!("open:{}", url)).await?;
        self.set_url(url);
        Ok(())
    }

    async fn locate(&self, locator: &Locator) -> Result<Located, SessionError> {
        let k = locator.to_string();
        self.gate(Op::Locate, format!("locate:{}", k)).await?;
        self.with(|p| {
            if p.invalid.contains(&k) {
                return Err(SessionError::new(
                    SessionErrorKind::InvalidSelector,
                    format!("{}: bad syntax", k),
                ));
            }
            Ok(p.elements.get(&k).cloned().unwrap_or_default())
        })
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SessionError> {
        let k = locator.to_string();
        self.gate(Op::Fill, format!("fill:{}={}", k, text)).await?;
        self.with(|p| match p.elements.get(&k) {
            Some(e) if e.count > 0 => Ok(()),
            _ => Err(SessionError::new(SessionErrorKind::ElementNotFound, k.clone())),
        })
    }

    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        let k = locator.to_string();
        self.gate(Op::Click, format!("click:{}", k)).await?;
        self.with(|p| {
            if !p.elements.get(&k).is_some_and(|e| e.count > 0) {
                return Err(SessionError::new(SessionErrorKind::ElementNotFound, k.clone()));
            }
            for reaction in p.on_click.get(&k).cloned().unwrap_or_default() {
                p.apply(reaction);
            }
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.gate(Op::Url, "url".to_string()).await?;
        Ok(self.with(|p| p.url.clone()))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, SessionError> {
        self.gate(Op::Screenshot, format!("screenshot:{}", full_page)).await?;
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.with(|p| p.closed = true);
        Ok(())
    }
}

/// Hands out pre-configured fake sessions and remembers them
#[derive(Clone)]
pub struct FakeFactory {
    setup: Arc<dyn Fn(&FakeSession) + Send + Sync>,
    issued: Arc<Mutex<Vec<FakeSession>>>,
    unavailable: Option<SessionError>,
    hangs: bool,
}

impl FakeFactory {
    pub fn new(setup: impl Fn(&FakeSession) + Send + Sync + 'static) -> Self {
        Self {
            setup: Arc::new(setup),
            issued: Arc::new(Mutex::new(Vec::new())),
            unavailable: None,
            hangs: false,
        }
    }

    pub fn unavailable(err: SessionError) -> Self {
        Self {
            unavailable: Some(err),
            ..Self::new(|_| {})
        }
    }

    /// A factory whose `acquire` never finishes, like a browser stuck launching
    pub fn hanging() -> Self {
        Self {
            hangs: true,
            ..Self::new(|_| {})
        }
    }

    pub fn issued(&self) -> Vec<FakeSession> {
        self.issued.lock().unwrap().clone()
    }

    pub fn total_closes(&self) -> usize {
        self.issued().iter().map(FakeSession::close_count).sum()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn acquire(&self) -> Result<FakeSession, SessionError> {
        if self.hangs {
            std::future::pending::<()>().await;
        }
        if let Some(err) = &self.unavailable {
            return Err(err.clone());
        }
        let session = FakeSession::new();
        (self.setup)(&session);
        self.issued.lock().unwrap().push(session.clone());
        Ok(session)
    }
}
