//! Chromium-backed session via the DevTools protocol.
//!
//! Each [`ChromiumSession`] owns its own browser process and a single page, so
//! concurrent scenario runs never share browser state.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserOptions;
use crate::error::{SessionError, SessionErrorKind};
use crate::locator::Locator;
use crate::session::dom::{self, DomOp, TARGET_ATTRIBUTE};
use crate::session::{Located, Session, SessionFactory, SessionState};

/// One browser process and one page
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Page,
    handler: Option<JoinHandle<()>>,
    state: SessionState,
    next_mark: AtomicU64,
}

impl ChromiumSession {
    /// Launch a browser and open a blank page
    pub async fn launch(options: &BrowserOptions) -> Result<Self, SessionError> {
        let config = build_config(options)?;
        debug!(headless = options.headless, "Launching Chromium");

        let launched = tokio::time::timeout(options.launch_timeout(), Browser::launch(config))
            .await
            .map_err(|_| {
                SessionError::new(
                    SessionErrorKind::Launch,
                    format!("browser did not start within {} ms", options.launch_timeout_ms),
                )
            })?;
        let (mut browser, handler) = launched.map_err(cdp_error(SessionErrorKind::Launch))?;

        let handler = spawn_handler(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(cdp_error(SessionErrorKind::Launch)(err));
            }
        };

        let mut session = Self {
            browser: Some(browser),
            page,
            handler: Some(handler),
            state: SessionState::Opening,
            next_mark: AtomicU64::new(0),
        };

        // The page must answer script evaluation before steps may use it
        if let Err(err) = session.evaluate("document.readyState".to_string()).await {
            let _ = session.close().await;
            return Err(SessionError::new(SessionErrorKind::Launch, err.reason));
        }
        session.state = SessionState::Ready;

        info!("Chromium session ready");
        Ok(session)
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.state.accepts_commands() {
            Ok(())
        } else {
            Err(SessionError::closed(format!("session is {:?}", self.state)))
        }
    }

    async fn run_dom(
        &self,
        locator: &Locator,
        op: DomOp,
        arg: &str,
    ) -> Result<Located, SessionError> {
        self.ensure_ready()?;
        let value = self.evaluate(dom::expression(locator, op, arg)).await?;
        dom::interpret(locator, value)
    }

    async fn evaluate(&self, expression: String) -> Result<Value, SessionError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(SessionError::protocol)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(cdp_error(SessionErrorKind::Protocol))?;

        result
            .into_value::<Value>()
            .map_err(|e| SessionError::protocol(format!("evaluation returned no value: {}", e)))
    }
}

#[async_trait]
impl Session for ChromiumSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn open(&self, url: &str) -> Result<(), SessionError> {
        self.ensure_ready()?;
        debug!(url, "Navigating");
        self.page
            .goto(url)
            .await
            .map_err(cdp_error(SessionErrorKind::Navigation))?;
        Ok(())
    }

    async fn locate(&self, locator: &Locator) -> Result<Located, SessionError> {
        self.run_dom(locator, DomOp::Locate, "").await
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), SessionError> {
        self.run_dom(locator, DomOp::Fill, text).await.map(|_| ())
    }

    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        let token = self.next_mark.fetch_add(1, Ordering::Relaxed).to_string();
        self.run_dom(locator, DomOp::Mark, &token).await?;

        let selector = format!("[{}=\"{}\"]", TARGET_ATTRIBUTE, token);
        let element = self
            .page
            .find_element(selector.as_str())
            .await
            .map_err(cdp_error(SessionErrorKind::ElementNotFound))?;

        // The handle stays valid once the marker is gone
        let unmark = format!(
            "document.querySelector('{}')?.removeAttribute('{}')",
            selector.replace('\'', "\\'"),
            TARGET_ATTRIBUTE
        );
        if let Err(err) = self.evaluate(unmark).await {
            debug!(error = %err, "Could not remove click marker");
        }

        element
            .click()
            .await
            .map_err(cdp_error(SessionErrorKind::Protocol))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.ensure_ready()?;
        let url = self
            .page
            .url()
            .await
            .map_err(cdp_error(SessionErrorKind::Protocol))?;
        Ok(url.unwrap_or_default())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, SessionError> {
        self.ensure_ready()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(cdp_error(SessionErrorKind::Protocol))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        let mut result = Ok(());
        if let Some(mut browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                result = Err(cdp_error(SessionErrorKind::Protocol)(err));
            }
            if let Err(err) = browser.wait().await {
                warn!(error = %err, "Browser process did not exit cleanly");
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        info!("Chromium session closed");
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!("Chromium session dropped without close; killing browser");
            if let Some(handler) = self.handler.take() {
                handler.abort();
            }
            // chromiumoxide kills the child process when the browser is dropped
            self.browser.take();
        }
    }
}

/// Launches one Chromium per acquired session
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    options: BrowserOptions,
}

impl ChromiumSessionFactory {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    type Session = ChromiumSession;

    async fn acquire(&self) -> Result<ChromiumSession, SessionError> {
        ChromiumSession::launch(&self.options).await
    }
}

fn build_config(options: &BrowserOptions) -> Result<BrowserConfig, SessionError> {
    let viewport = Viewport {
        width: options.viewport_width,
        height: options.viewport_height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: options.viewport_width >= options.viewport_height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder()
        .window_size(options.viewport_width, options.viewport_height)
        .viewport(viewport)
        .args(options.args.clone());

    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(path);
    }
    if !options.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| SessionError::new(SessionErrorKind::Launch, e))
}

fn cdp_error(kind: SessionErrorKind) -> impl Fn(CdpError) -> SessionError {
    move |err| SessionError::new(classify(&err, kind), err.to_string())
}

/// Transport failures mean the browser is gone, whatever the command was
fn classify(err: &CdpError, fallback: SessionErrorKind) -> SessionErrorKind {
    match err {
        CdpError::Timeout => SessionErrorKind::Timeout,
        CdpError::NotFound => SessionErrorKind::ElementNotFound,
        CdpError::NoResponse
        | CdpError::ChannelSendError(_)
        | CdpError::Ws(_)
        | CdpError::Io(_)
        | CdpError::LaunchExit(..) => SessionErrorKind::Closed,
        _ => fallback,
    }
}


fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                debug!(error = %err, "chromiumoxide handler error");
            }
        }
    })
}
