//! Verification configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Poll interval bounds for condition waits
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 250;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Application under verification
    pub target: TargetConfig,

    /// Login used by `authenticate` steps
    pub credentials: Option<Credentials>,

    /// Labels of the login form
    pub auth: AuthForm,

    /// Timeouts and polling
    pub timing: TimingConfig,

    /// Browser launch options
    pub browser: BrowserOptions,

    /// Artifact storage
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL relative step URLs are resolved against
    pub base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
        }
    }
}

/// Email/password pair
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the login form is labelled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthForm {
    pub email_label: String,
    pub password_label: String,
    pub submit_button: String,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self {
            email_label: "Email".to_string(),
            password_label: "Password".to_string(),
            submit_button: "Sign in".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Timeout for `wait_for` steps that do not set their own
    pub default_timeout_ms: u64,

    /// Delay between condition evaluations
    pub poll_interval_ms: u64,

    /// Budget for a single navigate/fill/click/capture
    pub action_timeout_ms: u64,

    /// Optional budget for a whole scenario
    pub deadline_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            poll_interval_ms: 150,
            action_timeout_ms: 30_000,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Path to a Chrome/Chromium binary (auto-detected when unset)
    pub chrome_executable: Option<PathBuf>,

    pub launch_timeout_ms: u64,

    /// Extra command line flags
    pub args: Vec<String>,
}

impl BrowserOptions {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chrome_executable: None,
            launch_timeout_ms: 30_000,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("verification-artifacts"),
        }
    }
}

/// Timing knobs the runner works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    pub default_timeout: Duration,
    pub poll_interval: Duration,
    pub action_timeout: Duration,
    pub deadline: Option<Duration>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        TimingConfig::default().runner_options()
    }
}

impl TimingConfig {
    pub fn runner_options(&self) -> RunnerOptions {
        let poll = self
            .poll_interval_ms
            .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        RunnerOptions {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            poll_interval: Duration::from_millis(poll),
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

impl VerifyConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override values from `UIVERIFY_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("UIVERIFY_BASE_URL") {
            self.target.base_url = url;
        }
        match (var("UIVERIFY_EMAIL"), var("UIVERIFY_PASSWORD")) {
            (Some(email), Some(password)) => {
                self.credentials = Some(Credentials::new(email, password))
            }
            (Some(email), None) => {
                if let Some(credentials) = self.credentials.as_mut() {
                    credentials.email = email;
                }
            }
            (None, Some(password)) => {
                if let Some(credentials) = self.credentials.as_mut() {
                    credentials.password = password;
                }
            }
            (None, None) => {}
        }
        if let Some(chrome) = var("UIVERIFY_CHROME") {
            self.browser.chrome_executable = Some(PathBuf::from(chrome));
        }
        if let Some(dir) = var("UIVERIFY_ARTIFACT_DIR") {
            self.artifacts.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target.base_url.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "target.base_url must be an absolute URL, got '{}'",
                self.target.base_url
            )));
        }
        if self.timing.default_timeout_ms == 0 || self.timing.action_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".to_string()));
        }
        if self.timing.deadline_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "timing.deadline_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        self.timing.runner_options()
    }
}
