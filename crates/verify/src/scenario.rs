//! Scenarios: named, ordered, immutable step plans
//!
//! Scenarios are either built in code with [`Scenario::builder`] or loaded from
//! YAML files with [`ScenarioLoader`]. Both paths go through the same
//! validation, so a malformed scenario never starts executing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::artifact::{diagnostic_name, is_valid_name};
use crate::condition::Condition;
use crate::config::{AuthForm, Credentials, TargetConfig, VerifyConfig};
use crate::error::{InvalidScenarioError, LoadError};
use crate::locator::Locator;
use crate::step::Step;

/// A named, ordered plan of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    name: String,
    description: String,
    tags: Vec<String>,
    base_url: String,
    steps: Vec<Step>,
    expected_artifacts: BTreeSet<String>,
}

impl Scenario {
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn expected_artifacts(&self) -> &BTreeSet<String> {
        &self.expected_artifacts
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}

/// The three steps that sign in through the login form
pub fn authenticate_steps(credentials: &Credentials, form: &AuthForm) -> Vec<Step> {
    vec![
        Step::fill(Locator::label(&form.email_label), &credentials.email),
        Step::fill(Locator::label(&form.password_label), &credentials.password),
        Step::click(Locator::role("button", &form.submit_button)),
    ]
}

/// Fluent construction of a [`Scenario`]
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    description: String,
    tags: Vec<String>,
    base_url: String,
    steps: Vec<Step>,
    expected_artifacts: Vec<String>,
}

impl ScenarioBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            base_url: TargetConfig::default().base_url,
            steps: Vec::new(),
            expected_artifacts: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn navigate(self, url: impl Into<String>) -> Self {
        self.step(Step::navigate(url))
    }

    pub fn fill(self, locator: Locator, value: impl Into<String>) -> Self {
        self.step(Step::fill(locator, value))
    }

    pub fn click(self, locator: Locator) -> Self {
        self.step(Step::click(locator))
    }

    /// Wait using the runner's default timeout
    pub fn wait_for(self, condition: Condition) -> Self {
        self.step(Step::wait_for(condition, None))
    }

    pub fn wait_for_within(self, condition: Condition, timeout: Duration) -> Self {
        self.step(Step::wait_for(condition, Some(timeout)))
    }

    pub fn capture(self, name: impl Into<String>) -> Self {
        self.step(Step::capture(name))
    }

    pub fn capture_full_page(self, name: impl Into<String>) -> Self {
        self.step(Step::Capture {
            name: name.into(),
            full_page: true,
        })
    }

    pub fn log(self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.step(Step::Log {
            name: name.into(),
            message: message.into(),
        })
    }

    pub fn authenticate(self, credentials: &Credentials, form: &AuthForm) -> Self {
        self.steps(authenticate_steps(credentials, form))
    }

    /// Declare an artifact the scenario must produce
    pub fn expect_artifact(mut self, name: impl Into<String>) -> Self {
        self.expected_artifacts.push(name.into());
        self
    }

    pub fn build(self) -> Result<Scenario, InvalidScenarioError> {
        let invalid = |reason: String| InvalidScenarioError::new(&self.name, reason);

        if !is_valid_name(&self.name) {
            return Err(invalid(
                "name may only contain letters, digits, '.', '-' and '_'".to_string(),
            ));
        }
        if !self.base_url.contains("://") {
            return Err(invalid(format!("base URL '{}' is not absolute", self.base_url)));
        }
        if self.steps.is_empty() {
            return Err(invalid("scenario has no steps".to_string()));
        }

        let reserved = diagnostic_name(&self.name);
        let mut expected = BTreeSet::new();
        for name in &self.expected_artifacts {
            if !is_valid_name(name) {
                return Err(invalid(format!("artifact name '{}' is not valid", name)));
            }
            if *name == reserved {
                return Err(invalid(format!(
                    "artifact name '{}' is reserved for diagnostics",
                    name
                )));
            }
            if !expected.insert(name.clone()) {
                return Err(invalid(format!("artifact '{}' is declared twice", name)));
            }
        }

        let mut produced = BTreeSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            for locator in step.locators() {
                locator
                    .validate()
                    .map_err(|e| invalid(format!("step {}: {}", index, e)))?;
            }
            if let Step::WaitFor { timeout_ms: Some(0), .. } = step {
                return Err(invalid(format!(
                    "step {}: wait timeout must be greater than zero",
                    index
                )));
            }
            if let Some(name) = step.artifact_name() {
                if !expected.contains(name) {
                    return Err(invalid(format!(
                        "step {} writes artifact '{}' which is not declared",
                        index, name
                    )));
                }
                if !produced.insert(name.to_string()) {
                    return Err(invalid(format!(
                        "artifact '{}' is written by more than one step",
                        name
                    )));
                }
            }
        }

        if let Some(missing) = expected.difference(&produced).next() {
            return Err(invalid(format!("declared artifact '{}' is never produced", missing)));
        }

        Ok(Scenario {
            name: self.name,
            description: self.description,
            tags: self.tags,
            base_url: self.base_url,
            steps: self.steps,
            expected_artifacts: expected,
        })
    }
}

/// On-disk shape of a scenario file
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    artifacts: Vec<String>,
    steps: Vec<serde_yaml::Value>,
}

/// Loads scenario files, filling in configured base URL and credentials
#[derive(Debug, Clone)]
pub struct ScenarioLoader {
    base_url: String,
    credentials: Option<Credentials>,
    auth: AuthForm,
}

impl Default for ScenarioLoader {
    fn default() -> Self {
        Self::new(TargetConfig::default().base_url)
    }
}

impl ScenarioLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            auth: AuthForm::default(),
        }
    }

    pub fn from_config(config: &VerifyConfig) -> Self {
        Self {
            base_url: config.target.base_url.clone(),
            credentials: config.credentials.clone(),
            auth: config.auth.clone(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_auth_form(mut self, auth: AuthForm) -> Self {
        self.auth = auth;
        self
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(&self, yaml: &str) -> Result<Scenario, LoadError> {
        let file: ScenarioFile = serde_yaml::from_str(yaml)?;

        let mut steps = Vec::with_capacity(file.steps.len());
        for (index, raw) in file.steps.into_iter().enumerate() {
            let action = raw.get("action").and_then(|a| a.as_str()).unwrap_or_default();
            match action {
                "authenticate" => {
                    let credentials = self.credentials.as_ref().ok_or_else(|| {
                        InvalidScenarioError::new(
                            &file.name,
                            format!("step {} needs credentials but none are configured", index),
                        )
                    })?;
                    steps.extend(authenticate_steps(credentials, &self.auth));
                }
                "sleep" => {
                    return Err(InvalidScenarioError::new(
                        &file.name,
                        format!(
                            "step {}: fixed sleeps are not supported, wait for a condition instead",
                            index
                        ),
                    )
                    .into());
                }
                _ => steps.push(serde_yaml::from_value::<Step>(raw)?),
            }
        }

        let mut builder = Scenario::builder(file.name)
            .description(file.description)
            .base_url(file.base_url.unwrap_or_else(|| self.base_url.clone()))
            .steps(steps);
        for tag in file.tags {
            builder = builder.tag(tag);
        }
        for artifact in file.artifacts {
            builder = builder.expect_artifact(artifact);
        }
        Ok(builder.build()?)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(&self, path: &Path) -> Result<Scenario, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.from_yaml(&content)
    }

    /// Load every `.yaml`/`.yml` file under a directory, ordered by path
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<Scenario>, LoadError> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| self.from_file(p)).collect()
    }

    /// Load files and directories alike
    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<Vec<Scenario>, LoadError> {
        let mut scenarios = Vec::new();
        for path in paths {
            if path.is_dir() {
                scenarios.extend(self.load_dir(path)?);
            } else {
                scenarios.push(self.from_file(path)?);
            }
        }
        Ok(scenarios)
    }
}
