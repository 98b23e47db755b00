//! Check Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use uiverify::{Scenario, VerifyConfig};

use crate::output::{OutputFormat, TableDisplay, print_list, print_success};

#[derive(Args)]
pub struct CheckArgs {
    /// Scenario files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Scenario summary for listing
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub base_url: String,
    pub steps: usize,
    pub artifacts: Vec<String>,
    pub tags: Vec<String>,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name().to_string(),
            base_url: scenario.base_url().to_string(),
            steps: scenario.steps().len(),
            artifacts: scenario.expected_artifacts().iter().cloned().collect(),
            tags: scenario.tags().to_vec(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Base URL", "Steps", "Artifacts", "Tags"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.base_url.clone(),
            self.steps.to_string(),
            self.artifacts.join(", "),
            self.tags.join(", "),
        ]
    }
}

pub fn execute(args: CheckArgs, config: &VerifyConfig, format: OutputFormat) -> Result<()> {
    let scenarios = super::load_scenarios(config, &args.paths, None, None)?;
    let displays: Vec<ScenarioDisplay> = scenarios.iter().map(ScenarioDisplay::from).collect();
    print_list(&displays, format);
    if matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        print_success(&format!("{} scenario(s) valid", scenarios.len()));
    }
    Ok(())
}
