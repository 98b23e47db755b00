//! CLI commands

pub mod check;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use uiverify::{Scenario, ScenarioLoader, VerifyConfig};

/// Load every scenario under `paths`, optionally narrowed by tag and name
pub fn load_scenarios(
    config: &VerifyConfig,
    paths: &[PathBuf],
    tag: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<Scenario>> {
    let scenarios = ScenarioLoader::from_config(config)
        .load_paths(paths)
        .context("failed to load scenarios")?;

    Ok(scenarios
        .into_iter()
        .filter(|s| tag.map_or(true, |t| s.tags().iter().any(|st| st == t)))
        .filter(|s| name.map_or(true, |n| s.name() == n))
        .collect())
}
