//! Run Command

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uiverify::{ArtifactStore, ChromiumSessionFactory, RunResult, VerificationRunner, VerifyConfig};

use crate::output::{OutputFormat, TableDisplay, print_list};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Run only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Scenarios to run concurrently, each in its own browser
    #[arg(long, default_value = "1")]
    pub parallel: usize,

    /// Artifact directory
    #[arg(long)]
    pub artifacts: Option<PathBuf>,

    /// Base URL of the application under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

/// One row per scenario result
#[derive(Serialize)]
#[serde(transparent)]
pub struct ResultDisplay<'a>(pub &'a RunResult);

impl TableDisplay for ResultDisplay<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Status", "Duration", "Failed Step", "Cause", "Artifacts"]
    }

    fn row(&self) -> Vec<String> {
        let result = self.0;
        let mut paths: Vec<String> = result
            .artifacts()
            .iter()
            .map(|a| a.path.display().to_string())
            .collect();

        let (status, step, cause) = match result.failure() {
            None => ("passed", String::new(), String::new()),
            Some(failure) => {
                if let Some(diagnostic) = &failure.diagnostic {
                    paths.push(diagnostic.path.display().to_string());
                }
                let step = match (failure.step_index, &failure.step) {
                    (Some(index), Some(step)) => format!("#{} {}", index, step),
                    _ => "-".to_string(),
                };
                ("failed", step, failure.cause.to_string())
            }
        };

        vec![
            result.scenario().to_string(),
            status.to_string(),
            format!("{} ms", result.duration_ms()),
            step,
            cause,
            paths.join("\n"),
        ]
    }
}

/// Apply command line overrides on top of file and environment configuration
pub fn apply_overrides(args: &RunArgs, config: &mut VerifyConfig) {
    if let Some(url) = &args.base_url {
        config.target.base_url = url.clone();
    }
    if let Some(dir) = &args.artifacts {
        config.artifacts.dir = dir.clone();
    }
    if args.headed {
        config.browser.headless = false;
    }
}

pub async fn execute(
    args: RunArgs,
    mut config: VerifyConfig,
    format: OutputFormat,
) -> Result<ExitCode> {
    apply_overrides(&args, &mut config);
    config.validate()?;

    let scenarios = super::load_scenarios(
        &config,
        &args.paths,
        args.tag.as_deref(),
        args.name.as_deref(),
    )?;
    if scenarios.is_empty() {
        bail!("no scenarios matched");
    }

    let runner = VerificationRunner::new(
        ChromiumSessionFactory::new(config.browser.clone()),
        ArtifactStore::new(&config.artifacts.dir),
    )
    .with_options(config.runner_options());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling remaining scenarios");
            on_interrupt.cancel();
        }
    });

    info!("Running {} scenario(s)...", scenarios.len());
    let results = runner.run_many_until(&scenarios, args.parallel, &cancel).await;

    let displays: Vec<ResultDisplay> = results.iter().map(ResultDisplay).collect();
    print_list(&displays, format);

    let failed = results.iter().filter(|r| !r.is_completed()).count();
    info!("Results: {} passed, {} failed", results.len() - failed, failed);

    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
