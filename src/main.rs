use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tas::config::{DEFAULT_CONFIG_PATH, RunContext, RunnerConfig};
use tas::deplister::{DEFAULT_WORK_DIR, DependencyLister};
use tas::host::CommandHost;
use tas::report::ReportClient;
use tas::{Runner, Selection};
use tas_core::ExecutionPlan;
use tas_core::locator::parse_locator_list;

/// Test-at-scale runner
///
/// Discovers tests through a host framework, gives every test a stable
/// identity, selects the tests a change can affect, and runs them while
/// honouring the blocklist/quarantine policy. Result documents are printed
/// to stdout and, when an endpoint is configured, POSTed to it.
///
/// CI coordinates (REPO_ID, BUILD_ID, ...) are read from the environment.
#[derive(Parser)]
#[command(name = "tas")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file [default: <repo-root>/.tas/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host framework command; overrides `[host] command`
    #[arg(long, global = true, env = "TAS_HOST_COMMAND")]
    host_command: Option<String>,

    #[command(flatten)]
    context: RunContext,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tests and suites and compute the impacted set
    Discover(DiscoverArgs),

    /// Run tests and collect results
    ///
    /// Without --locator-file or --locator-list every test matched by
    /// --pattern runs once.
    Execute(ExecuteArgs),

    /// Check whether the dependency lister answers
    Ping,
}

#[derive(Args)]
struct DiscoverArgs {
    /// Test file glob, relative to the repo root (repeatable)
    #[arg(long, num_args = 1..)]
    pattern: Vec<String>,

    /// Files changed by the commit under test (repeatable)
    #[arg(long, num_args = 1..)]
    diff: Vec<PathBuf>,
}

#[derive(Args)]
struct ExecuteArgs {
    /// Test file glob, relative to the repo root (repeatable)
    #[arg(long, num_args = 1..)]
    pattern: Vec<String>,

    /// Execution plan JSON ({"mode": ..., "locators": [{"locator", "n"}]})
    #[arg(long, conflicts_with = "locator_list")]
    locator_file: Option<PathBuf>,

    /// File of `#TAS#`-separated locators to run once
    #[arg(long)]
    locator_list: Option<PathBuf>,
}

#[derive(Serialize)]
struct PingReport {
    available: bool,
}

fn main() -> Result<()> {
    let _telemetry = tas::telemetry::init();
    let cli = Cli::parse();

    let mut ctx = cli.context;
    ctx.repo_root = std::fs::canonicalize(&ctx.repo_root)
        .with_context(|| format!("repository root {}", ctx.repo_root.display()))?;
    let config_path = cli
        .config
        .unwrap_or_else(|| ctx.repo_root.join(DEFAULT_CONFIG_PATH));
    let config = RunnerConfig::load(&config_path)?;
    let ctx = ctx.with_config(&config);

    let work_dir = config
        .deps
        .work_dir
        .as_ref()
        .map_or_else(|| ctx.repo_root.join(DEFAULT_WORK_DIR), |d| ctx.repo_root.join(d));
    let lister = DependencyLister::new(ctx.smart_binary.clone(), work_dir);

    if matches!(cli.command, Commands::Ping) {
        let available = lister.is_available();
        print_json(&PingReport { available })?;
        if !available {
            bail!("dependency lister is not available");
        }
        return Ok(());
    }

    let Some(command) = cli.host_command.or_else(|| config.host.command.clone()) else {
        bail!(
            "no host framework configured\n  \
             Set `[host] command` in {} or pass --host-command",
            config_path.display()
        );
    };
    let host = CommandHost::new(command, ctx.repo_root.clone());
    let runner = Runner::new(host, ctx)
        .with_lister(lister)
        .with_reporter(ReportClient::new(config.report.timeout())?);

    match cli.command {
        Commands::Discover(args) => {
            let result = runner.discover(&args.pattern, &args.diff)?;
            print_json(&result)
        }
        Commands::Execute(args) => {
            let selection = selection(&args)?;
            let results = runner.execute(&args.pattern, &selection)?;
            print_json(&results)
        }
        Commands::Ping => Ok(()),
    }
}

fn selection(args: &ExecuteArgs) -> Result<Selection> {
    if let Some(path) = &args.locator_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading execution plan {}", path.display()))?;
        return Ok(Selection::Plan(ExecutionPlan::from_json(&text)?));
    }
    if let Some(path) = &args.locator_list {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading locator list {}", path.display()))?;
        return Ok(Selection::Locators(parse_locator_list(&text)));
    }
    Ok(Selection::All)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
