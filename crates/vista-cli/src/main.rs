//! Vista setup
//!
//! Usage:
//!   vista-setup install --source ~/Shows --target ~/media   # Full install
//!   vista-setup link --source ~/Shows --target ~/media      # Links only
//!   vista-setup status                                      # Show served media dir

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vista_core::config::{ConfigStore, MediaRoot, resolve_media_root};
use vista_core::fs::{LinkRecord, absolutize, link_roots};
use vista_core::job::JobManager;
use vista_core::monitor::{MonitorView, Outcome, run_monitor};
use vista_core::pipeline::Pipeline;
use vista_core::preflight;
use vista_core::protocol::ProgressEvent;
use vista_core::runtime::SystemRunner;
use vista_core::types::SetupInput;

#[derive(Parser)]
#[command(name = "vista-setup")]
#[command(about = "Provision a local media site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full installation in the background and follow its progress
    Install {
        /// Folder whose subfolders are linked into the target (repeatable)
        #[arg(long = "source", short, value_name = "DIR", required = true)]
        sources: Vec<String>,

        /// Aggregation folder that receives the links
        #[arg(long, short)]
        target: String,

        /// Python interpreter used to create the environment (e.g. "py -3")
        #[arg(long)]
        python: Option<String>,

        /// Project root (defaults to the current directory)
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Link source subfolders into the target without installing anything
    Link {
        #[arg(long = "source", short, value_name = "DIR", required = true)]
        sources: Vec<String>,

        #[arg(long, short)]
        target: String,
    },

    /// Show the persisted media directory and what will be served
    Status {
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vista=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install {
            sources,
            target,
            python,
            project,
        } => {
            run_install(SetupInput {
                source_roots: sources,
                aggregation_dir: target,
                interpreter: python,
                project_root: project,
            })
            .await
        }
        Commands::Link { sources, target } => run_link(&sources, &target),
        Commands::Status { project } => run_status(project),
    }
}

async fn run_install(input: SetupInput) -> Result<()> {
    let report = preflight::run(&input)?;
    println!("{}", style(report.bundle.describe()).dim());

    let interval = report.settings.poll_interval();
    let pipeline = Pipeline::new(report.request, report.settings, Arc::new(SystemRunner::new()));

    let mut manager = JobManager::current();
    let job = manager.start(pipeline)?;
    println!(
        "{} job {} (press Ctrl-C to stop after the current step)",
        style("Started").bold().cyan(),
        job
    );

    let view = run_monitor(&mut manager, job, interval, interrupted(), print_events).await;
    print_outcome(&view)
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("{}", style("Stop requested; waiting for the current step").yellow());
    } else {
        std::future::pending::<()>().await;
    }
}

fn print_events(events: &[ProgressEvent], _view: &MonitorView) {
    for event in events {
        match event {
            ProgressEvent::LogLine { text } if text.starts_with("ERROR:") => {
                println!("{}", style(text).red())
            }
            ProgressEvent::LogLine { text } => println!("  {text}"),
            ProgressEvent::Progress { percent, status } => println!(
                "{} {}",
                style(format!("[{:>3.0}%]", percent.clamp(0.0, 100.0))).cyan(),
                style(status).bold()
            ),
        }
    }
}

fn print_outcome(view: &MonitorView) -> Result<()> {
    match view.outcome {
        Some(Outcome::Completed) => {
            println!("{}", style(&view.status).green().bold());
            Ok(())
        }
        Some(Outcome::Stopped) => {
            println!("{}", style(&view.status).yellow().bold());
            Ok(())
        }
        Some(Outcome::Failed) | None => {
            println!("{}", style(&view.status).red().bold());
            match &view.error {
                Some(error) => anyhow::bail!("{error}"),
                None => anyhow::bail!("{}", view.status),
            }
        }
    }
}

fn run_link(sources: &[String], target: &str) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let roots = sources
        .iter()
        .filter_map(|raw| absolutize(raw, &cwd).transpose())
        .collect::<Result<Vec<_>>>()?;
    let aggregation = absolutize(target, &cwd)?
        .ok_or_else(|| anyhow::anyhow!("Missing required argument: target"))?;

    let report = link_roots(&roots, &aggregation)?;
    for record in &report.records {
        match record {
            LinkRecord::Linked(_) => println!("  {} {record}", style("✓").green()),
            LinkRecord::Failed { .. } => println!("  {} {record}", style("✗").red()),
            _ => println!("  {} {record}", style("-").dim()),
        }
    }
    println!(
        "{} linked, {} skipped, {} failed",
        report.linked().count(),
        report.skipped_count(),
        report.failed_count()
    );
    Ok(())
}

fn run_status(project: Option<PathBuf>) -> Result<()> {
    let project = match project {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let store = ConfigStore::from_project_root(&project);
    let config = store.load()?;

    println!("{}", style("Vista Status").bold());
    println!("  Config: {}", store.config_path().display());
    match &config.media_root_dir {
        Some(dir) => println!("  media_root_dir: {}", style(dir.display()).green()),
        None => println!("  media_root_dir: {}", style("(not set)").dim()),
    }

    let served = resolve_media_root(&config, &project);
    match &served {
        MediaRoot::Configured(path) => println!("  Serving: {}", path.display()),
        MediaRoot::Fallback(path) => println!(
            "  Serving: {} {}",
            path.display(),
            style("(fallback)").yellow()
        ),
        MediaRoot::Disabled => println!("  Serving: {}", style("disabled").red()),
    }
    Ok(())
}
