mod batch;
mod browser;
mod config;
mod error;
mod export;
mod html;
mod model;
mod periods;
mod progress;
mod resolver;
mod retry;
mod session;
mod store;

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::BatchOptions;
use crate::browser::{ChromeDriver, Driver, ScrapeContext};
use crate::config::{Settings, Target};
use crate::error::StageError;
use crate::model::ResolutionOutcome;
use crate::progress::BatchProgress;
use crate::resolver::ResolveOptions;
use crate::store::SessionStore;

#[derive(Parser)]
#[command(name = "sil_scraper", about = "Legislative session scraper for the SIL portal")]
struct Cli {
    /// TOML settings file (default: ./sil_scraper.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Show the browser window
    #[arg(long, global = true)]
    visible: bool,
    /// Only this target (e.g. "senadores")
    #[arg(long, global = true)]
    target: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the list of legislative periods from the portal
    Periods,
    /// Resolve each period into its session links
    Links {
        /// Also retry periods that ended in an error
        #[arg(long)]
        redo_failed: bool,
    },
    /// Scrape session pages into per-session workbooks
    Sessions {
        /// Only sessions of this period (e.g. "LXV")
        #[arg(long)]
        period: Option<String>,
        /// Max sessions to scrape (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Scrape again even when an artifact exists
        #[arg(long)]
        no_resume: bool,
    },
    /// Periods + links + sessions in one go
    Run {
        /// Max sessions to scrape per target
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show what has been harvested so far
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = config::load(cli.config.as_deref())?;
    if cli.visible {
        settings.headless = false;
    }
    let settings = Arc::new(settings);
    let targets = settings.select_targets(cli.target.as_deref())?;

    let interrupted = match cli.command {
        Commands::Status => {
            print_status(&settings, &targets)?;
            false
        }
        command => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current step");
                    on_signal.cancel();
                }
            });
            tokio::task::spawn_blocking(move || run_stages(command, settings, targets, cancel))
                .await??
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    if interrupted {
        println!("Interrupted. Re-run the same command to pick up where it stopped.");
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

/// Drive the requested stages over every target with one browser session.
/// Returns whether the run was interrupted.
fn run_stages(
    command: Commands,
    settings: Arc<Settings>,
    targets: Vec<Target>,
    cancel: CancellationToken,
) -> anyhow::Result<bool> {
    let driver = ChromeDriver::launch(settings.headless, settings.timeouts.page())?;
    let mut ctx = ScrapeContext::new(driver, settings, cancel);

    for target in &targets {
        if ctx.is_cancelled() {
            return Ok(true);
        }
        let interrupted = match &command {
            Commands::Periods => enumerate_stage(&mut ctx, target)?,
            Commands::Links { redo_failed } => links_stage(
                &mut ctx,
                target,
                ResolveOptions {
                    redo_failed: *redo_failed,
                },
            )?,
            Commands::Sessions {
                period,
                limit,
                no_resume,
            } => {
                let options = BatchOptions {
                    period: period.clone(),
                    limit: *limit,
                    no_resume: *no_resume,
                };
                sessions_stage(&mut ctx, target, &options)?
            }
            Commands::Run { limit } => {
                let options = BatchOptions {
                    limit: *limit,
                    ..BatchOptions::default()
                };
                enumerate_stage(&mut ctx, target)?
                    || links_stage(&mut ctx, target, ResolveOptions::default())?
                    || sessions_stage(&mut ctx, target, &options)?
            }
            Commands::Status => false,
        };
        if interrupted {
            return Ok(true);
        }
    }
    Ok(false)
}

fn enumerate_stage<D: Driver>(ctx: &mut ScrapeContext<D>, target: &Target) -> anyhow::Result<bool> {
    let path = ctx.settings.periods_path(target);
    let mut fresh = match periods::enumerate(ctx, target) {
        Err(StageError::Cancelled) => {
            println!("{}: interrupted before the period list was read, nothing saved", target.name);
            return Ok(true);
        }
        other => other?,
    };

    if path.exists() {
        match store::read_periods(&path) {
            Ok(previous) => {
                let kept = periods::keep_outcomes(&mut fresh, &previous);
                if kept > 0 {
                    info!(target = %target.name, kept, "Kept outcomes from the previous period file");
                }
            }
            Err(e) => warn!("Previous period file ignored: {}", e),
        }
    }

    store::write_periods(&path, &fresh)?;
    println!("{}: {} periods saved to {}", target.name, fresh.len(), path.display());
    Ok(ctx.is_cancelled())
}

fn links_stage<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    options: ResolveOptions,
) -> anyhow::Result<bool> {
    let path = ctx.settings.periods_path(target);
    let mut list = store::read_periods(&path)
        .with_context(|| format!("no period list for {}, run 'periods' first", target.name))?;

    let report = resolver::resolve_all(ctx, target, &mut list, options, |p| {
        store::write_periods(&path, p)
    })?;
    report.print(&target.name);
    Ok(report.interrupted)
}

fn sessions_stage<D: Driver>(
    ctx: &mut ScrapeContext<D>,
    target: &Target,
    options: &BatchOptions,
) -> anyhow::Result<bool> {
    let path = ctx.settings.periods_path(target);
    let list = store::read_periods(&path)
        .with_context(|| format!("no period list for {}, run 'periods' and 'links' first", target.name))?;
    let store = SessionStore::open(&ctx.settings.output_dir(target))?;

    let summary = batch::scrape_sessions(ctx, target, &list, &store, options, BatchProgress::new)?;
    summary.print(&target.name);
    Ok(summary.interrupted)
}

fn print_status(settings: &Settings, targets: &[Target]) -> anyhow::Result<()> {
    println!(
        "{:<12} | {:>7} | {:>8} | {:>7} | {:>6} | {:>6} | {:>10} | {:>8} | {:>9}",
        "Target", "Periods", "Resolved", "Skipped", "Errors", "Links", "Incomplete", "Sessions", "Remaining"
    );
    println!("{}", "-".repeat(100));

    for target in targets {
        let path = settings.periods_path(target);
        let list = if path.exists() {
            store::read_periods(&path)?
        } else {
            Vec::new()
        };

        let (mut resolved, mut skipped, mut errors, mut incomplete) = (0, 0, 0, 0);
        for outcome in list.iter().filter_map(|p| p.data.as_ref()) {
            match outcome {
                ResolutionOutcome::Resolved {
                    all_links_present, ..
                } => {
                    resolved += 1;
                    if !all_links_present {
                        incomplete += 1;
                    }
                }
                ResolutionOutcome::Skipped { .. } => skipped += 1,
                ResolutionOutcome::Error { .. } => errors += 1,
            }
        }

        let urls = batch::session_urls(&list, None);
        let out_dir = settings.output_dir(target);
        let completed = if out_dir.is_dir() {
            SessionStore::open(&out_dir)?.completed_urls()?
        } else {
            HashSet::new()
        };
        let remaining = urls.iter().filter(|u| !completed.contains(*u)).count();

        println!(
            "{:<12} | {:>7} | {:>8} | {:>7} | {:>6} | {:>6} | {:>10} | {:>8} | {:>9}",
            truncate(&target.name, 12),
            list.len(),
            resolved,
            skipped,
            errors,
            urls.len(),
            incomplete,
            completed.len(),
            remaining
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 1).collect();
        format!("{}~", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
