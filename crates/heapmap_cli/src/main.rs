//! HEAPMAP CLI
//!
//! Inspect a recorded heap log: counts, per-step page occupancy,
//! checkpoints and touched pages.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use heapmap_log::FileSource;
use heapmap_replay::{ReplayConfig, ReplayDiagnostic, Session, StepState, TouchedDiff};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Log filter used when `HEAPMAP_LOG` is unset
const DEFAULT_FILTER: &str = "heapmap_log=warn,heapmap_replay=info";

#[derive(Parser)]
#[command(name = "heapmap")]
#[command(about = "HEAPMAP - replay heap allocation logs page by page", long_about = None)]
struct Cli {
    /// Path to the heap log
    #[arg(short, long, global = true, default_value = "heapmap.log")]
    log: PathBuf,
    /// JSON file with replay configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Snapshot the live set every N steps
    #[arg(long, global = true)]
    snapshot_interval: Option<usize>,
    /// Report the whole span of freed allocations as touched
    #[arg(long, global = true)]
    exact_free_span: bool,
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the log
    Inspect,
    /// Show live allocations and page occupancy at a step
    State {
        /// Step (number of events applied)
        #[arg(short, long, conflicts_with = "percent")]
        step: Option<usize>,
        /// Position as a percentage of the timeline
        #[arg(short, long)]
        percent: Option<f64>,
    },
    /// List checkpoint steps
    Checkpoints,
    /// Show the pages touched by the event at a step
    Touched {
        /// Step of the event
        #[arg(short, long)]
        step: usize,
    },
}

#[derive(Serialize)]
struct Summary {
    events: usize,
    pages: usize,
    checkpoints: usize,
    skipped_records: usize,
    replay_diagnostics: usize,
    live_at_end: usize,
    live_bytes_at_end: u128,
}

#[derive(Serialize)]
struct PageReport {
    index: usize,
    page: u64,
    bytes: u64,
}

#[derive(Serialize)]
struct StateReport<'a> {
    step: usize,
    checkpoint: bool,
    event_count: usize,
    pending: String,
    live: Vec<(u64, u64)>,
    pages: Vec<PageReport>,
    diagnostics: &'a [ReplayDiagnostic],
    diagnostics_total: usize,
}

#[derive(Serialize)]
struct TouchedReport {
    step: usize,
    event: String,
    pages: Vec<PageReport>,
    changed: bool,
    entered: Vec<usize>,
    left: Vec<usize>,
}

fn load_config(cli: &Cli) -> Result<ReplayConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(interval) = cli.snapshot_interval {
        config.snapshot_interval = interval;
    }
    if cli.exact_free_span {
        config.exact_free_span = true;
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<ReplayConfig> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).wrap_err_with(|| format!("parsing config {}", path.display()))
}

fn page_report(session: &Session, index: usize, bytes: u64) -> PageReport {
    PageReport {
        index,
        page: session.page_map().page_at(index).unwrap_or_default(),
        bytes,
    }
}

fn state_report<'a>(session: &Session, state: &'a StepState) -> StateReport<'a> {
    StateReport {
        step: state.step,
        checkpoint: session.checkpoints().contains(state.step),
        event_count: session.event_count(),
        pending: state.pending_description(),
        live: state.live.iter().collect(),
        pages: state
            .occupied_pages()
            .map(|(index, bytes)| page_report(session, index, bytes))
            .collect(),
        diagnostics: &state.diagnostics,
        diagnostics_total: state.diagnostics_total,
    }
}

fn emit_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

async fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = load_config(&cli)?;
    tracing::debug!(?config, log = %cli.log.display(), "opening heap log");
    let source = FileSource::new(&cli.log);
    let session = Session::open(&source, config)
        .await
        .wrap_err_with(|| format!("loading {}", cli.log.display()))?;

    match cli.command {
        Commands::Inspect => {
            let end = session.compute_state(session.event_count())?;
            let summary = Summary {
                events: session.event_count(),
                pages: session.page_count(),
                checkpoints: session.checkpoints().len(),
                skipped_records: session.decode_diagnostics().len(),
                replay_diagnostics: session.timeline_diagnostics().len(),
                live_at_end: end.live.len(),
                live_bytes_at_end: end.live.total_bytes(),
            };
            if cli.json {
                return emit_json(out, &summary);
            }
            writeln!(out, "log:                {}", cli.log.display())?;
            writeln!(out, "events:             {}", summary.events)?;
            writeln!(out, "pages:              {}", summary.pages)?;
            writeln!(out, "checkpoints:        {}", summary.checkpoints)?;
            writeln!(out, "skipped records:    {}", summary.skipped_records)?;
            writeln!(out, "replay diagnostics: {}", summary.replay_diagnostics)?;
            writeln!(
                out,
                "live at end:        {} ({} bytes)",
                summary.live_at_end, summary.live_bytes_at_end
            )?;
            for diagnostic in session.decode_diagnostics() {
                writeln!(out, "  {}", diagnostic)?;
            }
            for diagnostic in session.timeline_diagnostics() {
                writeln!(out, "  {}", diagnostic)?;
            }
        }
        Commands::State { step, percent } => {
            let step = match (step, percent) {
                (Some(step), _) => step,
                (None, Some(percent)) => heapmap_log::at_percent(percent, session.event_count()),
                (None, None) => session.event_count(),
            };
            let state = session.compute_state(step)?;
            let report = state_report(&session, &state);
            if cli.json {
                return emit_json(out, &report);
            }
            writeln!(
                out,
                "step {}/{}{} (next: {})",
                report.step,
                report.event_count,
                if report.checkpoint { " [checkpoint]" } else { "" },
                report.pending
            )?;
            writeln!(
                out,
                "live allocations: {} ({} bytes)",
                state.live.len(),
                state.live.total_bytes()
            )?;
            for (pointer, size) in &report.live {
                writeln!(out, "  0x{:x}  {}", pointer, size)?;
            }
            writeln!(out, "occupied pages: {}/{}", report.pages.len(), session.page_count())?;
            for page in &report.pages {
                writeln!(out, "  [{}] 0x{:x}  {}", page.index, page.page, page.bytes)?;
            }
            if report.diagnostics_total > 0 {
                writeln!(out, "diagnostics: {}", report.diagnostics_total)?;
                for diagnostic in report.diagnostics {
                    writeln!(out, "  {}", diagnostic)?;
                }
            }
        }
        Commands::Checkpoints => {
            let steps: Vec<usize> = session.checkpoints().iter().collect();
            if cli.json {
                return emit_json(out, &steps);
            }
            for step in steps {
                writeln!(out, "{}", step)?;
            }
        }
        Commands::Touched { step } => {
            if step > session.event_count() {
                return Err(heapmap_core::CoreError::StepOutOfRange {
                    step,
                    event_count: session.event_count(),
                }
                .into());
            }
            let pages = session.touched_pages(step)?;
            let before = match step.checked_sub(1) {
                Some(previous) => session.touched_pages(previous)?,
                None => Default::default(),
            };
            let diff = TouchedDiff::compute(&before, &pages);
            let report = TouchedReport {
                step,
                event: session
                    .events()
                    .get(step)
                    .map_or_else(|| "none".to_string(), |e| e.describe()),
                pages: pages
                    .into_iter()
                    .map(|index| page_report(&session, index, 0))
                    .collect(),
                changed: diff.has_changes(),
                entered: diff.entered.into_iter().collect(),
                left: diff.left.into_iter().collect(),
            };
            if cli.json {
                return emit_json(out, &report);
            }
            writeln!(out, "step {}: {}", report.step, report.event)?;
            for page in &report.pages {
                writeln!(out, "  [{}] 0x{:x}", page.index, page.page)?;
            }
            if report.changed {
                writeln!(out, "entered: {:?}", report.entered)?;
                writeln!(out, "left:    {:?}", report.left)?;
            } else {
                writeln!(out, "same pages as step {}", step.saturating_sub(1))?;
            }
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HEAPMAP_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out).await
}
