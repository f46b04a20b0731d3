//! Owlgorithm CLI - Duolingo course progress tracker.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use owl_core::{normalize_events, Event, RawEvent, TrackerConfig};
use owl_progress::{DailyProgress, ProgressReport, ProgressTracker, UnitAnalysis};
use owl_report::{compose, DayContext, MarkdownUpdater, Notification, TimeSlot};
use owl_scrape::ActivityScraper;
use owl_storage::{JsonStateStore, StateStore, TrackerState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "owlgorithm")]
#[command(about = "Duolingo course progress tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "owlgorithm.json")]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape, analyse, persist and report
    Update {
        /// Parse a saved profile page instead of fetching
        #[arg(long)]
        offline: Option<PathBuf>,
        /// Skip the push notification
        #[arg(long)]
        no_notify: bool,
    },
    /// Run attribution and projection over a saved event list
    Analyze {
        /// JSON array of event records
        #[arg(long)]
        events: PathBuf,
        /// Day to project from (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Show stored state
    Status,
    /// Send a test notification
    NotifyTest,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = TrackerConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Update { offline, no_notify } => {
            let _lock = UpdateLock::acquire(&config.paths.lock_file)?;
            update(&config, offline.as_deref(), !no_notify).await?;
        }
        Commands::Analyze { events, today } => {
            analyze(&config, &events, today.unwrap_or_else(|| Local::now().date_naive()))?;
        }
        Commands::Status => {
            let store = JsonStateStore::new(&config.paths.state_file, &config.paths.backup_dir);
            if !store.exists().await {
                println!("No state yet at {}; run `owlgorithm update`", store.path().display());
                return Ok(());
            }
            let state = store.load().await.context("Failed to load state")?;
            print_state(&state);
        }
        Commands::NotifyTest => {
            let notifier = owl_report::from_config(&config.notifier);
            let sent = notifier
                .send(&Notification::test(Local::now().format("%H:%M:%S")))
                .await
                .context("Failed to send test notification")?;
            if sent {
                println!("Test notification sent");
            } else {
                println!("Notifications are not configured (set notifier.enabled, app_token and user_key)");
            }
        }
    }

    Ok(())
}

/// One full update cycle.
async fn update(config: &TrackerConfig, offline: Option<&Path>, notify: bool) -> Result<()> {
    let mut scraper = ActivityScraper::new(&config.base_url, config.retry.clone())?;
    let scraped = match offline {
        Some(path) => {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            scraper.parse_offline(&html)?
        }
        None => scraper
            .scrape(&config.username)
            .await
            .with_context(|| format!("Failed to scrape activity for {}", config.username))?,
    };
    let events = scraped.events;
    if events.is_empty() {
        bail!("No activity found; refusing to overwrite state with an empty history");
    }

    let now = Local::now();
    let today = now.date_naive();
    if let Err(e) = save_snapshot(&config.paths.events_dir, today, &events) {
        warn!(error = %e, "failed to save event snapshot");
    }

    let store = JsonStateStore::new(&config.paths.state_file, &config.paths.backup_dir);
    let mut state = store.load().await.context("Failed to load state")?;
    state.roll_day(today, config.goal.daily_goal_lessons);

    let tracker = ProgressTracker::new(config);
    let report = tracker.report(&events, state.last_lessons_per_unit, today);

    let reviewed = report
        .analysis
        .as_ref()
        .map(|a| a.reviewed_units.clone())
        .unwrap_or_default();
    let new_units = state.record_scrape(today, events.len() as u64, report.daily.completed, reviewed);
    if report.ratio_source == owl_progress::RatioSource::Fresh {
        state.record_ratio(report.lessons_per_unit, report.units_analyzed());
    }
    state.touch(Utc::now());
    store.save(&state).await.context("Failed to save state")?;
    for unit in &new_units {
        info!(unit = %unit, "unit completed");
    }

    if config.paths.markdown_file.exists() {
        MarkdownUpdater::new()?
            .update_file(&config.paths.markdown_file, &report, &config.goal, today)
            .await
            .context("Failed to update markdown report")?;
    } else {
        warn!(path = %config.paths.markdown_file.display(), "markdown report not found, skipped");
    }

    if notify {
        let ctx = DayContext {
            today: report.daily,
            streak: report.metrics.as_ref().map_or(0, |m| m.consecutive_days),
            yesterday: state
                .yesterday(today)
                .map(|y| DailyProgress::new(y.completed, y.goal)),
            units_completed: new_units.len(),
            course_percentage: report
                .snapshot
                .course_completion_percentage(config.goal.total_course_units)
                .get(),
        };
        let notification = compose(TimeSlot::at(now), &ctx);
        if let Err(e) = owl_report::from_config(&config.notifier).send(&notification).await {
            warn!(error = %e, "failed to send notification");
        }
    }

    print_report(&report, config);
    Ok(())
}

/// Analyse a saved event list without touching state.
fn analyze(config: &TrackerConfig, path: &Path, today: NaiveDate) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: Vec<RawEvent> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse events in {}", path.display()))?;
    let normalized = normalize_events(raw);
    if normalized.dropped > 0 {
        println!("Dropped {} malformed records", normalized.dropped);
    }

    let report = ProgressTracker::new(config).report(&normalized.events, None, today);
    match &report.analysis {
        Some(analysis) => print_analysis(analysis),
        None => println!("Not enough unit data; using {} ratio", report.ratio_source.as_str()),
    }
    print_report(&report, config);
    Ok(())
}

/// Write the scraped events as a dated JSON snapshot.
fn save_snapshot(dir: &Path, today: NaiveDate, events: &[Event]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("activity_{}.json", today.format("%Y-%m-%d")));
    let raw: Vec<RawEvent> = events.iter().map(RawEvent::from).collect();
    std::fs::write(&path, serde_json::to_string_pretty(&raw)?)?;
    Ok(path)
}

fn print_analysis(analysis: &UnitAnalysis) {
    println!("Unit boundaries ({}):", analysis.boundaries.len());
    for (boundary, count) in analysis.boundaries.iter().zip(&analysis.raw_counts) {
        println!(
            "  {} | {:>4} lessons | {}",
            boundary.start_time.format("%Y-%m-%d %H:%M"),
            count.lessons,
            boundary.unit_name
        );
    }
    for fold in &analysis.folds {
        println!(
            "  folded {} ({} lessons) into {} ({:?})",
            fold.unit, fold.lessons, fold.into, fold.direction
        );
    }
    for excluded in &analysis.excluded {
        println!(
            "  excluded {} ({} lessons, {:?})",
            excluded.unit, excluded.lessons, excluded.reason
        );
    }
    if let Some(unit) = analysis.in_progress_unit() {
        println!("  in progress: {unit}");
    }
    println!(
        "Average: {:.1} lessons/unit over {} units ({} lessons, {} unassigned)",
        analysis.average_lessons_per_unit,
        analysis.completed_units_analyzed(),
        analysis.total_lessons_analyzed,
        analysis.unassigned_events
    );
}

fn print_report(report: &ProgressReport, config: &TrackerConfig) {
    let s = &report.snapshot;
    let show = |v: Option<f64>| v.map_or_else(|| owl_report::CALCULATING.to_string(), |v| format!("{v:.1}"));

    println!("Progress on {}", report.today);
    println!("  Lessons completed: {}", s.total_lessons_completed);
    println!(
        "  Lessons/unit: {:.1} ({})",
        report.lessons_per_unit,
        report.ratio_source.as_str()
    );
    println!(
        "  Units: {} done, {} remaining of {}",
        show(s.completed_units.get()),
        show(s.remaining_units.get()),
        config.goal.total_course_units
    );
    println!("  Days remaining: {}", s.days_remaining);
    println!("  Required: {} lessons/day", show(s.required_lessons_per_day.get()));
    println!("  Current: {:.1} lessons/day", s.current_daily_average);
    println!("  Pace: {}", s.pace_status.as_str());
    println!(
        "  Projected completion: {}",
        s.projected_completion_date
            .get()
            .map_or_else(|| owl_report::CALCULATING.to_string(), |d| d.to_string())
    );
    println!(
        "  Today: {}/{} lessons ({:?})",
        report.daily.completed, report.daily.goal, report.daily.status
    );
}

fn print_state(state: &TrackerState) {
    println!("Owlgorithm State (schema {})", state.schema_version);
    let date = |d: Option<NaiveDate>| d.map_or_else(|| "never".to_string(), |d| d.to_string());
    println!("  Last scrape: {}", date(state.last_scrape_date));
    println!("  Total lessons: {}", state.total_lessons_completed);
    println!(
        "  Today: {} lessons ({})",
        state.daily_lessons_completed,
        date(state.last_daily_reset)
    );
    println!("  Units completed: {}", state.processed_units.len());
    match state.last_lessons_per_unit {
        Some(ratio) => println!(
            "  Lessons/unit: {:.1} over {} units",
            ratio, state.last_units_analyzed
        ),
        None => println!("  Lessons/unit: not computed yet"),
    }
    if let Some(y) = &state.yesterday_progress {
        println!("  Yesterday ({}): {}/{}", y.date, y.completed, y.goal);
    }
}

/// Single-instance guard for the update cycle.
///
/// Holds an OS advisory lock on the lock file for as long as it lives. The
/// lock is released when the file handle closes, including when the process
/// is killed, so a leftover file never blocks later runs.
struct UpdateLock {
    _file: File,
}

impl UpdateLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                bail!(
                    "Another update is running (pid {}, lock file {})",
                    holder.trim(),
                    path.display()
                )
            }
            Err(TryLockError::Error(e)) => return Err(e).context("Failed to lock lock file"),
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("owlgorithm.lock");

        let lock = UpdateLock::acquire(&path).unwrap();
        let err = UpdateLock::acquire(&path).err().unwrap();
        assert!(err.to_string().contains("Another update is running"));
        drop(lock);
        assert!(UpdateLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owlgorithm.lock");
        // Left behind by a killed run.
        std::fs::write(&path, "999999\n").unwrap();

        let _lock = UpdateLock::acquire(&path).unwrap();
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_snapshot_round_trips_through_analyze_format() {
        let dir = tempfile::tempdir().unwrap();
        let ts = owl_core::parse_timestamp("2025-07-01 09:00:00").unwrap();
        let events = vec![Event::new(ts, 10, owl_core::EventCategory::UnitLesson).with_unit("Food")];

        let path = save_snapshot(dir.path(), ts.date(), &events).unwrap();
        let raw: Vec<RawEvent> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(normalize_events(raw).events, events);
    }
}
