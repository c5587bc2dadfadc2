use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use precision_clicker::config::parse_duration;
use precision_clicker::{
    ClickConfiguration, ClickCoordinator, ClickProfile, ClickType, CoordinatorState,
    DurationPolicy, HotkeyManager, Point, ProcessFinder, SchedulingManager, SimulatedInjector,
    TimingAccuracyValidator,
};

#[derive(Parser)]
#[command(name = "pclick", version, about = "Pointer-click automation with drift-free scheduling")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a click session (simulated injection; logs each click)
    Run {
        /// Target x coordinate
        #[arg(short, long, default_value_t = 640.0)]
        x: f64,

        /// Target y coordinate
        #[arg(short, long, default_value_t = 360.0)]
        y: f64,

        /// Interval between clicks, e.g. "250ms" or "1s"
        #[arg(short, long, default_value = "250ms")]
        interval: String,

        /// Use the secondary (right) button
        #[arg(long)]
        secondary: bool,

        /// Stop after this many clicks
        #[arg(short, long)]
        count: Option<u64>,

        /// Stop after this much run time, e.g. "30s"
        #[arg(short, long)]
        time_limit: Option<String>,

        /// Interval jitter ratio, 0.0..=1.0
        #[arg(long, default_value_t = 0.0)]
        interval_jitter: f64,

        /// Location jitter radius in pixels
        #[arg(long, default_value_t = 0.0)]
        location_jitter: f64,

        /// Start after a countdown, e.g. "10s"
        #[arg(long)]
        delay: Option<String>,

        /// Target process name for background clicking
        #[arg(short, long)]
        process: Option<String>,

        /// Emergency stop hotkey
        #[arg(long, default_value = "ctrl+alt+x")]
        hotkey: String,

        /// Stop the session on the first injection failure
        #[arg(long)]
        stop_on_error: bool,

        /// Load settings from a JSON profile instead of flags
        #[arg(long)]
        profile: Option<String>,
    },

    /// Measure timer accuracy without injecting any clicks
    Benchmark {
        /// Tick interval, e.g. "10ms"
        #[arg(short, long, default_value = "10ms")]
        interval: String,

        /// Length of each benchmark run, e.g. "5s"
        #[arg(short, long, default_value = "5s")]
        duration: String,

        /// Number of runs; with 2 or more, recent runs are checked for
        /// accuracy regressions
        #[arg(short, long, default_value_t = 1)]
        runs: usize,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Session inputs from a loaded profile. The `--process` flag takes
/// precedence over the profile's `process_name`.
fn session_from_profile(
    profile: &ClickProfile,
    flag_process: Option<String>,
) -> precision_clicker::Result<(ClickConfiguration, String, Option<String>, bool)> {
    let config = profile.to_config()?;
    let process = flag_process.or_else(|| profile.process_name.clone());
    Ok((
        config,
        profile.emergency_hotkey.clone(),
        process,
        profile.verbose,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            x,
            y,
            interval,
            secondary,
            count,
            time_limit,
            interval_jitter,
            location_jitter,
            delay,
            process,
            hotkey,
            stop_on_error,
            profile,
        } => {
            let (config, hotkey_str, process, profile_verbose) = match profile {
                Some(path) => {
                    let profile = ClickProfile::from_file(&path)?;
                    session_from_profile(&profile, process)?
                }
                None => {
                    let mut config = ClickConfiguration::new(
                        Point::new(x, y),
                        parse_duration(&interval)?.as_millis() as u64,
                    );
                    if secondary {
                        config.click_type = ClickType::Secondary;
                    }
                    config.duration_policy = match (count, &time_limit) {
                        (Some(n), None) => DurationPolicy::ClickCount { count: n },
                        (None, Some(limit)) => DurationPolicy::TimeLimit {
                            seconds: parse_duration(limit)?.as_secs(),
                        },
                        (None, None) => DurationPolicy::Unlimited,
                        (Some(_), Some(_)) => {
                            anyhow::bail!("--count and --time-limit are mutually exclusive")
                        }
                    };
                    config.interval_jitter_ratio = interval_jitter;
                    config.location_jitter_radius_px = location_jitter;
                    config.stop_on_error = stop_on_error;
                    config.validate()?;
                    (config, hotkey, process, false)
                }
            };

            init_logging(cli.verbose || profile_verbose);
            let delay = delay.as_deref().map(parse_duration).transpose()?;
            run_session(config, process, hotkey_str, delay).await
        }

        Command::Benchmark {
            interval,
            duration,
            runs,
        } => {
            init_logging(cli.verbose);
            let interval = parse_duration(&interval)?;
            let duration = parse_duration(&duration)?;
            run_benchmark(interval, duration, runs.max(1)).await
        }
    }
}

async fn run_session(
    mut config: ClickConfiguration,
    process: Option<String>,
    hotkey_str: String,
    delay: Option<Duration>,
) -> Result<()> {
    if let Some(name) = process {
        let mut finder = ProcessFinder::new();
        match finder.resolve(&name)? {
            Some(target) => {
                println!(
                    "🎯 Targeting process {} (PID {})",
                    target.name().cyan(),
                    target.pid()
                );
                config.target_process = Some(target);
            }
            None => println!("{} process '{name}' not found, clicking foreground", "⚠️".yellow()),
        }
    }

    let coordinator = Arc::new(ClickCoordinator::new(Arc::new(SimulatedInjector::new())));

    match HotkeyManager::new() {
        Ok(mut manager) => {
            manager
                .register_emergency_hotkey(&hotkey_str)
                .context("failed to register emergency hotkey")?;
            Arc::new(manager)
                .start_hotkey_listener(Arc::clone(&coordinator))
                .await;
        }
        Err(e) => println!("{} hotkey unavailable: {e}", "⚠️".yellow()),
    }

    {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                coordinator.stop();
            }
        });
    }

    let scheduler = SchedulingManager::new(Arc::clone(&coordinator));
    match delay {
        Some(delay) => {
            scheduler.schedule_in(config, delay)?;
            println!("⏳ Starting in {delay:?} (Ctrl-C to cancel)");
        }
        None => {
            coordinator.start(config)?;
            println!("▶️  Session started (Ctrl-C or hotkey to stop)");
        }
    }

    let mut updates = coordinator.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.state == CoordinatorState::Stopped {
            println!("\n{}", "Session summary".bold());
            println!("  attempts:   {}", snapshot.stats.attempts);
            println!("  successes:  {}", snapshot.stats.successes.to_string().green());
            println!("  failures:   {}", snapshot.stats.failures.to_string().red());
            println!("  anomalies:  {}", snapshot.stats.timing_anomalies);
            println!("  avg click:  {:.2}ms", snapshot.stats.avg_execution_ms);
            println!("  active for: {:?}", snapshot.stats.elapsed_active);
            if let Some(reason) = snapshot.stop_reason {
                println!("  stopped:    {reason:?}");
            }
            break;
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn run_benchmark(interval: Duration, duration: Duration, runs: usize) -> Result<()> {
    let mut validator = TimingAccuracyValidator::new();

    for run in 1..=runs {
        println!(
            "⏱️  Benchmark run {run}/{runs}: {interval:?} interval for {duration:?}"
        );
        let report = validator.run_benchmark(interval, duration).await?;

        let accuracy = format!("{:.1}%", report.accuracy_percentage);
        let accuracy = if report.meets_target() {
            accuracy.green()
        } else {
            accuracy.yellow()
        };
        println!("  samples:  {}", report.sample_count);
        println!("  mean err: {:?}", report.mean_error);
        println!("  max err:  {:?}", report.max_error);
        println!("  std dev:  {:?}", report.std_dev);
        println!("  accuracy: {accuracy}");
    }

    if runs >= 2 {
        if let Some(findings) = validator.check_history(runs) {
            if findings.any() {
                println!(
                    "{} timing regression detected (mean error {:+.1}%, accuracy {:+.1}%)",
                    "⚠️".yellow(),
                    findings.mean_error_change_pct,
                    findings.accuracy_change_pct
                );
            } else {
                println!("{} no timing regression across runs", "✅".green());
            }
        }
    }
    Ok(())
}
