//! Closed-loop fine tracker on the simulated optical bench.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use finetrack::{FineTracker, RunSummary, TrackerConfig};
use finetrack_harness::{bench_params_for, DriftProfiles, SimulatedBench, TerminalDisplay};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments for the fine tracker
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Laser spot fine tracker running against a simulated bench"
)]
struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of control steps to run (0 runs until 'q')
    #[arg(short = 'n', long, default_value_t = 500)]
    steps: u64,

    /// Override the tracker on/off period in steps (0 keeps tracking on)
    #[arg(short, long)]
    period: Option<u64>,

    /// Enable region-of-interest readout regardless of the configuration
    #[arg(long)]
    roi: bool,

    /// Beam drift profile (static, sine_x, sine_y, linear, circular, random)
    #[arg(short, long, default_value = "static")]
    drift: String,

    /// Drift amplitude in pixels
    #[arg(long, default_value_t = 3.0)]
    drift_amplitude: f64,

    /// Drift period in seconds
    #[arg(long, default_value_t = 20.0)]
    drift_period: f64,

    /// Beam rest position relative to the full-frame setpoint, X pixels
    #[arg(long, default_value_t = 6.0, allow_negative_numbers = true)]
    offset_x: f64,

    /// Beam rest position relative to the full-frame setpoint, Y pixels
    #[arg(long, default_value_t = -4.0, allow_negative_numbers = true)]
    offset_y: f64,

    /// Capture indices on which the beam is blocked
    #[arg(long, value_delimiter = ',')]
    dropout: Vec<u64>,

    /// Run without the terminal display
    #[arg(long)]
    headless: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(period) = args.period {
        config.tracker.tracker_period = period;
    }
    if args.roi {
        config.tracker.do_roi = true;
    }

    if let Some(path) = &args.write_config {
        config
            .save_to_file(path)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let profiles = DriftProfiles::new(args.drift_amplitude, args.drift_period);
    let drift = profiles.get(&args.drift).ok_or_else(|| {
        anyhow!(
            "Unknown drift profile '{}', expected one of {:?}",
            args.drift,
            DriftProfiles::NAMES
        )
    })?;
    info!("Drift: {}", drift.description());

    let bench = SimulatedBench::new(bench_params_for(&config, (args.offset_x, args.offset_y)));
    let camera = bench
        .camera(drift)
        .context("Failed to create simulated camera")?
        .with_dropouts(args.dropout.iter().copied());

    let mut tracker = FineTracker::new(camera, bench.mirror(), &config)
        .context("Failed to start tracker")?;

    let summary = if args.headless {
        tracker.run(args.steps)?
    } else {
        let mut display =
            TerminalDisplay::new(80, 30).context("Failed to initialise terminal display")?;
        tracker.run_with_display(args.steps, &mut display)?
    };
    tracker.flush_diagnostics();

    report(&summary, &bench, &config);
    Ok(())
}

fn report(summary: &RunSummary, bench: &SimulatedBench, config: &TrackerConfig) {
    info!(
        "Ran {} steps ({} with spot found){}",
        summary.steps_run,
        summary.steps_found,
        if summary.quit_requested {
            ", stopped by user"
        } else {
            ""
        }
    );
    let (mx, my) = bench.mirror_position();
    info!(
        "Simulated time {:.2}s, final mirror position ({mx:.4}, {my:.4})",
        bench.elapsed().as_secs_f64()
    );
    info!(
        "Telemetry written to {}",
        config.diagnostics.telemetry_path().display()
    );
}
