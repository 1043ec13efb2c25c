//! Command-line runner for one event.
//!
//! Usage:
//!     siltrack-run --geometry <path> --event <path> [--config <path>] [--output <path>]
//!     siltrack-run --geometry <path> --simulate <n_tracks> [--seed <u64>]
//!
//! Output:
//!     Prints the elapsed reconstruction time in milliseconds on the first
//!     line, then a one-line summary. Tracks are written as JSON when
//!     `--output` is given. Exit 0 on success, non-zero on error.
//!
//! Logging goes through `env_logger` and a `LoggingReporter`; set
//! `RUST_LOG=debug` for per-seed outcomes and `RUST_LOG=trace` for layers.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use siltrack::common::simulation::EventGenerator;
use siltrack::tracker::{CompositeReporter, DebugReporter, LoggingReporter};
use siltrack::{EventInput, GeometryDescription, Tracker, TrackerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "siltrack-run")]
#[command(about = "Reconstruct one event of a cylindrical silicon tracker")]
struct Args {
    /// Path to the geometry JSON file
    #[arg(long)]
    geometry: PathBuf,

    /// Path to the event JSON file (clusters, seeds, optional vertex)
    #[arg(long, conflicts_with = "simulate")]
    event: Option<PathBuf>,

    /// Reconstruct a toy event with this many tracks instead
    #[arg(long)]
    simulate: Option<usize>,

    /// RNG seed of the toy event
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Path to a tracker configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the reconstructed tracks as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let geometry = GeometryDescription::from_json_file(&args.geometry)?;
    let config = match &args.config {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::default(),
    };
    let mut tracker = Tracker::from_description(&geometry, config)?;

    let event = match (&args.event, args.simulate) {
        (Some(path), _) => EventInput::from_json_file(path)?,
        (None, Some(n_tracks)) => {
            let generator =
                EventGenerator::new(tracker.detector()).with_field(tracker.config().b_field);
            let toy = generator.random_event(n_tracks, 0.3, 50.0, args.seed);
            EventInput::new(toy.clusters, toy.seeds, None)
        }
        (None, None) => {
            eprintln!("Either --event or --simulate is required");
            std::process::exit(2);
        }
    };

    let mut reporter = CompositeReporter::new(LoggingReporter::new(), DebugReporter::new());
    let start = Instant::now();
    let output = tracker.reconstruct_with_reporter(event, &mut reporter)?;
    let elapsed_ms = start.elapsed().as_micros() as f64 / 1000.0;
    let (_, debug) = reporter.into_parts();

    println!("{:.3}", elapsed_ms);
    let stats = &output.stats;
    println!(
        "tracks {} (per pass {:?}) | seeds {} ({} standalone) | clusters {} | \
         rejections {} (short {}, empty {}) | refit failures {}",
        output.num_tracks(),
        stats.tracks_per_pass,
        stats.num_seeds(),
        stats.standalone_seeds,
        stats.clusters,
        debug.rejected().len(),
        stats.insufficient_clusters,
        stats.seeds_without_hypothesis,
        stats.refit_failures
    );

    if let Some(path) = &args.output {
        fs::write(path, output.to_json()?)?;
    }
    Ok(())
}
