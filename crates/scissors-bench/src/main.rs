//! scissors-bench: CLI tool for replaying scripted lasso sessions.
//!
//! Decodes an image, builds its gradient field and replays a sequence of
//! seed clicks through a [`Session`], with simulated pointer motion
//! between clicks to exercise the live-segment throttle. Prints the
//! session diagnostics. Useful for:
//!
//! - Comparing cost models (`inverse` vs `direction`)
//! - Tuning snap radius and auto-anchor thresholds
//! - Measuring search and cache behaviour on real images
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin scissors-bench -- [OPTIONS] --seed X,Y --seed X,Y ... <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=scissors_core=debug` to see per-search logging.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use scissors_core::{
    CostFunctionKind, DirectionWeightedConfig, GradientField, GridCoord, ManualClock, Point,
    Session, SessionConfig, SessionDiagnostics, build_gradient_field,
};
use tracing_subscriber::EnvFilter;

/// Scripted intelligent-scissors sessions with diagnostics.
///
/// Places each `--seed` in order (snapped onto nearby edges unless
/// `--no-snap`), optionally closes the contour, and prints timing,
/// cache and path statistics.
#[derive(Parser)]
#[command(name = "scissors-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Seed click as `x,y` in image pixels. Repeat for each seed.
    #[arg(long = "seed", value_parser = parse_point, required = true)]
    seeds: Vec<Point>,

    /// Click on the first seed after the last one to close the contour.
    #[arg(long)]
    close: bool,

    /// Simulated pointer moves between consecutive clicks.
    #[arg(long, default_value_t = 20)]
    moves: usize,

    /// Simulated time between pointer moves, in milliseconds.
    #[arg(long, default_value_t = 16)]
    move_interval_ms: u64,

    /// Snap search radius in pixels.
    #[arg(long, default_value_t = SessionConfig::DEFAULT_SNAP_RADIUS)]
    snap_radius: u32,

    /// Disable snapping clicks onto nearby edges.
    #[arg(long)]
    no_snap: bool,

    /// Disable the auto-anchor planner.
    #[arg(long)]
    no_auto_anchor: bool,

    /// Edge cost model.
    #[arg(long, value_enum, default_value_t = Cost::Inverse)]
    cost: Cost,

    /// Path cache capacity.
    #[arg(long, default_value_t = SessionConfig::DEFAULT_CACHE_CAPACITY, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    cache_capacity: usize,

    /// Write the filled selection mask of a closed contour as a PNG.
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full session config as a JSON string.
    ///
    /// When provided, all other session parameter flags are ignored.
    /// The JSON must be a valid `SessionConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Edge cost model selection.
#[derive(Clone, Copy, ValueEnum)]
enum Cost {
    /// Inverse normalized gradient magnitude.
    Inverse,
    /// Blend of edge strength, turn smoothness and step length.
    Direction,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {s:?}"))?;
    let x: f64 = x
        .trim()
        .parse()
        .map_err(|e| format!("invalid x in {s:?}: {e}"))?;
    let y: f64 = y
        .trim()
        .parse()
        .map_err(|e| format!("invalid y in {s:?}: {e}"))?;
    Ok(Point::new(x, y))
}

/// Build a [`SessionConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<SessionConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        let defaults = SessionConfig::default();
        SessionConfig {
            snap_enabled: !cli.no_snap,
            snap_radius: cli.snap_radius,
            cache_capacity: cli.cache_capacity,
            cost_function: match cli.cost {
                Cost::Inverse => CostFunctionKind::InverseGradient,
                Cost::Direction => {
                    CostFunctionKind::DirectionWeighted(DirectionWeightedConfig::default())
                }
            },
            auto_anchor: scissors_core::AnchorConfig {
                enabled: !cli.no_auto_anchor,
                ..defaults.auto_anchor.clone()
            },
            ..defaults
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// One replayed session.
struct RunRecord {
    field_build: Duration,
    replay: Duration,
    path: Vec<GridCoord>,
    closed: bool,
    diagnostics: SessionDiagnostics,
}

/// Pointer positions strictly between `from` and `to`, evenly spaced.
fn pointer_track(from: Point, to: Point, moves: usize) -> impl Iterator<Item = Point> {
    #[allow(clippy::cast_precision_loss)]
    let steps = (moves + 1) as f64;
    (1..=moves).map(move |i| {
        #[allow(clippy::cast_precision_loss)]
        let t = i as f64 / steps;
        Point::new(
            (to.x - from.x).mul_add(t, from.x),
            (to.y - from.y).mul_add(t, from.y),
        )
    })
}

fn replay(
    field: GradientField,
    config: &SessionConfig,
    cli: &Cli,
) -> Result<(Session<ManualClock>, Duration), scissors_core::ScissorsError> {
    let clock = ManualClock::new();
    let mut session = Session::with_clock(field, config.clone(), clock.clone())?;
    let mut clicks = cli.seeds.clone();
    if cli.close
        && let Some(&first) = cli.seeds.first()
    {
        clicks.push(first);
    }

    let started = Instant::now();
    let mut previous: Option<Point> = None;
    for click in clicks {
        if session.is_closed() {
            tracing::warn!(x = click.x, y = click.y, "contour already closed; click skipped");
            continue;
        }
        if let Some(from) = previous {
            for pointer in pointer_track(from, click, cli.moves) {
                clock.advance(Duration::from_millis(cli.move_interval_ms));
                session.move_live(pointer)?;
            }
        }
        let placement = session.place_seed(click)?;
        tracing::debug!(x = click.x, y = click.y, ?placement, "click replayed");
        previous = Some(click);
    }
    Ok((session, started.elapsed()))
}

fn run_once(rgba: &image::RgbaImage, config: &SessionConfig, cli: &Cli) -> Result<RunRecord, String> {
    let build_start = Instant::now();
    let field = build_gradient_field(rgba);
    let field_build = build_start.elapsed();

    let (session, replay_time) =
        replay(field, config, cli).map_err(|e| format!("Session error: {e}"))?;
    Ok(RunRecord {
        field_build,
        replay: replay_time,
        path: session.committed_path(),
        closed: session.is_closed(),
        diagnostics: session.diagnostics(),
    })
}

/// Rasterize a closed contour into a white-on-black selection mask.
fn write_mask(path: &Path, contour: &[GridCoord], width: u32, height: u32) -> Result<(), String> {
    if contour.len() < 3 {
        return Err(format!(
            "contour has {} points; at least 3 are needed for a mask",
            contour.len()
        ));
    }
    let polygon: Vec<imageproc::point::Point<i32>> = contour
        .iter()
        .map(|c| {
            let x = i32::try_from(c.x).map_err(|e| e.to_string())?;
            let y = i32::try_from(c.y).map_err(|e| e.to_string())?;
            Ok(imageproc::point::Point::new(x, y))
        })
        .collect::<Result<_, String>>()?;
    let mut mask = image::GrayImage::new(width, height);
    imageproc::drawing::draw_polygon_mut(&mut mask, &polygon, image::Luma([255]));
    mask.save(path)
        .map_err(|e| format!("Error writing mask to {}: {e}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Seeds: {}  Close: {}  Runs: {}", cli.seeds.len(), cli.close, cli.runs);
    eprintln!();

    let rgba = match scissors_core::grayscale::decode_rgba(&image_bytes) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("Decode error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut records = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let record = match run_once(&rgba, &config, &cli) {
            Ok(r) => r,
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&record.diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", record.diagnostics.report());
            println!(
                "Field build: {:.3}ms  |  Replay: {:.3}ms",
                record.field_build.as_secs_f64() * 1000.0,
                record.replay.as_secs_f64() * 1000.0,
            );
        }

        // Write the mask on the first run only.
        if run == 0
            && let Some(ref mask_path) = cli.mask
        {
            if record.closed {
                match write_mask(mask_path, &record.path, rgba.width(), rgba.height()) {
                    Ok(()) => eprintln!("Mask written to {}", mask_path.display()),
                    Err(msg) => eprintln!("{msg}"),
                }
            } else {
                eprintln!("Contour is not closed; no mask written (pass --close)");
            }
        }

        records.push(record);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&records);
    }

    ExitCode::SUCCESS
}

/// Function pointer type for extracting a timing from a run.
type TimingExtractor = fn(&RunRecord) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(records: &[RunRecord]) {
    debug_assert!(!records.is_empty(), "no runs to summarize");

    println!();
    println!("Summary ({} runs)\n{}", records.len(), "=".repeat(60));

    if records.is_empty() {
        println!("Warning: no runs to summarize");
        return;
    }

    println!("{:<24} {:>10} {:>10} {:>10}", "Timing", "Min (ms)", "Mean (ms)", "Max (ms)");
    println!("{}", "-".repeat(58));

    let extractors: &[(&str, TimingExtractor)] = &[
        ("Field build", |r| r.field_build),
        ("Replay", |r| r.replay),
        ("Segment commits", |r| r.diagnostics.segment_time),
        ("Live updates", |r| r.diagnostics.live_time),
        ("Slowest segment", |r| r.diagnostics.slowest_segment),
    ];

    for (name, extractor) in extractors {
        let ms: Vec<f64> = records
            .iter()
            .map(|r| extractor(r).as_secs_f64() * 1000.0)
            .collect();
        let min = ms.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max = ms.iter().copied().reduce(f64::max).unwrap_or(0.0);
        let mean = ms.iter().sum::<f64>() / ms.len() as f64;
        println!("{name:<24} {min:>10.3} {mean:>10.3} {max:>10.3}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_point_accepts_spaces() {
        let p = parse_point("12.5, 7").unwrap();
        assert!((p.x - 12.5).abs() < f64::EPSILON);
        assert!((p.y - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_point_rejects_garbage() {
        assert!(parse_point("12").is_err());
        assert!(parse_point("a,1").is_err());
    }

    #[test]
    fn pointer_track_excludes_endpoints() {
        let track: Vec<Point> =
            pointer_track(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 4).collect();
        assert_eq!(track.len(), 4);
        assert!((track[0].x - 2.0).abs() < 1e-12);
        assert!((track[3].x - 8.0).abs() < 1e-12);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "scissors-bench",
            "img.png",
            "--seed",
            "1,1",
            "--no-snap",
            "--config-json",
            r#"{"snap_radius": 3}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.snap_radius, 3);
        assert!(config.snap_enabled);
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "scissors-bench",
            "img.png",
            "--seed",
            "1,1",
            "--no-auto-anchor",
            "--cost",
            "direction",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!(!config.auto_anchor.enabled);
        assert!(matches!(
            config.cost_function,
            CostFunctionKind::DirectionWeighted(_)
        ));
    }
}
