use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::{Path, PathBuf};

use exif_geotag::location::{FixedLocation, LocationProvider};
use exif_geotag::{config, exif, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "exif-geotag",
    version,
    about = "Embed EXIF GPS metadata into JPEG and PNG images without touching pixel data"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Latitude in degrees (negative = south)
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude in degrees (negative = west)
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Altitude in meters (negative = below sea level)
    #[arg(long, allow_hyphen_values = true)]
    alt: Option<f64>,

    /// Heading in degrees true
    #[arg(long, allow_hyphen_values = true)]
    heading: Option<f64>,

    /// Capture time as RFC 3339 (default: now)
    #[arg(long, value_name = "RFC3339")]
    timestamp: Option<String>,

    /// Directory for tagged copies (default: system temp dir)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Overwrite the source images instead of writing copies
    #[arg(long)]
    in_place: bool,

    /// Decode input and output and confirm the pixels are identical
    #[arg(long)]
    verify: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Display the GPS metadata of the image(s) and exit
    #[arg(long = "show-gps")]
    show_gps: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    // Handle --show-gps
    if cli.show_gps {
        show_gps(&images, cli.json);
        return Ok(());
    }

    // Load config and apply CLI overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(lat) = cli.lat {
        config.location.latitude = lat;
    }
    if let Some(lon) = cli.lon {
        config.location.longitude = lon;
    }
    if let Some(alt) = cli.alt {
        config.location.altitude = alt;
    }
    if cli.heading.is_some() {
        config.location.heading = cli.heading;
    }
    if let Some(ref dir) = cli.output_dir {
        config.output.output_dir = Some(dir.to_string_lossy().into_owned());
    }
    if cli.in_place {
        config.output.in_place = true;
    }
    if cli.verify {
        config.output.verify_pixels = true;
    }
    if cli.dry_run {
        config.output.dry_run = true;
    }

    let timestamp = cli
        .timestamp
        .as_deref()
        .map(|ts| {
            DateTime::parse_from_rfc3339(ts)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("Invalid --timestamp '{ts}'"))
        })
        .transpose()?;
    let provider = FixedLocation {
        timestamp,
        ..config.location.provider()
    };
    // Fail early on an invalid coordinate instead of once per image
    let fix = provider.current_fix()?;

    log::info!("Found {} image(s) to process", images.len());
    log::info!("Location ({}): {}", provider.name(), fix.iso6709());
    if config.output.dry_run {
        log::info!("DRY RUN — no files will be modified");
    }

    let mut results = Vec::new();
    let total = images.len();
    let outputs = pipeline::plan_outputs(&images, &config);

    for (i, (image_path, output_path)) in images.iter().zip(&outputs).enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, image_path.display());

        let result = pipeline::process_image_to(image_path, output_path, &provider, &config);

        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else if let Some(ref out) = result.output_path {
            let action = if config.output.dry_run { "Would write" } else { "Wrote" };
            log::info!("  {action}: {}", out.display());
            if let Some(ref backup) = result.backup_path {
                log::info!("  Backup: {}", backup.display());
            }
            if result.pixels_verified == Some(true) {
                log::info!("  Pixels verified");
            }
        }

        results.push(result);
    }

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "output_path": r.output_path.as_ref().map(|p| p.display().to_string()),
                    "format": r.image_kind.map(|k| k.mime_type()),
                    "gps": r.record,
                    "pixels_verified": r.pixels_verified,
                    "backup_path": r.backup_path.as_ref().map(|p| p.display().to_string()),
                    "error": r.error,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

/// Print the GPS metadata of every image, logging the ones that fail.
///
/// Returns how many could not be read.
fn show_gps(images: &[PathBuf], json: bool) -> usize {
    let mut failed = 0;
    for image_path in images {
        if let Err(e) = print_gps(image_path, json) {
            log::error!("{}: {e:#}", image_path.display());
            failed += 1;
        }
    }
    failed
}

/// Print the GPS metadata of an image.
fn print_gps(path: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(path).context("Failed to read image file")?;
    let tags = exif::read_gps_tags(&bytes)
        .with_context(|| format!("Failed to read EXIF from {}", path.display()))?;

    if json {
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "gps": tags,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("── {} ──", path.display());
    let Some(tags) = tags else {
        println!("  (no GPS metadata)");
        return Ok(());
    };

    let rows: Vec<(&str, Option<String>)> = vec![
        ("Version", tags.version()),
        (
            "Latitude",
            tags.latitude()
                .map(|v| format!("{v:.6} {}", tags.latitude_ref().unwrap_or('?'))),
        ),
        (
            "Longitude",
            tags.longitude()
                .map(|v| format!("{v:.6} {}", tags.longitude_ref().unwrap_or('?'))),
        ),
        (
            "Altitude",
            tags.altitude().map(|v| {
                let below = tags.altitude_ref() == Some(1);
                format!("{v} m {}", if below { "below sea level" } else { "above sea level" })
            }),
        ),
        ("Date", tags.date_stamp()),
        ("Time (UTC)", tags.time_stamp()),
        (
            "Direction",
            tags.img_direction()
                .map(|v| format!("{v} {}", tags.img_direction_ref().unwrap_or('?'))),
        ),
    ];

    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {label:<12} {value}");
        }
    }

    if let Ok(Some((lat, lon))) = exif::read_location(&bytes) {
        println!("  {:<12} {lat:.6}, {lon:.6}", "Decimal");
    }

    Ok(())
}
