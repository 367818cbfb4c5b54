use anyhow::{Context, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::exif::{self, ImageMetadataRecord};
use crate::location::LocationProvider;

pub use crate::exif::ImageKind;

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// The result of geotagging a single image.
#[derive(Debug)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// Where the tagged image was (or in a dry run, would be) written.
    pub output_path: Option<PathBuf>,
    pub record: Option<ImageMetadataRecord>,
    pub image_kind: Option<ImageKind>,
    /// Set when pixel verification ran.
    pub pixels_verified: Option<bool>,
    /// If a backup was made before overwriting, this is the path.
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only JPEG and PNG files are included.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Create a backup of the original file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Where the tagged copy of `path` goes under the given config.
pub fn output_path_for(path: &Path, config: &Config) -> PathBuf {
    if config.output.in_place {
        return path.to_path_buf();
    }
    let file_name = path.file_name().unwrap_or_else(|| "photo.jpg".as_ref());
    config.output.output_dir().join(file_name)
}

/// Output paths for a whole batch, one per input, with no two inputs sharing a target.
///
/// Copies of same-named files from different directories get a numeric
/// suffix (`photo.jpg`, `photo-2.jpg`, ...) in input order.
pub fn plan_outputs(paths: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let base = output_path_for(path, config);
            let mut candidate = base.clone();
            let mut n = 2;
            while !claimed.insert(candidate.clone()) {
                candidate = with_suffix(&base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// `dir/photo.jpg` -> `dir/photo-<n>.jpg`
fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let mut name: OsString = path.file_stem().unwrap_or_default().to_os_string();
    name.push(format!("-{n}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Decode both images and compare their pixels.
///
/// Returns `true` when dimensions, color type and raw pixel bytes all match.
pub fn pixels_match(original: &[u8], tagged: &[u8]) -> Result<bool> {
    let a = image::load_from_memory(original).context("Failed to decode original image")?;
    let b = image::load_from_memory(tagged).context("Failed to decode tagged image")?;
    Ok(a.width() == b.width()
        && a.height() == b.height()
        && a.color() == b.color()
        && a.as_bytes() == b.as_bytes())
}

/// Geotag a single image file.
///
/// 1. **Read** — Loads the image bytes
/// 2. **Locate** — Asks the provider for a fix
/// 3. **Embed** — Attaches GPS metadata (see [`exif::embed`])
/// 4. **Write** — Saves to the output directory, or in place with an optional backup
///
/// Failures are reported in [`ProcessResult::error`] rather than returned,
/// so one bad file does not stop a batch.
///
/// # Example
///
/// ```rust,no_run
/// use exif_geotag::config::Config;
/// use exif_geotag::location::FixedLocation;
/// use exif_geotag::pipeline::process_image;
/// use std::path::Path;
///
/// let config = Config::default();
/// let result = process_image(Path::new("photo.jpg"), &FixedLocation::placeholder(), &config);
/// if let Some(ref out) = result.output_path {
///     println!("Tagged copy: {}", out.display());
/// }
/// ```
pub fn process_image(path: &Path, provider: &dyn LocationProvider, config: &Config) -> ProcessResult {
    process_image_to(path, &output_path_for(path, config), provider, config)
}

/// Like [`process_image`], writing to an explicit `output_path`.
///
/// Pair with [`plan_outputs`] when tagging a batch into one directory.
/// Ignored when the config asks for in-place writes.
pub fn process_image_to(
    path: &Path,
    output_path: &Path,
    provider: &dyn LocationProvider,
    config: &Config,
) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        output_path: None,
        record: None,
        image_kind: ImageKind::from_path(path),
        pixels_verified: None,
        backup_path: None,
        error: None,
    };

    let output_path = if config.output.in_place { path } else { output_path };
    if let Err(e) = geotag(path, output_path, provider, config, &mut result) {
        result.error = Some(format!("{e:#}"));
    }

    result
}

fn geotag(
    path: &Path,
    output_path: &Path,
    provider: &dyn LocationProvider,
    config: &Config,
    result: &mut ProcessResult,
) -> Result<()> {
    let original = std::fs::read(path).context("Failed to read file")?;
    if let Some(kind) = ImageKind::from_bytes(&original) {
        result.image_kind = Some(kind);
    }

    let fix = provider
        .current_fix()
        .with_context(|| format!("Location provider '{}' failed", provider.name()))?;
    let record = ImageMetadataRecord::from_fix(&fix);
    log::debug!(
        "  GPS: {}{} {}{}, alt {}m, {} {}",
        record.latitude,
        record.latitude_ref,
        record.longitude,
        record.longitude_ref,
        record.altitude,
        record.date_stamp,
        record.time_stamp
    );

    let tagged = exif::embed(&original, &fix).context("Failed to embed GPS metadata")?;
    result.record = Some(record);

    if config.output.verify_pixels {
        let ok = pixels_match(&original, &tagged)?;
        result.pixels_verified = Some(ok);
        if !ok {
            anyhow::bail!("Pixel data changed while embedding metadata");
        }
    }

    result.output_path = Some(output_path.to_path_buf());

    if config.output.dry_run {
        return Ok(());
    }

    if config.output.in_place && config.output.backup_originals {
        match backup_file(path) {
            Ok(backup) => result.backup_path = Some(backup),
            Err(e) => log::warn!("Failed to backup {}: {e}", path.display()),
        }
    }

    if let Some(dir) = output_path.parent() {
        std::fs::create_dir_all(dir).context("Failed to create output directory")?;
    }
    std::fs::write(output_path, &tagged).context("Failed to write tagged image")?;

    Ok(())
}
