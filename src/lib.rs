//! # exif-geotag
//!
//! Embed EXIF GPS metadata (position, altitude, UTC time stamp and optional
//! heading) into JPEG and PNG images without re-encoding them. Only the
//! metadata segment changes, so decoded pixels stay bit-for-bit identical.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exif_geotag::exif::{embed, read_gps_tags};
//! use exif_geotag::location::GeoFix;
//! use chrono::Utc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let jpeg = std::fs::read("photo.jpg")?;
//!
//! let fix = GeoFix::new(35.0, 135.0, Utc::now())?
//!     .with_altitude(-10.0)
//!     .with_heading(90.0);
//! let tagged = embed(&jpeg, &fix)?;
//!
//! let gps = read_gps_tags(&tagged)?.expect("GPS IFD written");
//! assert_eq!(gps.latitude_ref(), Some('N'));
//! assert_eq!(gps.altitude_ref(), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Processing
//!
//! The pipeline module handles the file-level flow: collect images, ask a
//! [`LocationProvider`](location::LocationProvider) for a fix, embed, and
//! write the result (to the temp dir by default).
//!
//! ```rust,no_run
//! use exif_geotag::config::Config;
//! use exif_geotag::pipeline::{collect_images, process_image};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(Some("config.json".as_ref()))?;
//! let provider = config.location.provider();
//!
//! for path in collect_images(&[PathBuf::from("./photos")]) {
//!     let result = process_image(&path, &provider, &config);
//!     match result.error {
//!         Some(err) => eprintln!("{}: {err}", path.display()),
//!         None => println!("{} -> {:?}", path.display(), result.output_path),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Metadata location |
//! |--------|-------------------|
//! | JPEG (`.jpg`, `.jpeg`) | EXIF APP1 segment |
//! | PNG (`.png`) | `eXIf` chunk |
//!
//! ## Modules
//!
//! - [`config`] — Configuration types and loading/saving
//! - [`exif`] — GPS record derivation, embedding and read-back
//! - [`location`] — Geolocation fixes and location providers
//! - [`pipeline`] — File collection, format detection and per-file processing

pub mod config;
pub mod exif;
pub mod location;
pub mod pipeline;
