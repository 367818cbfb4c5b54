//! EXIF GPS metadata embedding and read-back.
//!
//! - [`embed`] — Attach GPS metadata for a [`GeoFix`](crate::location::GeoFix) to a JPEG or PNG
//! - [`ImageMetadataRecord`] — The GPS fields derived from a fix
//! - [`read_gps_tags`] / [`read_location`] — Read GPS metadata back out of an image
//! - [`ImageKind`] — Container detection by extension or signature
//!
//! Only the EXIF segment (JPEG APP1) or chunk (PNG eXIf) changes; image data
//! is copied through byte for byte.

mod error;
mod format;
mod reader;
mod record;
mod tiff;
mod writer;

pub use error::EmbedError;
pub use format::ImageKind;
pub use reader::{GpsTags, GpsValue, read_gps_tags, read_location};
pub use record::{GPS_VERSION, Heading, ImageMetadataRecord};
pub use writer::{embed, embed_record};
