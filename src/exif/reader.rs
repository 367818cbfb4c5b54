use anyhow::{Context, Result};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use nom_exif::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;

use super::format::ImageKind;
use super::tiff::{self, ByteOrder};
use super::writer::{
    TAG_GPS_ALTITUDE, TAG_GPS_ALTITUDE_REF, TAG_GPS_DATE_STAMP, TAG_GPS_IMG_DIRECTION,
    TAG_GPS_IMG_DIRECTION_REF, TAG_GPS_LATITUDE, TAG_GPS_LATITUDE_REF, TAG_GPS_LONGITUDE,
    TAG_GPS_LONGITUDE_REF, TAG_GPS_TIME_STAMP, TAG_GPS_VERSION_ID,
};

/// A decoded GPS IFD value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GpsValue {
    Bytes(Vec<u8>),
    Ascii(String),
    Rationals(Vec<(u32, u32)>),
    /// A field of a type this reader does not decode.
    Other { format: u16, count: u32 },
}

/// All entries of an image's GPS sub-IFD, keyed by tag ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsTags {
    pub entries: BTreeMap<u16, GpsValue>,
}

impl GpsTags {
    pub fn get(&self, tag: u16) -> Option<&GpsValue> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    fn ascii(&self, tag: u16) -> Option<&str> {
        match self.get(tag)? {
            GpsValue::Ascii(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn reference(&self, tag: u16) -> Option<char> {
        self.ascii(tag)?.chars().next()
    }

    fn rationals(&self, tag: u16) -> Option<Vec<f64>> {
        match self.get(tag)? {
            GpsValue::Rationals(values) => values
                .iter()
                .map(|&(num, den)| (den != 0).then(|| num as f64 / den as f64))
                .collect(),
            _ => None,
        }
    }

    fn dms(&self, tag: u16) -> Option<f64> {
        match self.rationals(tag)?.as_slice() {
            [d, m, s] => Some(d + m / 60.0 + s / 3600.0),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<String> {
        match self.get(TAG_GPS_VERSION_ID)? {
            GpsValue::Bytes(b) => Some(b.iter().map(u8::to_string).collect::<Vec<_>>().join(".")),
            _ => None,
        }
    }

    pub fn latitude_ref(&self) -> Option<char> {
        self.reference(TAG_GPS_LATITUDE_REF)
    }

    /// Unsigned latitude in decimal degrees.
    pub fn latitude(&self) -> Option<f64> {
        self.dms(TAG_GPS_LATITUDE)
    }

    pub fn longitude_ref(&self) -> Option<char> {
        self.reference(TAG_GPS_LONGITUDE_REF)
    }

    /// Unsigned longitude in decimal degrees.
    pub fn longitude(&self) -> Option<f64> {
        self.dms(TAG_GPS_LONGITUDE)
    }

    pub fn altitude_ref(&self) -> Option<u8> {
        match self.get(TAG_GPS_ALTITUDE_REF)? {
            GpsValue::Bytes(b) => b.first().copied(),
            _ => None,
        }
    }

    /// Unsigned altitude in meters.
    pub fn altitude(&self) -> Option<f64> {
        self.rationals(TAG_GPS_ALTITUDE)?.first().copied()
    }

    /// `yyyy:MM:dd`
    pub fn date_stamp(&self) -> Option<String> {
        self.ascii(TAG_GPS_DATE_STAMP).map(str::to_string)
    }

    /// `HH:mm:ss.SSSSSS`
    pub fn time_stamp(&self) -> Option<String> {
        match self.rationals(TAG_GPS_TIME_STAMP)?.as_slice() {
            [h, m, s] => Some(format!("{:02}:{:02}:{:09.6}", *h as u32, *m as u32, s)),
            _ => None,
        }
    }

    pub fn img_direction_ref(&self) -> Option<char> {
        self.reference(TAG_GPS_IMG_DIRECTION_REF)
    }

    pub fn img_direction(&self) -> Option<f64> {
        self.rationals(TAG_GPS_IMG_DIRECTION)?.first().copied()
    }

    /// Signed decimal coordinates, if both are present.
    pub fn signed_coordinates(&self) -> Option<(f64, f64)> {
        let mut lat = self.latitude()?;
        let mut lon = self.longitude()?;
        if self.latitude_ref() == Some('S') {
            lat = -lat;
        }
        if self.longitude_ref() == Some('W') {
            lon = -lon;
        }
        Some((lat, lon))
    }
}

/// Extract the raw TIFF block from an image's EXIF segment or chunk.
fn exif_block(image: &[u8]) -> Result<Option<Bytes>> {
    let bytes = Bytes::copy_from_slice(image);
    let exif = match ImageKind::from_bytes(image) {
        Some(ImageKind::Jpeg) => Jpeg::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?
            .exif(),
        Some(ImageKind::Png) => Png::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse PNG: {e}"))?
            .exif(),
        None => anyhow::bail!("Unrecognized image format"),
    };
    Ok(exif)
}

/// Read the GPS sub-IFD of an encoded image.
///
/// Returns `Ok(None)` when the image has no EXIF block or no GPS IFD.
pub fn read_gps_tags(image: &[u8]) -> Result<Option<GpsTags>> {
    let Some(block) = exif_block(image)? else {
        log::debug!("No EXIF block found");
        return Ok(None);
    };

    let order = ByteOrder::detect(&block).context("Invalid TIFF byte order")?;
    let ifd0_offset = tiff::first_ifd_offset(&block, order).context("Invalid TIFF header")?;
    let ifd0 = tiff::read_ifd(&block, order, ifd0_offset).context("IFD0 extends beyond EXIF data")?;

    let Some(pointer) = ifd0.find(tiff::TAG_GPS_IFD_POINTER) else {
        return Ok(None);
    };
    let gps_offset = order
        .read_u32(&pointer.value, 0)
        .context("Invalid GPS IFD pointer")? as usize;
    let gps_ifd = tiff::read_ifd(&block, order, gps_offset).context("GPS IFD extends beyond EXIF data")?;

    let mut tags = GpsTags::default();
    for entry in &gps_ifd.entries {
        let value = match (entry.format, entry.data(&block, order)) {
            (tiff::FORMAT_BYTE, Some(data)) => GpsValue::Bytes(data.to_vec()),
            (tiff::FORMAT_ASCII, Some(data)) => {
                let s = String::from_utf8_lossy(data);
                GpsValue::Ascii(s.trim_end_matches('\0').to_string())
            }
            (tiff::FORMAT_RATIONAL, Some(data)) => GpsValue::Rationals(
                data.chunks_exact(8)
                    .filter_map(|c| Some((order.read_u32(c, 0)?, order.read_u32(c, 4)?)))
                    .collect(),
            ),
            _ => GpsValue::Other {
                format: entry.format,
                count: entry.count,
            },
        };
        tags.entries.insert(entry.tag, value);
    }

    Ok(Some(tags))
}

/// Read signed decimal coordinates.
///
/// nom-exif is tried first. It stops at a GPSVersionID entry (tag 0), so
/// when it finds no position the GPS IFD is decoded directly.
///
/// Returns `Ok(None)` when the image carries no GPS position.
pub fn read_location(image: &[u8]) -> Result<Option<(f64, f64)>> {
    if let Some(location) = nom_exif_location(image)? {
        return Ok(Some(location));
    }
    log::debug!("nom-exif found no GPS position, reading the GPS IFD directly");
    Ok(read_gps_tags(image)?.and_then(|tags| tags.signed_coordinates()))
}

fn nom_exif_location(image: &[u8]) -> Result<Option<(f64, f64)>> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::seekable(Cursor::new(image.to_vec())).context("Failed to open image data")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found");
            return Ok(None);
        }
    };

    let Some(gps) = iter.parse_gps_info().ok().flatten() else {
        return Ok(None);
    };

    Ok(Some((
        latlng_to_decimal(&gps.latitude, gps.latitude_ref),
        latlng_to_decimal(&gps.longitude, gps.longitude_ref),
    )))
}

/// Convert a nom-exif LatLng (3 URationals: deg, min, sec) to decimal degrees.
fn latlng_to_decimal(latlng: &LatLng, reference: char) -> f64 {
    let degrees = latlng.0.0 as f64 / latlng.0.1 as f64;
    let minutes = latlng.1.0 as f64 / latlng.1.1 as f64;
    let seconds = latlng.2.0 as f64 / latlng.2.1 as f64;

    let coord = degrees + minutes / 60.0 + seconds / 3600.0;

    if reference == 'S' || reference == 'W' { -coord } else { coord }
}
