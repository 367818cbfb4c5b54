use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};

use super::error::EmbedError;
use super::format::ImageKind;
use super::record::ImageMetadataRecord;
use super::tiff::{self, ByteOrder, PendingEntry, RawEntry};
use crate::location::GeoFix;

// GPS IFD tag IDs (EXIF 2.2)
pub(crate) const TAG_GPS_VERSION_ID: u16 = 0x0000;
pub(crate) const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
pub(crate) const TAG_GPS_LATITUDE: u16 = 0x0002;
pub(crate) const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
pub(crate) const TAG_GPS_LONGITUDE: u16 = 0x0004;
pub(crate) const TAG_GPS_ALTITUDE_REF: u16 = 0x0005;
pub(crate) const TAG_GPS_ALTITUDE: u16 = 0x0006;
pub(crate) const TAG_GPS_TIME_STAMP: u16 = 0x0007;
pub(crate) const TAG_GPS_IMG_DIRECTION_REF: u16 = 0x0010;
pub(crate) const TAG_GPS_IMG_DIRECTION: u16 = 0x0011;
pub(crate) const TAG_GPS_DATE_STAMP: u16 = 0x001D;

pub(crate) const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
// Segment length field is u16 and counts itself
const MAX_SEGMENT_CONTENTS: usize = u16::MAX as usize - 2;

// Denominator for the seconds component of latitude/longitude
const SECONDS_SCALE: u64 = 10_000;
// Denominator for image direction
const DIRECTION_SCALE: f64 = 100.0;

// Little-endian TIFF header followed by an empty IFD0
const EMPTY_TIFF: &[u8] = &[
    b'I', b'I', 42, 0, 8, 0, 0, 0, // header
    0, 0, // entry count
    0, 0, 0, 0, // next IFD
];

/// Embed GPS metadata for `fix` into an encoded image.
///
/// The input is never modified. The returned buffer is the same container
/// format with every non-EXIF segment copied through unchanged, so decoded
/// pixels are identical.
///
/// Existing EXIF data is kept; only the GPS sub-IFD is (re)placed.
///
/// Fails with [`EmbedError::EncodeFailed`] when the fix's altitude is not
/// finite or does not fit in 32 bits of whole meters.
///
/// ```rust,no_run
/// use exif_geotag::exif::embed;
/// use exif_geotag::location::GeoFix;
/// use chrono::Utc;
///
/// # fn main() -> anyhow::Result<()> {
/// let jpeg = std::fs::read("photo.jpg")?;
/// let fix = GeoFix::new(35.0, 135.0, Utc::now())?;
/// let tagged = embed(&jpeg, &fix)?;
/// std::fs::write(std::env::temp_dir().join("photo.jpg"), tagged)?;
/// # Ok(())
/// # }
/// ```
pub fn embed(image: &[u8], fix: &GeoFix) -> Result<Vec<u8>, EmbedError> {
    let altitude = fix.altitude();
    if !altitude.is_finite() || altitude.abs() >= u32::MAX as f64 + 1.0 {
        return Err(EmbedError::EncodeFailed(format!(
            "altitude {altitude} cannot be stored as a GPS rational"
        )));
    }
    let record = ImageMetadataRecord::from_fix(fix);
    embed_record(image, &record)
}

/// Embed an already-derived record. See [`embed`].
pub fn embed_record(image: &[u8], record: &ImageMetadataRecord) -> Result<Vec<u8>, EmbedError> {
    let kind = ImageKind::from_bytes(image)
        .ok_or_else(|| EmbedError::DecodeFailed("unrecognized image signature".to_string()))?;

    log::debug!(
        "Embedding GPS {}{} {}{} into {} bytes of {:?}",
        record.latitude,
        record.latitude_ref,
        record.longitude,
        record.longitude_ref,
        image.len(),
        kind
    );

    match kind {
        ImageKind::Jpeg => embed_jpeg(image, record),
        ImageKind::Png => embed_png(image, record),
    }
}

/// Replace (or add) the EXIF APP1 segment, leaving every other segment alone.
fn embed_jpeg(image: &[u8], record: &ImageMetadataRecord) -> Result<Vec<u8>, EmbedError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(image))
        .map_err(|e| EmbedError::DecodeFailed(format!("failed to parse JPEG: {e}")))?;

    let existing = jpeg.exif();
    let tiff_data = build_exif(existing.as_deref(), record)?;

    let mut contents = Vec::with_capacity(EXIF_PREFIX.len() + tiff_data.len());
    contents.extend_from_slice(EXIF_PREFIX);
    contents.extend_from_slice(&tiff_data);
    if contents.len() > MAX_SEGMENT_CONTENTS {
        return Err(EmbedError::EncodeFailed(format!(
            "EXIF block of {} bytes does not fit in a JPEG APP1 segment",
            contents.len()
        )));
    }
    let new_segment = JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(contents));

    // Keep EXIF where it was, otherwise put it right after JFIF APP0
    let segments = jpeg.segments_mut();
    let orig_pos = find_exif_segment_pos(segments);
    segments.retain(|s| !is_exif_segment(s));
    let target_pos = orig_pos.unwrap_or_else(|| {
        usize::from(segments.first().is_some_and(|s| s.marker() == MARKER_APP0))
    });
    segments.insert(target_pos.min(segments.len()), new_segment);

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Replace (or add) the eXIf chunk.
fn embed_png(image: &[u8], record: &ImageMetadataRecord) -> Result<Vec<u8>, EmbedError> {
    let mut png = Png::from_bytes(Bytes::copy_from_slice(image))
        .map_err(|e| EmbedError::DecodeFailed(format!("failed to parse PNG: {e}")))?;

    let existing = png.exif();
    let tiff_data = build_exif(existing.as_deref(), record)?;
    png.set_exif(Some(Bytes::from(tiff_data)));

    Ok(png.encoder().bytes().to_vec())
}

fn is_exif_segment(segment: &JpegSegment) -> bool {
    segment.marker() == MARKER_APP1 && segment.contents().starts_with(EXIF_PREFIX)
}

/// Find the position of the EXIF APP1 segment in a JPEG.
fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments.iter().position(is_exif_segment)
}

/// Produce the TIFF block to store in the container.
///
/// Merges into `existing` when it parses, otherwise starts fresh.
fn build_exif(existing: Option<&[u8]>, record: &ImageMetadataRecord) -> Result<Vec<u8>, EmbedError> {
    if let Some(original) = existing.filter(|e| !e.is_empty()) {
        match inject_gps_ifd(original, record)? {
            Some(merged) => {
                log::debug!("Merged GPS IFD into existing {}-byte EXIF block", original.len());
                return Ok(merged);
            }
            None => log::warn!("Existing EXIF block is malformed, replacing it"),
        }
    }
    build_fresh_exif(record)
}

/// Build a new EXIF block holding only the GPS IFD.
fn build_fresh_exif(record: &ImageMetadataRecord) -> Result<Vec<u8>, EmbedError> {
    inject_gps_ifd(EMPTY_TIFF, record)?
        .ok_or_else(|| EmbedError::EncodeFailed("could not build EXIF block".to_string()))
}

/// Place a GPS IFD for `record` into a copy of `original`.
///
/// A GPS IFD already referenced from IFD0 is zeroed so its values do not
/// survive. The new one is written over it when it fits, otherwise it is
/// appended together with a copy of IFD0 pointing at it.
///
/// Returns `Ok(None)` when `original` is not a parseable TIFF block.
fn inject_gps_ifd(original: &[u8], record: &ImageMetadataRecord) -> Result<Option<Vec<u8>>, EmbedError> {
    let Some(order) = ByteOrder::detect(original) else {
        return Ok(None);
    };
    let Some(ifd0) = tiff::first_ifd_offset(original, order).and_then(|off| tiff::read_ifd(original, order, off))
    else {
        return Ok(None);
    };

    let entries = gps_entries(record, order)?;
    let too_large = || EmbedError::EncodeFailed("EXIF block exceeds TIFF offset range".to_string());

    let mut result = original.to_vec();

    if let Some(span) = clear_gps_ifd(&mut result, order, &ifd0) {
        let encoded = tiff::encode_ifd(order, &entries, 0, span.start).ok_or_else(too_large)?;
        if encoded.len() <= span.len() {
            log::debug!("Rewriting GPS IFD in place at offset {}", span.start);
            result[span.start..span.start + encoded.len()].copy_from_slice(&encoded);
            return Ok(Some(result));
        }
    }

    let gps_offset = tiff::append_ifd(&mut result, order, &entries, 0).ok_or_else(too_large)?;
    let pointer = RawEntry {
        tag: tiff::TAG_GPS_IFD_POINTER,
        format: tiff::FORMAT_LONG,
        count: 1,
        value: order.encode_u32(gps_offset),
    };
    let new_ifd0 = tiff::append_ifd_with(&mut result, order, &ifd0, pointer).ok_or_else(too_large)?;

    // Update TIFF header to point to new IFD0
    result[4..8].copy_from_slice(&order.encode_u32(new_ifd0));

    Ok(Some(result))
}

/// Zero every byte of the GPS IFD that `ifd0` points at.
///
/// Returns the span it occupied when that span is one contiguous run
/// starting at the IFD itself, so it can be reused.
fn clear_gps_ifd(tiff_data: &mut [u8], order: ByteOrder, ifd0: &tiff::Ifd) -> Option<std::ops::Range<usize>> {
    let pointer = ifd0.find(tiff::TAG_GPS_IFD_POINTER)?;
    let offset = order.read_u32(&pointer.value, 0)? as usize;
    let gps = tiff::read_ifd(tiff_data, order, offset)?;

    let footprint = gps.footprint(tiff_data, order, offset);
    for range in &footprint {
        tiff_data[range.clone()].fill(0);
    }

    tiff::contiguous_span(&footprint).filter(|span| span.start == offset)
}

/// Encode every GPS field of the record in the given byte order.
fn gps_entries(record: &ImageMetadataRecord, order: ByteOrder) -> Result<Vec<PendingEntry>, EmbedError> {
    let mut entries = vec![
        byte_entry(TAG_GPS_VERSION_ID, parse_version(&record.version)?.to_vec()),
        ascii_entry(TAG_GPS_LATITUDE_REF, &record.latitude_ref.to_string())?,
        rational_entry(TAG_GPS_LATITUDE, &to_dms(record.latitude)?, order),
        ascii_entry(TAG_GPS_LONGITUDE_REF, &record.longitude_ref.to_string())?,
        rational_entry(TAG_GPS_LONGITUDE, &to_dms(record.longitude)?, order),
        byte_entry(TAG_GPS_ALTITUDE_REF, vec![record.altitude_ref]),
        rational_entry(TAG_GPS_ALTITUDE, &[(record.altitude, 1)], order),
        rational_entry(TAG_GPS_TIME_STAMP, &parse_time_stamp(&record.time_stamp)?, order),
        ascii_entry(TAG_GPS_DATE_STAMP, &validate_date_stamp(&record.date_stamp)?)?,
    ];

    if let Some(heading) = record.heading {
        entries.push(ascii_entry(TAG_GPS_IMG_DIRECTION_REF, &heading.reference.to_string())?);
        entries.push(rational_entry(TAG_GPS_IMG_DIRECTION, &[direction_rational(heading.value)?], order));
    }

    Ok(entries)
}

fn byte_entry(tag: u16, data: Vec<u8>) -> PendingEntry {
    PendingEntry {
        tag,
        format: tiff::FORMAT_BYTE,
        count: data.len() as u32,
        data,
    }
}

fn ascii_entry(tag: u16, value: &str) -> Result<PendingEntry, EmbedError> {
    if !value.is_ascii() {
        return Err(EmbedError::EncodeFailed(format!(
            "GPS tag 0x{tag:04X} value {value:?} is not ASCII"
        )));
    }
    let mut data = value.as_bytes().to_vec();
    data.push(0); // null terminator
    Ok(PendingEntry {
        tag,
        format: tiff::FORMAT_ASCII,
        count: data.len() as u32,
        data,
    })
}

fn rational_entry(tag: u16, values: &[(u32, u32)], order: ByteOrder) -> PendingEntry {
    PendingEntry {
        tag,
        format: tiff::FORMAT_RATIONAL,
        count: values.len() as u32,
        data: order.encode_rationals(values),
    }
}

/// Split a non-negative angle into degrees, minutes and scaled seconds.
fn to_dms(value: f64) -> Result<[(u32, u32); 3], EmbedError> {
    if !value.is_finite() || value < 0.0 {
        return Err(EmbedError::EncodeFailed(format!(
            "coordinate magnitude {value} is not a finite non-negative number"
        )));
    }

    let total = (value * 3600.0 * SECONDS_SCALE as f64).round() as u64;
    let per_degree = 3600 * SECONDS_SCALE;
    let per_minute = 60 * SECONDS_SCALE;

    let degrees = total / per_degree;
    let rem = total % per_degree;
    let minutes = rem / per_minute;
    let seconds = rem % per_minute;

    let degrees = u32::try_from(degrees)
        .map_err(|_| EmbedError::EncodeFailed(format!("coordinate {value} out of range")))?;
    Ok([
        (degrees, 1),
        (minutes as u32, 1),
        (seconds as u32, SECONDS_SCALE as u32),
    ])
}

/// Parse a dotted version tag such as `2.2.0.0` into GPSVersionID bytes.
fn parse_version(version: &str) -> Result<[u8; 4], EmbedError> {
    let invalid = || EmbedError::EncodeFailed(format!("invalid GPS version tag {version:?}"));
    let parts = version
        .split('.')
        .map(|p| p.parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<Vec<u8>, _>>()?;
    parts.try_into().map_err(|_| invalid())
}

/// Parse `HH:mm:ss.SSSSSS` into hour, minute and fractional-second rationals.
fn parse_time_stamp(time: &str) -> Result<[(u32, u32); 3], EmbedError> {
    let invalid = || EmbedError::EncodeFailed(format!("invalid GPS time stamp {time:?}"));

    let mut parts = time.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let hours: u32 = h.parse().map_err(|_| invalid())?;
    let minutes: u32 = m.parse().map_err(|_| invalid())?;

    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: u32 = whole.parse().map_err(|_| invalid())?;
    let denominator = 10u32.pow(fraction.len() as u32);
    let frac: u32 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| invalid())?
    };
    let numerator = whole
        .checked_mul(denominator)
        .and_then(|n| n.checked_add(frac))
        .ok_or_else(invalid)?;

    Ok([(hours, 1), (minutes, 1), (numerator, denominator)])
}

fn validate_date_stamp(date: &str) -> Result<String, EmbedError> {
    let bytes = date.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b':'
        && bytes[7] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if well_formed {
        Ok(date.to_string())
    } else {
        Err(EmbedError::EncodeFailed(format!("invalid GPS date stamp {date:?}")))
    }
}

/// Encode a heading as an unsigned rational.
///
/// Negative headings wrap into `[0, 360)`; large values keep whole-degree
/// precision once hundredths no longer fit in 32 bits.
fn direction_rational(value: f64) -> Result<(u32, u32), EmbedError> {
    if !value.is_finite() {
        return Err(EmbedError::EncodeFailed(format!("heading {value} is not finite")));
    }
    let value = if value < 0.0 {
        let wrapped = value.rem_euclid(360.0);
        log::warn!("Heading {value} is negative, writing {wrapped} instead");
        wrapped
    } else {
        value
    };

    let scaled = (value * DIRECTION_SCALE).round();
    if scaled <= u32::MAX as f64 {
        Ok((scaled as u32, DIRECTION_SCALE as u32))
    } else {
        Ok((value.round().min(u32::MAX as f64) as u32, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::reader::{read_gps_tags, read_location};
    use chrono::{DateTime, TimeZone, Utc};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, ((x + y) * 3) as u8]))
    }

    fn sample_jpeg() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        sample_image().write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    fn sample_png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        sample_image().write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn decode(bytes: &[u8]) -> (u32, u32, Vec<u8>) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height(), img.into_bytes())
    }

    fn fix(lat: f64, lon: f64) -> GeoFix {
        GeoFix::new(lat, lon, ts()).unwrap()
    }

    /// A JPEG whose EXIF already carries an IFD0 Make tag ("Acme").
    fn jpeg_with_make() -> Vec<u8> {
        let order = ByteOrder::Big;
        let mut tiff_data = b"MM".to_vec();
        tiff_data.extend_from_slice(&order.encode_u16(42));
        tiff_data.extend_from_slice(&order.encode_u32(8));
        tiff_data.extend_from_slice(&order.encode_u16(1));
        // Make, ASCII, 5 bytes at offset 26
        tiff_data.extend_from_slice(&order.encode_u16(0x010F));
        tiff_data.extend_from_slice(&order.encode_u16(tiff::FORMAT_ASCII));
        tiff_data.extend_from_slice(&order.encode_u32(5));
        tiff_data.extend_from_slice(&order.encode_u32(26));
        tiff_data.extend_from_slice(&order.encode_u32(0));
        tiff_data.extend_from_slice(b"Acme\0");

        let mut jpeg = Jpeg::from_bytes(Bytes::from(sample_jpeg())).unwrap();
        let mut contents = EXIF_PREFIX.to_vec();
        contents.extend_from_slice(&tiff_data);
        jpeg.segments_mut()
            .insert(1, JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(contents)));
        jpeg.encoder().bytes().to_vec()
    }

    // ── embed: container handling ─────────────────────────────────────

    #[test]
    fn jpeg_pixels_preserved() {
        let input = sample_jpeg();
        let output = embed(&input, &fix(35.0, 135.0)).unwrap();
        assert_ne!(input, output);
        assert_eq!(decode(&input), decode(&output));
    }

    #[test]
    fn jpeg_non_exif_segments_untouched() {
        let input = sample_jpeg();
        let output = embed(&input, &fix(35.0, 135.0)).unwrap();

        let before = Jpeg::from_bytes(Bytes::from(input)).unwrap();
        let after = Jpeg::from_bytes(Bytes::from(output)).unwrap();
        let strip = |j: &Jpeg| -> Vec<(u8, Vec<u8>)> {
            j.segments()
                .iter()
                .filter(|s| !is_exif_segment(s))
                .map(|s| (s.marker(), s.contents().to_vec()))
                .collect()
        };
        assert_eq!(strip(&before), strip(&after));

        let after_app0 = usize::from(before.segments()[0].marker() == MARKER_APP0);
        assert_eq!(find_exif_segment_pos(after.segments()), Some(after_app0));
    }

    #[test]
    fn png_pixels_preserved_and_tagged() {
        let input = sample_png();
        let output = embed(&input, &fix(-33.9, 18.4)).unwrap();
        assert_eq!(decode(&input), decode(&output));

        let tags = read_gps_tags(&output).unwrap().unwrap();
        assert_eq!(tags.latitude_ref(), Some('S'));
        assert!((tags.latitude().unwrap() - 33.9).abs() < 1e-6);
    }

    #[test]
    fn empty_buffer_is_decode_failure() {
        assert!(matches!(
            embed(&[], &fix(35.0, 135.0)),
            Err(EmbedError::DecodeFailed(_))
        ));
    }

    #[test]
    fn garbage_is_decode_failure() {
        let junk = b"definitely not an image".to_vec();
        assert!(matches!(
            embed(&junk, &fix(35.0, 135.0)),
            Err(EmbedError::DecodeFailed(_))
        ));
    }

    #[test]
    fn output_is_deterministic() {
        let input = sample_jpeg();
        let f = fix(51.5007, -0.1246).with_altitude(12.0).with_heading(45.0);
        assert_eq!(embed(&input, &f).unwrap(), embed(&input, &f).unwrap());
    }

    #[test]
    fn concurrent_calls_are_independent() {
        let jpeg = sample_jpeg();
        let input = &jpeg;
        let fixes = [fix(10.0, 20.0), fix(-10.0, -20.0), fix(45.0, 90.0)];
        let outputs: Vec<Vec<u8>> = std::thread::scope(|s| {
            let handles: Vec<_> = fixes
                .iter()
                .map(|f| s.spawn(move || embed(input, f).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (f, out) in fixes.iter().zip(&outputs) {
            assert_eq!(out, &embed(input, f).unwrap());
        }
    }

    // ── embed: GPS values ─────────────────────────────────────────────

    #[test]
    fn reference_fix_fields() {
        let output = embed(&sample_jpeg(), &fix(35.0, 135.0)).unwrap();
        let tags = read_gps_tags(&output).unwrap().unwrap();

        assert_eq!(tags.version().as_deref(), Some("2.2.0.0"));
        assert_eq!(tags.latitude_ref(), Some('N'));
        assert_eq!(tags.longitude_ref(), Some('E'));
        assert_eq!(tags.latitude(), Some(35.0));
        assert_eq!(tags.longitude(), Some(135.0));
        assert_eq!(tags.altitude_ref(), Some(0));
        assert_eq!(tags.altitude(), Some(0.0));
        assert_eq!(tags.date_stamp().as_deref(), Some("2020:01:01"));
        assert_eq!(tags.time_stamp().as_deref(), Some("00:00:00.000000"));
    }

    #[test]
    fn negative_coordinates_use_south_west() {
        let output = embed(&sample_jpeg(), &fix(-22.9068, -43.1729)).unwrap();
        let tags = read_gps_tags(&output).unwrap().unwrap();

        assert_eq!(tags.latitude_ref(), Some('S'));
        assert_eq!(tags.longitude_ref(), Some('W'));
        assert!((tags.latitude().unwrap() - 22.9068).abs() < 1e-6);
        assert!((tags.longitude().unwrap() - 43.1729).abs() < 1e-6);
    }

    #[test]
    fn altitude_reference_and_magnitude() {
        let below = embed(&sample_jpeg(), &fix(0.0, 0.0).with_altitude(-10.0)).unwrap();
        let tags = read_gps_tags(&below).unwrap().unwrap();
        assert_eq!(tags.altitude_ref(), Some(1));
        assert_eq!(tags.altitude(), Some(10.0));

        let above = embed(&sample_jpeg(), &fix(0.0, 0.0).with_altitude(10.0)).unwrap();
        let tags = read_gps_tags(&above).unwrap().unwrap();
        assert_eq!(tags.altitude_ref(), Some(0));
        assert_eq!(tags.altitude(), Some(10.0));
    }

    #[test]
    fn heading_present_only_when_supplied() {
        let with = embed(&sample_jpeg(), &fix(1.0, 2.0).with_heading(123.45)).unwrap();
        let tags = read_gps_tags(&with).unwrap().unwrap();
        assert_eq!(tags.img_direction_ref(), Some('T'));
        assert!((tags.img_direction().unwrap() - 123.45).abs() < 1e-9);

        let without = embed(&sample_jpeg(), &fix(1.0, 2.0)).unwrap();
        let tags = read_gps_tags(&without).unwrap().unwrap();
        assert!(!tags.contains(TAG_GPS_IMG_DIRECTION_REF));
        assert!(!tags.contains(TAG_GPS_IMG_DIRECTION));
    }

    #[test]
    fn read_location_is_signed() {
        let output = embed(&sample_jpeg(), &fix(-33.8688, 151.2093)).unwrap();
        let (lat, lon) = read_location(&output).unwrap().unwrap();
        assert!((lat + 33.8688).abs() < 1e-4);
        assert!((lon - 151.2093).abs() < 1e-4);

        let output = embed(&sample_png(), &fix(40.7128, -74.006)).unwrap();
        let (lat, lon) = read_location(&output).unwrap().unwrap();
        assert!((lat - 40.7128).abs() < 1e-4);
        assert!((lon + 74.006).abs() < 1e-4);
    }

    // ── embed: existing EXIF ─────────────────────────────────────────

    #[test]
    fn existing_exif_is_preserved() {
        let input = jpeg_with_make();
        let output = embed(&input, &fix(40.0, -74.0)).unwrap();
        assert_eq!(decode(&input), decode(&output));

        let jpeg = Jpeg::from_bytes(Bytes::from(output.clone())).unwrap();
        let tiff_data = jpeg.exif().unwrap();
        let order = ByteOrder::detect(&tiff_data).unwrap();
        assert_eq!(order, ByteOrder::Big);
        let ifd0 = tiff::read_ifd(&tiff_data, order, tiff::first_ifd_offset(&tiff_data, order).unwrap()).unwrap();
        let make = ifd0.find(0x010F).unwrap();
        assert_eq!(make.data(&tiff_data, order).unwrap(), b"Acme\0");
        assert!(ifd0.find(tiff::TAG_GPS_IFD_POINTER).is_some());

        let tags = read_gps_tags(&output).unwrap().unwrap();
        assert_eq!(tags.longitude_ref(), Some('W'));
        assert_eq!(tags.latitude(), Some(40.0));
    }

    #[test]
    fn reembedding_replaces_gps() {
        let first = embed(&sample_jpeg(), &fix(10.0, 10.0).with_heading(5.0)).unwrap();
        let second = embed(&first, &fix(-20.0, 30.0)).unwrap();

        let tags = read_gps_tags(&second).unwrap().unwrap();
        assert_eq!(tags.latitude_ref(), Some('S'));
        assert_eq!(tags.latitude(), Some(20.0));
        assert!(!tags.contains(TAG_GPS_IMG_DIRECTION));

        let jpeg = Jpeg::from_bytes(Bytes::from(second)).unwrap();
        let exif_segments = jpeg.segments().iter().filter(|s| is_exif_segment(s)).count();
        assert_eq!(exif_segments, 1);
    }

    fn exif_of(jpeg: &[u8]) -> Vec<u8> {
        Jpeg::from_bytes(Bytes::copy_from_slice(jpeg)).unwrap().exif().unwrap().to_vec()
    }

    fn contains_rational(tiff_data: &[u8], value: (u32, u32)) -> bool {
        let order = ByteOrder::detect(tiff_data).unwrap();
        let needle = order.encode_rationals(&[value]);
        tiff_data.windows(needle.len()).any(|w| w == needle.as_slice())
    }

    #[test]
    fn reembedding_leaves_no_old_coordinates() {
        let first = embed(&sample_jpeg(), &fix(10.0, 77.0)).unwrap();
        assert!(contains_rational(&exif_of(&first), (77, 1)));

        let second = embed(&first, &fix(-20.0, 30.0)).unwrap();
        let tiff_data = exif_of(&second);
        assert!(!contains_rational(&tiff_data, (77, 1)));
        assert!(contains_rational(&tiff_data, (30, 1)));

        // Growing the GPS IFD (heading added) must clear the old one too
        let third = embed(&second, &fix(1.0, 2.0).with_heading(90.0)).unwrap();
        let tiff_data = exif_of(&third);
        assert!(!contains_rational(&tiff_data, (30, 1)));
        assert!(!contains_rational(&tiff_data, (20, 1)));
        let tags = read_gps_tags(&third).unwrap().unwrap();
        assert_eq!(tags.longitude(), Some(2.0));
        assert_eq!(tags.img_direction(), Some(90.0));
    }

    #[test]
    fn reembedding_does_not_grow_exif() {
        let mut image = embed(&sample_jpeg(), &fix(10.0, 77.0)).unwrap();
        let first_len = image.len();
        for i in 1..5 {
            image = embed(&image, &fix(10.0 + i as f64, 77.0 - i as f64)).unwrap();
            assert_eq!(image.len(), first_len);
        }
        let tags = read_gps_tags(&image).unwrap().unwrap();
        assert_eq!(tags.latitude(), Some(14.0));
        assert_eq!(tags.longitude(), Some(73.0));
    }

    #[test]
    fn malformed_existing_exif_is_replaced() {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(sample_jpeg())).unwrap();
        let mut contents = EXIF_PREFIX.to_vec();
        contents.extend_from_slice(b"XXgarbage");
        jpeg.segments_mut()
            .insert(1, JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(contents)));
        let input = jpeg.encoder().bytes().to_vec();

        let output = embed(&input, &fix(1.0, 1.0)).unwrap();
        let tags = read_gps_tags(&output).unwrap().unwrap();
        assert_eq!(tags.latitude(), Some(1.0));
    }

    // ── record encoding errors ───────────────────────────────────────

    #[test]
    fn invalid_record_is_encode_failure() {
        let mut record = ImageMetadataRecord::from_fix(&fix(1.0, 1.0));
        record.time_stamp = "noon".to_string();
        assert!(matches!(
            embed_record(&sample_jpeg(), &record),
            Err(EmbedError::EncodeFailed(_))
        ));

        let mut record = ImageMetadataRecord::from_fix(&fix(1.0, 1.0));
        record.version = "2.2".to_string();
        assert!(matches!(
            embed_record(&sample_jpeg(), &record),
            Err(EmbedError::EncodeFailed(_))
        ));
    }

    #[test]
    fn non_finite_altitude_is_encode_failure() {
        for altitude in [f64::NAN, f64::INFINITY, -f64::INFINITY, 1e12] {
            assert!(matches!(
                embed(&sample_jpeg(), &fix(1.0, 1.0).with_altitude(altitude)),
                Err(EmbedError::EncodeFailed(_))
            ));
        }
        assert!(embed(&sample_jpeg(), &fix(1.0, 1.0).with_altitude(-4_000_000_000.0)).is_ok());
    }

    #[test]
    fn non_finite_heading_is_encode_failure() {
        assert!(matches!(
            embed(&sample_jpeg(), &fix(1.0, 1.0).with_heading(f64::NAN)),
            Err(EmbedError::EncodeFailed(_))
        ));
    }

    #[test]
    fn negative_heading_is_wrapped() {
        let output = embed(&sample_jpeg(), &fix(1.0, 1.0).with_heading(-90.0)).unwrap();
        let tags = read_gps_tags(&output).unwrap().unwrap();
        assert_eq!(tags.img_direction(), Some(270.0));
    }

    #[test]
    fn decode_checked_before_encode() {
        let mut record = ImageMetadataRecord::from_fix(&fix(1.0, 1.0));
        record.date_stamp = "bad".to_string();
        assert!(matches!(
            embed_record(&[], &record),
            Err(EmbedError::DecodeFailed(_))
        ));
    }

    // ── helpers ──────────────────────────────────────────────────────

    #[test]
    fn dms_split() {
        assert_eq!(to_dms(35.0).unwrap(), [(35, 1), (0, 1), (0, 10_000)]);
        // 12.5125° = 12° 30' 45"
        assert_eq!(to_dms(12.5125).unwrap(), [(12, 1), (30, 1), (450_000, 10_000)]);
        assert!(to_dms(-1.0).is_err());
        assert!(to_dms(f64::NAN).is_err());
    }

    #[test]
    fn time_stamp_parsing() {
        assert_eq!(
            parse_time_stamp("13:05:09.123456").unwrap(),
            [(13, 1), (5, 1), (9_123_456, 1_000_000)]
        );
        assert_eq!(parse_time_stamp("01:02:03").unwrap(), [(1, 1), (2, 1), (3, 1)]);
        assert!(parse_time_stamp("01:02").is_err());
        assert!(parse_time_stamp("01:02:03.x").is_err());
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("2.2.0.0").unwrap(), [2, 2, 0, 0]);
        assert!(parse_version("2.2.0").is_err());
        assert!(parse_version("2.2.0.300").is_err());
    }

    #[test]
    fn date_stamp_validation() {
        assert!(validate_date_stamp("2020:01:01").is_ok());
        assert!(validate_date_stamp("2020-01-01").is_err());
        assert!(validate_date_stamp("2020:1:1").is_err());
    }

    #[test]
    fn direction_encoding() {
        assert_eq!(direction_rational(123.45).unwrap(), (12_345, 100));
        assert_eq!(direction_rational(-90.0).unwrap(), (27_000, 100));
        assert_eq!(direction_rational(720.0).unwrap(), (72_000, 100));
        assert!(direction_rational(f64::INFINITY).is_err());
    }

    #[test]
    fn fresh_exif_has_gps_ifd() {
        let record = ImageMetadataRecord::from_fix(&fix(35.0, 135.0));
        let tiff_data = build_fresh_exif(&record).unwrap();
        let order = ByteOrder::detect(&tiff_data).unwrap();
        let ifd0 = tiff::read_ifd(&tiff_data, order, tiff::first_ifd_offset(&tiff_data, order).unwrap()).unwrap();
        let pointer = ifd0.find(tiff::TAG_GPS_IFD_POINTER).unwrap();
        let gps_offset = order.read_u32(&pointer.value, 0).unwrap() as usize;
        let gps = tiff::read_ifd(&tiff_data, order, gps_offset).unwrap();
        assert_eq!(gps.entries.len(), 9);
        assert_eq!(gps.entries[0].tag, TAG_GPS_VERSION_ID);
    }
}
