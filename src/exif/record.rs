use serde::Serialize;

use crate::location::GeoFix;

/// GPS IFD version written with every record.
pub const GPS_VERSION: &str = "2.2.0.0";

const DATE_FORMAT: &str = "%Y:%m:%d";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// True-north reference for an image direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Heading {
    pub value: f64,
    pub reference: char,
}

/// GPS metadata derived from a [`GeoFix`], ready to be encoded as EXIF.
///
/// Magnitudes are unsigned; the sign lives in the `*_ref` fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadataRecord {
    pub latitude: f64,
    pub latitude_ref: char,
    pub longitude: f64,
    pub longitude_ref: char,
    /// Whole meters, truncated toward zero.
    pub altitude: u32,
    /// 0 = above sea level, 1 = below.
    pub altitude_ref: u8,
    /// UTC date, `yyyy:MM:dd`.
    pub date_stamp: String,
    /// UTC time, `HH:mm:ss.SSSSSS`.
    pub time_stamp: String,
    pub version: String,
    pub heading: Option<Heading>,
}

impl ImageMetadataRecord {
    /// Derive the record for a fix.
    ///
    /// ```rust
    /// use exif_geotag::exif::ImageMetadataRecord;
    /// use exif_geotag::location::GeoFix;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    /// let fix = GeoFix::new(-33.5, -70.25, ts).unwrap().with_altitude(-10.7);
    /// let record = ImageMetadataRecord::from_fix(&fix);
    ///
    /// assert_eq!(record.latitude_ref, 'S');
    /// assert_eq!(record.longitude_ref, 'W');
    /// assert_eq!(record.altitude, 10);
    /// assert_eq!(record.altitude_ref, 1);
    /// assert_eq!(record.time_stamp, "00:00:00.000000");
    /// ```
    pub fn from_fix(fix: &GeoFix) -> Self {
        let latitude = fix.latitude();
        let longitude = fix.longitude();
        let altitude = fix.altitude();
        let timestamp = fix.timestamp();

        Self {
            latitude: latitude.abs(),
            latitude_ref: if latitude < 0.0 { 'S' } else { 'N' },
            longitude: longitude.abs(),
            longitude_ref: if longitude < 0.0 { 'W' } else { 'E' },
            // f64 -> u32 truncates toward zero and saturates
            altitude: altitude.abs() as u32,
            altitude_ref: if altitude < 0.0 { 1 } else { 0 },
            date_stamp: timestamp.format(DATE_FORMAT).to_string(),
            time_stamp: timestamp.format(TIME_FORMAT).to_string(),
            version: GPS_VERSION.to_string(),
            heading: fix.heading().map(|value| Heading { value, reference: 'T' }),
        }
    }
}

impl From<&GeoFix> for ImageMetadataRecord {
    fn from(fix: &GeoFix) -> Self {
        Self::from_fix(fix)
    }
}
