use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Placeholder coordinate used when no real location source is wired in.
pub const PLACEHOLDER_LATITUDE: f64 = 35.0;
pub const PLACEHOLDER_LONGITUDE: f64 = 135.0;

/// Errors raised while building or obtaining a [`GeoFix`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// A single geolocation reading taken at capture time.
///
/// Latitude is negative south of the equator, longitude negative west of
/// Greenwich, altitude negative below sea level. Heading is degrees true and
/// is carried through as-is; values outside `[0, 360)` are not rejected.
///
/// Altitude and heading are not range-checked here. A NaN or infinite value
/// in either, or an altitude beyond 32 bits of whole meters, makes
/// [`embed`](crate::exif::embed) fail with `EncodeFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoFix {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    timestamp: DateTime<Utc>,
    heading: Option<f64>,
}

impl GeoFix {
    /// Build a fix at sea level with no heading.
    ///
    /// ```rust
    /// use exif_geotag::location::GeoFix;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    /// let fix = GeoFix::new(35.0, 135.0, ts).unwrap().with_altitude(12.5);
    /// assert_eq!(fix.altitude(), 12.5);
    ///
    /// assert!(GeoFix::new(91.0, 0.0, ts).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude: 0.0,
            timestamp,
            heading: None,
        })
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    /// ISO 6709 position string as used in video location metadata.
    ///
    /// ```rust
    /// use exif_geotag::location::GeoFix;
    /// use chrono::Utc;
    ///
    /// let fix = GeoFix::new(35.0, 135.0, Utc::now()).unwrap();
    /// assert_eq!(fix.iso6709(), "+35.00000+135.00000+0CRSWGS_84");
    /// ```
    pub fn iso6709(&self) -> String {
        format!(
            "{:+09.5}{:+010.5}{:+.0}CRSWGS_84",
            self.latitude, self.longitude, self.altitude
        )
    }
}

/// Source of location fixes, queried once per capture.
///
/// Implement this to plug in a real positioning backend. The crate ships
/// [`FixedLocation`], which always reports the same coordinate.
pub trait LocationProvider {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Produce a fix for a capture happening now.
    fn current_fix(&self) -> Result<GeoFix, LocationError>;
}

/// A provider that always reports one configured position.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: Option<f64>,
    /// Pin every fix to this instant instead of the wall clock.
    pub timestamp: Option<DateTime<Utc>>,
}

impl FixedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            heading: None,
            timestamp: None,
        }
    }

    /// The hard-coded location the demo app tags every photo with.
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_LATITUDE, PLACEHOLDER_LONGITUDE)
    }
}

impl LocationProvider for FixedLocation {
    fn name(&self) -> &str {
        "fixed"
    }

    fn current_fix(&self) -> Result<GeoFix, LocationError> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let fix = GeoFix::new(self.latitude, self.longitude, timestamp)?.with_altitude(self.altitude);
        Ok(match self.heading {
            Some(h) => fix.with_heading(h),
            None => fix,
        })
    }
}
