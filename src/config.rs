use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::location::{FixedLocation, PLACEHOLDER_LATITUDE, PLACEHOLDER_LONGITUDE};

/// Top-level configuration for the exif-geotag library.
///
/// Holds the location stamped into images and where tagged images go.
///
/// # Loading
///
/// ```rust,no_run
/// use exif_geotag::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.location.latitude = 48.8584;
/// config.location.longitude = 2.2945;
/// config.output.in_place = true;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Position written into every image.
    pub location: LocationConfig,
    /// Output placement and behavior.
    pub output: OutputConfig,
}

/// A fixed position to tag images with.
///
/// Stands in for a live location source; defaults to the demo placeholder
/// `35.0, 135.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters; negative is below sea level.
    pub altitude: f64,
    /// Degrees true. Omitted from the metadata when unset.
    pub heading: Option<f64>,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, embed and report without writing any files.
    pub dry_run: bool,
    /// If `true`, overwrite the source image instead of writing a copy.
    pub in_place: bool,
    /// If `true`, create a `.bak` backup before overwriting in place.
    pub backup_originals: bool,
    /// Directory for tagged copies. Defaults to the system temp dir.
    pub output_dir: Option<String>,
    /// If `true`, decode both images and confirm the pixels match.
    pub verify_pixels: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: PLACEHOLDER_LATITUDE,
            longitude: PLACEHOLDER_LONGITUDE,
            altitude: 0.0,
            heading: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            in_place: false,
            backup_originals: true,
            output_dir: None,
            verify_pixels: false,
        }
    }
}

impl LocationConfig {
    /// A provider reporting this position at the current time.
    pub fn provider(&self) -> FixedLocation {
        FixedLocation {
            altitude: self.altitude,
            heading: self.heading,
            ..FixedLocation::new(self.latitude, self.longitude)
        }
    }
}

impl OutputConfig {
    /// Directory tagged copies are written to.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationProvider;
    use tempfile::TempDir;

    #[test]
    fn defaults_use_placeholder_location() {
        let config = Config::default();
        assert_eq!(config.location.latitude, 35.0);
        assert_eq!(config.location.longitude, 135.0);
        assert_eq!(config.location.heading, None);
        assert!(!config.output.in_place);
        assert!(config.output.backup_originals);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.location, LocationConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.location.latitude = -33.9;
        config.location.heading = Some(270.0);
        config.output.output_dir = Some("/tmp/tagged".into());
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.location.latitude, -33.9);
        assert_eq!(loaded.location.heading, Some(270.0));
        assert_eq!(loaded.output.output_dir(), PathBuf::from("/tmp/tagged"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "location": { "latitude": 10.0 } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.location.latitude, 10.0);
        assert_eq!(config.location.longitude, 135.0);
        assert!(config.output.backup_originals);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn provider_reflects_location() {
        let location = LocationConfig {
            latitude: 1.5,
            longitude: -2.5,
            altitude: 7.0,
            heading: Some(33.0),
        };
        let fix = location.provider().current_fix().unwrap();
        assert_eq!(fix.latitude(), 1.5);
        assert_eq!(fix.longitude(), -2.5);
        assert_eq!(fix.altitude(), 7.0);
        assert_eq!(fix.heading(), Some(33.0));
    }

    #[test]
    fn default_output_dir_is_temp() {
        assert_eq!(OutputConfig::default().output_dir(), std::env::temp_dir());
    }
}
