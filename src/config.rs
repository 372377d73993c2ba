use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::capture::CaptureConfig;
use crate::cli::Cli;
use crate::{Result, ScrubberError, DEFAULT_BASE_URL, DEFAULT_FRAME_COUNT, DEFAULT_SAMPLE_RATE};

/// Viewer settings, loadable from a JSON file and overridable from the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Slots in the remote fallback sequence
    pub frame_count: usize,
    /// Capture samples per second of video
    pub sample_rate: u32,
    /// How long to wait for one seeked frame before failing the capture
    pub settle_timeout_ms: u64,
    /// Prefix of the remote fallback image URLs
    pub base_url: String,
    /// Page height in viewports
    pub page_multiplier: f64,
    /// Rows scrolled per wheel notch or arrow key
    pub scroll_step: f64,
    /// Parallel downloads while preloading fallback frames
    pub preload_concurrency: usize,
    /// Skip fetching fallback frames
    pub offline: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            settle_timeout_ms: 2000,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_multiplier: 6.0,
            scroll_step: 3.0,
            preload_concurrency: 8,
            offline: false,
        }
    }
}

impl ViewerConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Config file (if any) with command line overrides applied
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(frame_count) = cli.frame_count {
            self.frame_count = frame_count;
        }
        if let Some(sample_rate) = cli.sample_rate {
            self.sample_rate = sample_rate;
        }
        if let Some(timeout) = cli.settle_timeout_ms {
            self.settle_timeout_ms = timeout;
        }
        if let Some(ref base_url) = cli.base_url {
            self.base_url = base_url.clone();
        }
        if cli.offline {
            self.offline = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_count < 2 {
            return Err(ScrubberError::InvalidConfig(
                "Frame count must be at least 2".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ScrubberError::InvalidConfig(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.settle_timeout_ms == 0 {
            return Err(ScrubberError::InvalidConfig(
                "Settle timeout must be greater than 0".to_string(),
            ));
        }
        if !(self.page_multiplier > 1.0) {
            return Err(ScrubberError::InvalidConfig(
                "Page multiplier must be greater than 1".to_string(),
            ));
        }
        if !(self.scroll_step > 0.0) {
            return Err(ScrubberError::InvalidConfig(
                "Scroll step must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            settle_timeout: Duration::from_millis(self.settle_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_count, 145);
        assert_eq!(config.capture_config(), CaptureConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"frame_count": 60, "offline": true}}"#).unwrap();

        let config = ViewerConfig::load(file.path()).unwrap();
        assert_eq!(config.frame_count, 60);
        assert!(config.offline);
        assert_eq!(config.sample_rate, 25);
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            ViewerConfig::load(file.path()),
            Err(ScrubberError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["frame-scrub", "--frame-count", "90", "--sample-rate", "10", "--offline"]);
        let config = ViewerConfig::from_cli(&cli).unwrap();
        assert_eq!(config.frame_count, 90);
        assert_eq!(config.sample_rate, 10);
        assert!(config.offline);
    }

    #[test]
    fn test_invalid_values() {
        let config = ViewerConfig {
            frame_count: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ViewerConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ViewerConfig {
            page_multiplier: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
