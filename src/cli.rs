use std::path::PathBuf;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video file to capture frames from
    pub file_path: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of slots in the fallback sequence
    #[arg(short = 'n', long)]
    pub frame_count: Option<usize>,

    /// Capture samples per second of video
    #[arg(short, long)]
    pub sample_rate: Option<u32>,

    /// Maximum wait for one seeked frame, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_timeout_ms: Option<u64>,

    /// Base URL of the remote fallback frames
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Don't fetch remote fallback frames
    #[arg(long)]
    pub offline: bool,

    /// Capture without the viewer and write the zip archive to PATH
    #[arg(short, long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Show video information only (don't capture)
    #[arg(long)]
    pub info_only: bool,

    /// Enable transparent background by not drawing background colors
    #[arg(short, long)]
    pub transparent: bool,

    /// Set terminal width (override automatic detection)
    #[arg(short, long)]
    pub width: Option<u16>,

    /// Set terminal height (override automatic detection)
    #[arg(long)]
    pub height: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Set color palette (ascii, grayscale, color)
    #[arg(short, long, default_value = "color")]
    pub palette: ColorPalette,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ColorPalette {
    /// ASCII characters only (no color)
    Ascii,
    /// Grayscale ASCII
    Grayscale,
    /// Full color ASCII
    Color,
}

impl ColorPalette {
    /// Character ramp from darkest to brightest
    pub fn ascii_chars(&self) -> &'static [char] {
        match self {
            ColorPalette::Ascii => &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'],
            ColorPalette::Grayscale | ColorPalette::Color => &[' ', '░', '▒', '▓', '█'],
        }
    }
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        // Check if file exists
        if let Some(ref path) = self.file_path {
            if !path.exists() {
                return Err(format!("Video file does not exist: {}", path.display()));
            }
        }

        if (self.export.is_some() || self.info_only) && self.file_path.is_none() {
            return Err("A video file is required for --export and --info-only".to_string());
        }

        if let Some(frame_count) = self.frame_count {
            if frame_count < 2 {
                return Err("Frame count must be at least 2".to_string());
            }
        }

        if self.sample_rate == Some(0) {
            return Err("Sample rate must be greater than 0".to_string());
        }

        if self.settle_timeout_ms == Some(0) {
            return Err("Settle timeout must be greater than 0".to_string());
        }

        // Validate terminal dimensions
        if self.width == Some(0) {
            return Err("Terminal width must be greater than 0".to_string());
        }

        if self.height == Some(0) {
            return Err("Terminal height must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get effective terminal dimensions
    pub fn get_terminal_size(&self) -> Result<(u16, u16), std::io::Error> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Ok((w, h)),
            (Some(w), None) => {
                let (_, h) = crossterm::terminal::size()?;
                Ok((w, h))
            }
            (None, Some(h)) => {
                let (w, _) = crossterm::terminal::size()?;
                Ok((w, h))
            }
            (None, None) => crossterm::terminal::size(),
        }
    }

    /// Check if color output is enabled
    pub fn use_color(&self) -> bool {
        matches!(self.palette, ColorPalette::Color | ColorPalette::Grayscale)
    }
}
