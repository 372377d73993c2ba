//! Frame Scrub - a scroll-driven image-sequence viewer
//!
//! This crate captures a video into a fixed-rate sequence of still frames,
//! lets the user scrub through that sequence by scrolling, and exports the
//! captured frames as a numbered zip archive. Before a capture exists the
//! sequence is served from a remote fallback image set.

pub mod archive;
pub mod capture;
pub mod cli;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod fallback;
pub mod renderer;
pub mod sequence;
pub mod session;

use std::path::PathBuf;
use std::time::Duration;

pub use archive::{build_archive, entry_name, export_archive, write_archive, ARCHIVE_FILE_NAME};
pub use capture::{
    progress_percent, total_frames, CancellationToken, CaptureConfig, CaptureDriver,
    CaptureProgress, CaptureState, CapturedFrame, CapturedFrames, FrameSource, NoProgress,
    ProgressSink, VideoInfo,
};
pub use cli::{Cli, ColorPalette};
pub use config::ViewerConfig;
pub use converter::{AsciiFrame, ConversionConfig, FrameConverter};
pub use decoder::VideoDecoder;
pub use fallback::RemoteFrames;
pub use renderer::{format_status, Renderer};
pub use sequence::{fallback_url, scroll_to_index, FrameRef, FrameSequence, ScrollPosition};
pub use session::{Session, SourcePrompt};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of addressable slots in the fallback sequence
pub const DEFAULT_FRAME_COUNT: usize = 145;

/// Capture samples per second of video
pub const DEFAULT_SAMPLE_RATE: u32 = 25;

/// Remote image set shown before any capture has completed
pub const DEFAULT_BASE_URL: &str = "https://www.apple.com/105/media/us/airpods-pro/2019/1299e2f5_9206_4470_b28e_08307a42f19b/anim/sequence/large/01-hero-lightpass/";

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum ScrubberError {
    #[error("Video decoding error: {0}")]
    VideoDecoding(#[from] ffmpeg_next::Error),

    #[error("Video file does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("No video stream found in file '{}'", .0.display())]
    NoVideoStream(PathBuf),

    #[error("Frame at {timestamp:.3}s was not ready after {waited:?}")]
    SettleTimeout { timestamp: f64, waited: Duration },

    #[error("No frame could be decoded at {timestamp:.3}s")]
    FrameNotFound { timestamp: f64 },

    #[error("Video is too short to capture ({duration:.3}s at {sample_rate} samples/s)")]
    EmptyCapture { duration: f64, sample_rate: u32 },

    #[error("Capture cancelled")]
    Cancelled,

    #[error("A capture is already in progress")]
    CaptureInProgress,

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("No captured frames to export")]
    NothingToExport,

    #[error("Failed to encode frame {position}: {source}")]
    FrameEncoding {
        position: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ScrubberError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Calculate aspect ratio from dimensions
    pub fn calculate_aspect_ratio(width: u32, height: u32) -> f64 {
        if height == 0 {
            return 0.0;
        }
        width as f64 / height as f64
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        archive::{build_archive, entry_name, export_archive},
        capture::{
            CancellationToken, CaptureConfig, CaptureDriver, CaptureProgress, CaptureState,
            CapturedFrame, CapturedFrames, FrameSource, NoProgress, ProgressSink, VideoInfo,
        },
        sequence::{fallback_url, scroll_to_index, FrameRef, FrameSequence, ScrollPosition},
        session::Session,
        utils::*,
        Cli, ColorPalette, Result, ScrubberError, ViewerConfig,
    };
}
