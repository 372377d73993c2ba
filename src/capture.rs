//! Fixed-rate video capture.
//!
//! A [`CaptureDriver`] walks a [`FrameSource`] through its timeline at
//! `sample_rate` samples per second, rasterizing one [`CapturedFrame`] per
//! sample. Frames are appended in timestamp order and handed back as a
//! complete [`CapturedFrames`] set once the run finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, info, warn};

use crate::{Result, ScrubberError, DEFAULT_SAMPLE_RATE};

/// Metadata of a loaded video
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Duration in seconds
    pub duration: f64,
}

/// Anything that can rasterize the frame shown at a given timestamp.
pub trait FrameSource {
    /// Metadata, available once the source is loaded
    fn info(&self) -> VideoInfo;

    /// Seek to `timestamp` seconds and return the frame displayed there.
    ///
    /// Implementations must wait for the decoder to actually produce the
    /// seeked frame, and give up with [`ScrubberError::SettleTimeout`] once
    /// `timeout` has elapsed.
    fn frame_at(&mut self, timestamp: f64, timeout: Duration) -> Result<RgbImage>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn frame_at(&mut self, timestamp: f64, timeout: Duration) -> Result<RgbImage> {
        (**self).frame_at(timestamp, timeout)
    }
}

/// A single rasterized sample. Immutable once captured.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// 1-based position in capture order
    pub position: usize,
    /// Sampled timestamp in seconds
    pub timestamp: f64,
    pub image: RgbImage,
}

/// Append-only sequence of captured frames, in increasing timestamp order.
#[derive(Debug, Clone, Default)]
pub struct CapturedFrames {
    frames: Vec<CapturedFrame>,
}

impl CapturedFrames {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Append the next sample. Its timestamp must be after the previous one.
    pub(crate) fn push(&mut self, timestamp: f64, image: RgbImage) {
        debug_assert!(self
            .frames
            .last()
            .map_or(true, |last| last.timestamp < timestamp));
        let position = self.frames.len() + 1;
        self.frames.push(CapturedFrame {
            position,
            timestamp,
            image,
        });
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at a 0-based sequence index
    pub fn get(&self, index: usize) -> Option<&CapturedFrame> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CapturedFrame> {
        self.frames.iter()
    }

    pub fn as_slice(&self) -> &[CapturedFrame] {
        &self.frames
    }
}

impl<'a> IntoIterator for &'a CapturedFrames {
    type Item = &'a CapturedFrame;
    type IntoIter = std::slice::Iter<'a, CapturedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Snapshot of a capture run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureProgress {
    pub completed: usize,
    pub total: usize,
    /// `floor(completed / total * 100)`
    pub percent: u8,
}

impl CaptureProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self {
            completed,
            total,
            percent: progress_percent(completed, total),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// Where a capture run publishes its progress.
pub trait ProgressSink {
    fn on_progress(&self, progress: &CaptureProgress);
}

/// Discards every update
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: &CaptureProgress) {}
}

impl ProgressSink for tokio::sync::watch::Sender<CaptureProgress> {
    fn on_progress(&self, progress: &CaptureProgress) {
        self.send_replace(*progress);
    }
}

impl<F: Fn(&CaptureProgress)> ProgressSink for F {
    fn on_progress(&self, progress: &CaptureProgress) {
        self(progress)
    }
}

/// Cooperative cancellation flag, checked before every seek.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Lifecycle of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No source loaded
    Idle,
    /// Source metadata is available
    Loaded,
    Capturing,
    Complete,
    Cancelled,
    Failed,
}

impl CaptureState {
    /// True while a run is holding the decoder
    pub fn is_running(&self) -> bool {
        matches!(self, CaptureState::Capturing)
    }
}

/// Capture tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    /// Samples per second of video
    pub sample_rate: u32,
    /// Upper bound on waiting for one seeked frame
    pub settle_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            settle_timeout: Duration::from_secs(2),
        }
    }
}

/// Number of samples taken from a video of `duration` seconds
pub fn total_frames(duration: f64, sample_rate: u32) -> usize {
    if !duration.is_finite() || duration <= 0.0 {
        return 0;
    }
    (duration * sample_rate as f64).floor() as usize
}

/// Whole percentage of `completed` out of `total`, rounded down
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) * 100) / total) as u8
}

/// Drives a [`FrameSource`] through its timeline
pub struct CaptureDriver<S> {
    source: S,
    config: CaptureConfig,
    cancel: CancellationToken,
    state: CaptureState,
}

impl<S: FrameSource> CaptureDriver<S> {
    /// Wrap a loaded source. The driver starts in [`CaptureState::Loaded`].
    pub fn new(source: S, config: CaptureConfig, cancel: CancellationToken) -> Self {
        Self {
            source,
            config,
            cancel,
            state: CaptureState::Loaded,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn info(&self) -> VideoInfo {
        self.source.info()
    }

    /// Number of samples this run will produce
    pub fn total_frames(&self) -> usize {
        total_frames(self.source.info().duration, self.config.sample_rate)
    }

    /// Capture every sample in order, publishing progress after each one.
    pub fn run(&mut self, progress: &dyn ProgressSink) -> Result<CapturedFrames> {
        let info = self.source.info();
        let total = self.total_frames();
        if total == 0 {
            self.state = CaptureState::Failed;
            return Err(ScrubberError::EmptyCapture {
                duration: info.duration,
                sample_rate: self.config.sample_rate,
            });
        }

        info!(
            "Capturing {} frames from {}x{} video ({:.2}s at {} samples/s)",
            total, info.width, info.height, info.duration, self.config.sample_rate
        );

        self.state = CaptureState::Capturing;
        let started = Instant::now();
        let mut frames = CapturedFrames::with_capacity(total);

        for i in 0..total {
            if self.cancel.is_cancelled() {
                info!("Capture cancelled after {} of {} frames", i, total);
                self.state = CaptureState::Cancelled;
                return Err(ScrubberError::Cancelled);
            }

            let timestamp = i as f64 / self.config.sample_rate as f64;
            let image = match self.source.frame_at(timestamp, self.config.settle_timeout) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Capture failed at {:.3}s: {}", timestamp, e);
                    self.state = CaptureState::Failed;
                    return Err(e);
                }
            };

            frames.push(timestamp, image);

            let snapshot = CaptureProgress::new(i + 1, total);
            debug!(
                "Captured frame {}/{} at {:.3}s ({}%)",
                snapshot.completed, total, timestamp, snapshot.percent
            );
            progress.on_progress(&snapshot);
        }

        self.state = CaptureState::Complete;
        info!(
            "Captured {} frames in {:.2}s",
            frames.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(frames)
    }

    /// Give the source back, e.g. to run another capture
    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Source that paints each frame with a shade derived from its timestamp
    pub(crate) struct SyntheticSource {
        pub info: VideoInfo,
        pub requested: Vec<f64>,
        pub fail_at: Option<usize>,
    }

    impl SyntheticSource {
        pub(crate) fn new(duration: f64) -> Self {
            Self {
                info: VideoInfo {
                    width: 4,
                    height: 2,
                    fps: 30.0,
                    duration,
                },
                requested: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl FrameSource for SyntheticSource {
        fn info(&self) -> VideoInfo {
            self.info
        }

        fn frame_at(&mut self, timestamp: f64, timeout: Duration) -> Result<RgbImage> {
            if self.fail_at == Some(self.requested.len()) {
                return Err(ScrubberError::SettleTimeout {
                    timestamp,
                    waited: timeout,
                });
            }
            self.requested.push(timestamp);
            let shade = ((timestamp * 100.0) as u32 % 256) as u8;
            Ok(RgbImage::from_pixel(
                self.info.width,
                self.info.height,
                image::Rgb([shade, shade, shade]),
            ))
        }
    }

    #[test]
    fn test_total_frames() {
        assert_eq!(total_frames(2.0, 25), 50);
        assert_eq!(total_frames(6.0, 25), 150);
        assert_eq!(total_frames(0.03, 25), 0);
        assert_eq!(total_frames(0.0, 25), 0);
        assert_eq!(total_frames(f64::NAN, 25), 0);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 50), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(1, 0), 0);
    }

    #[test]
    fn test_two_second_capture() {
        let seen = RefCell::new(Vec::new());
        let sink = |p: &CaptureProgress| seen.borrow_mut().push(*p);

        let mut driver = CaptureDriver::new(
            SyntheticSource::new(2.0),
            CaptureConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(driver.state(), CaptureState::Loaded);

        let frames = driver.run(&sink).unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(driver.state(), CaptureState::Complete);

        for pair in frames.as_slice().windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert_eq!(pair[0].position + 1, pair[1].position);
        }
        assert_eq!(frames.get(0).unwrap().position, 1);

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 50);
        for (k, p) in seen.iter().enumerate() {
            assert_eq!(p.percent as usize, (k + 1) * 100 / 50);
        }
        assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(seen.last().unwrap().percent, 100);
        assert!(seen.last().unwrap().is_complete());
    }

    #[test]
    fn test_samples_requested_at_fixed_rate() {
        let mut driver = CaptureDriver::new(
            SyntheticSource::new(0.2),
            CaptureConfig::default(),
            CancellationToken::new(),
        );
        driver.run(&NoProgress).unwrap();
        let source = driver.into_source();
        assert_eq!(source.requested, vec![0.0, 0.04, 0.08, 0.12, 0.16]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let mut driver =
            CaptureDriver::new(SyntheticSource::new(1.0), CaptureConfig::default(), token);

        let result = driver.run(&NoProgress);
        assert!(matches!(result, Err(ScrubberError::Cancelled)));
        assert_eq!(driver.state(), CaptureState::Cancelled);
        assert!(driver.into_source().requested.is_empty());
    }

    #[test]
    fn test_cancel_mid_run() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let sink = move |p: &CaptureProgress| {
            if p.completed == 3 {
                trigger.cancel();
            }
        };
        let mut driver =
            CaptureDriver::new(SyntheticSource::new(1.0), CaptureConfig::default(), token);

        assert!(matches!(driver.run(&sink), Err(ScrubberError::Cancelled)));
        assert_eq!(driver.into_source().requested.len(), 3);
    }

    #[test]
    fn test_source_error_is_surfaced() {
        let mut source = SyntheticSource::new(1.0);
        source.fail_at = Some(4);
        let mut driver =
            CaptureDriver::new(source, CaptureConfig::default(), CancellationToken::new());

        let result = driver.run(&NoProgress);
        assert!(matches!(result, Err(ScrubberError::SettleTimeout { .. })));
        assert_eq!(driver.state(), CaptureState::Failed);
    }

    #[test]
    fn test_too_short_video() {
        let mut driver = CaptureDriver::new(
            SyntheticSource::new(0.01),
            CaptureConfig::default(),
            CancellationToken::new(),
        );
        let result = driver.run(&NoProgress);
        assert!(matches!(result, Err(ScrubberError::EmptyCapture { .. })));
    }

    #[test]
    fn test_watch_sender_sink() {
        let (tx, rx) = tokio::sync::watch::channel(CaptureProgress::default());
        let mut driver = CaptureDriver::new(
            SyntheticSource::new(0.4),
            CaptureConfig::default(),
            CancellationToken::new(),
        );
        driver.run(&tx).unwrap();
        assert_eq!(*rx.borrow(), CaptureProgress::new(10, 10));
    }
}
