use ffmpeg_next as ffmpeg;
use image::RgbImage;
use log::{debug, info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::capture::{FrameSource, VideoInfo};
use crate::{Result, ScrubberError};

/// Video decoder that rasterizes the frame shown at a requested timestamp
pub struct VideoDecoder {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    /// Presentation time of the first frame, in seconds
    start_time: f64,
    fps: f64,
    duration: f64,
}

impl VideoDecoder {
    /// Create a new VideoDecoder from a file path
    pub fn new(path: &Path) -> Result<Self> {
        if let Err(e) = ffmpeg::init() {
            // Continue anyway as this might not be fatal
            debug!("FFmpeg init error: {:?}", e);
        }

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| {
            info!("Failed to open video file '{}': {}", path.display(), e);
            ScrubberError::VideoDecoding(e)
        })?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| ScrubberError::NoVideoStream(path.to_path_buf()))?;

        let stream_index = stream.index();
        let time_base = stream.time_base();

        info!("Found video stream {} in file '{}'", stream_index, path.display());

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context_decoder.decoder().video()?;

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            25.0 // Default fallback FPS
        };

        let start_time = match stream.start_time() {
            ts if ts != ffmpeg::ffi::AV_NOPTS_VALUE => seconds(ts, time_base),
            _ => 0.0,
        };

        let duration = if stream.duration() != ffmpeg::ffi::AV_NOPTS_VALUE && stream.duration() > 0 {
            seconds(stream.duration(), time_base)
        } else if input_context.duration() > 0 {
            input_context.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        debug!(
            "Video info: {}x{}, {:.2} FPS, {:.2}s duration, starts at {:.3}s",
            decoder.width(),
            decoder.height(),
            fps,
            duration,
            start_time
        );

        Ok(Self {
            input_context,
            stream_index,
            time_base,
            decoder,
            scaler: None,
            start_time,
            fps,
            duration,
        })
    }

    /// Get video FPS
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Get video duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Offset of the first frame; sample times are relative to it
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Get video dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    /// Seek to the keyframe at or before `timestamp` seconds into the video
    pub fn seek_to(&mut self, timestamp: f64) -> Result<()> {
        let position = seek_position(timestamp, self.start_time);
        self.input_context.seek(position, ..position)?;

        // Reset decoder state
        self.decoder.flush();

        debug!("Seeked to timestamp: {:.3}s", timestamp);
        Ok(())
    }

    /// Decode forward from the last seek until a frame reaches `target`.
    ///
    /// Frames within half a source frame of the target count as arrived. If
    /// the stream ends first, the last decoded frame is the one on screen.
    fn decode_until(&mut self, target: f64, deadline: Instant, timeout: Duration) -> Result<RgbImage> {
        let tolerance = 0.5 / self.fps;
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut last: Option<ffmpeg::frame::Video> = None;

        for (stream, packet) in self.input_context.packets() {
            if Instant::now() >= deadline {
                return Err(ScrubberError::SettleTimeout {
                    timestamp: target,
                    waited: timeout,
                });
            }
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if frame_seconds(&decoded, self.time_base, self.start_time) + tolerance >= target {
                    return to_rgb_image(&mut self.scaler, &decoded);
                }
                last = Some(decoded.clone());
            }
        }

        // Drain whatever the decoder is still holding
        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if frame_seconds(&decoded, self.time_base, self.start_time) + tolerance >= target {
                return to_rgb_image(&mut self.scaler, &decoded);
            }
            last = Some(decoded.clone());
        }

        match last {
            Some(frame) => {
                debug!("Stream ended before {:.3}s, using last decoded frame", target);
                to_rgb_image(&mut self.scaler, &frame)
            }
            None => Err(ScrubberError::FrameNotFound { timestamp: target }),
        }
    }
}

impl FrameSource for VideoDecoder {
    fn info(&self) -> VideoInfo {
        let (width, height) = self.dimensions();
        VideoInfo {
            width,
            height,
            fps: self.fps,
            duration: self.duration,
        }
    }

    fn frame_at(&mut self, timestamp: f64, timeout: Duration) -> Result<RgbImage> {
        let deadline = Instant::now() + timeout;
        self.seek_to(timestamp)?;
        let image = self.decode_until(timestamp, deadline, timeout);
        if let Err(ref e) = image {
            warn!("No frame for {:.3}s: {}", timestamp, e);
        }
        image
    }
}

fn seconds(ts: i64, time_base: ffmpeg::Rational) -> f64 {
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Container seek target, in AV_TIME_BASE units, for a time relative to the first frame
fn seek_position(timestamp: f64, start_time: f64) -> i64 {
    ((timestamp + start_time) * f64::from(ffmpeg::ffi::AV_TIME_BASE)).round() as i64
}

/// Presentation time of a decoded frame, relative to the first frame
fn frame_seconds(frame: &ffmpeg::frame::Video, time_base: ffmpeg::Rational, start_time: f64) -> f64 {
    match frame.timestamp().or_else(|| frame.pts()) {
        Some(ts) if ts != ffmpeg::ffi::AV_NOPTS_VALUE => seconds(ts, time_base) - start_time,
        _ => 0.0,
    }
}

/// Convert a decoded frame to a tightly packed RGB image
fn to_rgb_image(
    scaler: &mut Option<ffmpeg::software::scaling::Context>,
    frame: &ffmpeg::frame::Video,
) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();

    // Initialize scaler if needed
    if scaler.is_none() {
        *scaler = Some(ffmpeg::software::scaling::Context::get(
            frame.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )?);
    }

    let mut rgb_frame = ffmpeg::frame::Video::empty();
    if let Some(scaler) = scaler.as_mut() {
        scaler.run(frame, &mut rgb_frame)?;
    }

    // Strip per-row padding
    let stride = rgb_frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = rgb_frame.data(0);
    let mut buffer = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or(ScrubberError::FrameNotFound { timestamp: 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{total_frames, CancellationToken, CaptureConfig, CaptureDriver, NoProgress};
    use std::path::PathBuf;
    use std::process::Command;
    use tempfile::TempDir;

    /// Render a `testsrc` clip with the ffmpeg CLI, or `None` when ffmpeg is missing
    fn test_clip(file_name: &str, size: &str, duration: u32) -> Option<(TempDir, PathBuf)> {
        let dir = tempfile::tempdir().ok()?;
        let path = dir.path().join(file_name);
        let source = format!("testsrc=duration={}:size={}:rate=25", duration, size);
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "lavfi", "-i", source.as_str(), "-pix_fmt", "yuv420p", "-y"])
            .arg(&path)
            .status()
            .ok()?;
        status.success().then_some((dir, path))
    }

    #[test]
    fn test_invalid_file() {
        let invalid_path = PathBuf::from("nonexistent.mp4");
        let result = VideoDecoder::new(&invalid_path);
        assert!(result.is_err(), "Should fail for nonexistent file");
    }

    #[test]
    fn test_seconds_conversion() {
        let time_base = ffmpeg::Rational::new(1, 12800);
        assert_eq!(seconds(25600, time_base), 2.0);
        assert_eq!(seconds(0, time_base), 0.0);
    }

    #[test]
    fn test_seek_position_includes_start_offset() {
        assert_eq!(seek_position(0.0, 0.0), 0);
        assert_eq!(seek_position(0.5, 0.0), 500_000);
        assert_eq!(seek_position(0.5, 1.4), 1_900_000);
    }

    #[test]
    fn test_decoder_metadata() {
        let Some((_dir, clip)) = test_clip("clip.mp4", "160x120", 2) else {
            eprintln!("ffmpeg not available, skipping");
            return;
        };
        let decoder = VideoDecoder::new(&clip).unwrap();
        assert_eq!(decoder.dimensions(), (160, 120));
        assert!((decoder.fps() - 25.0).abs() < 0.01);
        assert!((decoder.duration() - 2.0).abs() < 0.05);
        assert_eq!(total_frames(decoder.duration(), 25), 50);
    }

    #[test]
    fn test_frames_are_packed_for_odd_strides() {
        // 90 * 3 bytes per row is not a multiple of the usual line alignment
        let Some((_dir, clip)) = test_clip("narrow.mp4", "90x60", 1) else {
            eprintln!("ffmpeg not available, skipping");
            return;
        };
        let mut decoder = VideoDecoder::new(&clip).unwrap();
        let image = decoder.frame_at(0.5, Duration::from_secs(2)).unwrap();
        assert_eq!(image.dimensions(), (90, 60));
        assert_eq!(image.as_raw().len(), 90 * 60 * 3);
    }

    #[test]
    fn test_seeks_land_on_distinct_frames() {
        let Some((_dir, clip)) = test_clip("clip.mp4", "160x120", 2) else {
            eprintln!("ffmpeg not available, skipping");
            return;
        };
        let mut decoder = VideoDecoder::new(&clip).unwrap();
        let timeout = Duration::from_secs(2);
        let early = decoder.frame_at(0.2, timeout).unwrap();
        let late = decoder.frame_at(1.6, timeout).unwrap();
        let early_again = decoder.frame_at(0.2, timeout).unwrap();

        assert_ne!(early, late);
        assert_eq!(early, early_again);
    }

    #[test]
    fn test_transport_stream_start_offset() {
        // MPEG-TS starts its timestamps well after zero
        let Some((_dir, clip)) = test_clip("clip.ts", "160x120", 2) else {
            eprintln!("ffmpeg not available, skipping");
            return;
        };
        let decoder = VideoDecoder::new(&clip).unwrap();
        assert!(decoder.start_time() > 0.0);

        let mut driver = CaptureDriver::new(decoder, CaptureConfig::default(), CancellationToken::new());
        let frames = driver.run(&NoProgress).unwrap();
        assert!(frames.len() >= 45, "captured {} frames", frames.len());
        // The opening samples must not all collapse onto the first frame
        let first = &frames.get(0).unwrap().image;
        assert_ne!(first, &frames.get(5).unwrap().image);
    }
}
