//! View state of one viewer session.
//!
//! Everything here is transient: the selected file, the scroll position,
//! capture progress and the captured frames all go away on [`Session::reset`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::capture::{CancellationToken, CaptureProgress, CaptureState, CapturedFrames};
use crate::config::ViewerConfig;
use crate::sequence::{scroll_to_index, FrameRef, FrameSequence, ScrollPosition};
use crate::{Result, ScrubberError};

pub struct Session {
    sequence: FrameSequence,
    scroll: ScrollPosition,
    page_multiplier: f64,
    frame_index: usize,
    source: Option<PathBuf>,
    capture_state: CaptureState,
    progress: CaptureProgress,
    cancel: Option<CancellationToken>,
    export: Option<CancellationToken>,
}

impl Session {
    pub fn new(config: &ViewerConfig, viewport_height: f64) -> Self {
        Self {
            sequence: FrameSequence::new(config.base_url.clone(), config.frame_count),
            scroll: ScrollPosition::new(viewport_height, config.page_multiplier),
            page_multiplier: config.page_multiplier,
            frame_index: 1,
            source: None,
            capture_state: CaptureState::Idle,
            progress: CaptureProgress::default(),
            cancel: None,
            export: None,
        }
    }

    /// 1-based index of the frame on screen
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn sequence(&self) -> &FrameSequence {
        &self.sequence
    }

    pub fn scroll(&self) -> &ScrollPosition {
        &self.scroll
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture_state
    }

    pub fn progress(&self) -> CaptureProgress {
        self.progress
    }

    pub fn is_exporting(&self) -> bool {
        self.export.is_some()
    }

    pub fn captured(&self) -> Option<&Arc<CapturedFrames>> {
        self.sequence.captured()
    }

    pub fn current_frame(&self) -> FrameRef<'_> {
        self.sequence.resolve(self.frame_index)
    }

    /// Pick the video to capture from. Ignored while a capture is running.
    pub fn select_source(&mut self, path: impl Into<PathBuf>) {
        if self.capture_state.is_running() {
            warn!("Ignoring source change while a capture is running");
            return;
        }
        let path = path.into();
        info!("Selected source {}", path.display());
        self.source = Some(path);
        self.capture_state = CaptureState::Loaded;
    }

    /// Select a video the user typed in, after checking it exists
    pub fn open_source(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.capture_state.is_running() {
            return Err(ScrubberError::CaptureInProgress);
        }
        let path = path.into();
        if !path.is_file() {
            return Err(ScrubberError::SourceNotFound(path));
        }
        self.select_source(path);
        Ok(())
    }

    /// Mark a capture as started and hand out what the capture task needs.
    ///
    /// Returns `Ok(None)` without a selected file. Only one capture may hold
    /// the decoder at a time.
    pub fn begin_capture(&mut self) -> Result<Option<(PathBuf, CancellationToken)>> {
        if self.capture_state.is_running() {
            return Err(ScrubberError::CaptureInProgress);
        }
        let Some(path) = self.source.clone() else {
            debug!("No source selected, nothing to capture");
            return Ok(None);
        };

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.capture_state = CaptureState::Capturing;
        self.progress = CaptureProgress::default();
        Ok(Some((path, token)))
    }

    /// Record progress from the running capture. Never goes backwards.
    pub fn update_progress(&mut self, progress: CaptureProgress) {
        if !self.capture_state.is_running() {
            return;
        }
        if progress.completed >= self.progress.completed {
            self.progress = progress;
        }
    }

    /// Install a finished capture as the new frame sequence
    pub fn complete_capture(&mut self, frames: CapturedFrames) {
        info!("Capture complete with {} frames", frames.len());
        if frames.len() < 2 {
            // Scrolling addresses slots 1..len, so slot 0 alone is never shown
            warn!("Capture produced {} frame(s); nothing can be scrolled to", frames.len());
        }
        self.progress = CaptureProgress::new(frames.len(), frames.len());
        self.sequence.install(Arc::new(frames));
        self.capture_state = CaptureState::Complete;
        self.cancel = None;
        self.refresh_index();
    }

    /// Record a capture that ended without frames
    pub fn fail_capture(&mut self, error: &ScrubberError) {
        self.capture_state = match error {
            ScrubberError::Cancelled => CaptureState::Cancelled,
            _ => CaptureState::Failed,
        };
        self.cancel = None;
        warn!("Capture ended: {}", error);
    }

    /// Ask the running capture to stop before its next frame
    pub fn cancel_capture(&mut self) {
        if let Some(ref token) = self.cancel {
            info!("Cancelling capture");
            token.cancel();
        }
    }

    /// Claim the captured frames for an export.
    ///
    /// The token is cancelled when the session resets, so an export whose
    /// result nobody will look at never writes its file.
    pub fn begin_export(&mut self) -> Result<(Arc<CapturedFrames>, CancellationToken)> {
        if self.export.is_some() {
            return Err(ScrubberError::ExportInProgress);
        }
        let frames = match self.sequence.captured() {
            Some(frames) if !frames.is_empty() => Arc::clone(frames),
            _ => return Err(ScrubberError::NothingToExport),
        };
        let token = CancellationToken::new();
        self.export = Some(token.clone());
        Ok((frames, token))
    }

    pub fn finish_export(&mut self) {
        self.export = None;
    }

    pub fn scroll_by(&mut self, delta: f64) -> usize {
        self.scroll.scroll_by(delta);
        self.refresh_index()
    }

    pub fn jump_to_start(&mut self) -> usize {
        self.scroll.scroll_to(0.0);
        self.refresh_index()
    }

    pub fn jump_to_end(&mut self) -> usize {
        self.scroll.scroll_to(f64::INFINITY);
        self.refresh_index()
    }

    pub fn set_viewport(&mut self, viewport_height: f64) -> usize {
        self.scroll.set_viewport(viewport_height, self.page_multiplier);
        self.refresh_index()
    }

    /// Back to the initial state: index 1, progress 0, no file, no frames
    pub fn reset(&mut self) {
        self.cancel_capture();
        if let Some(export) = self.export.take() {
            info!("Discarding running export");
            export.cancel();
        }
        self.sequence.clear();
        self.scroll.scroll_to(0.0);
        self.frame_index = 1;
        self.source = None;
        self.capture_state = CaptureState::Idle;
        self.progress = CaptureProgress::default();
        self.cancel = None;
        info!("Session reset");
    }

    fn refresh_index(&mut self) -> usize {
        self.frame_index = scroll_to_index(&self.scroll, self.sequence.len());
        self.frame_index
    }
}

/// Path typed on the status line after pressing the open key
#[derive(Debug, Default)]
pub struct SourcePrompt {
    input: String,
}

impl SourcePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// The entered path, or `None` when only whitespace was typed
    pub fn submit(self) -> Option<PathBuf> {
        let trimmed = self.input.trim();
        // Quotes come along when a path is pasted from a file manager
        let unquoted = trimmed.trim_matches(|c| c == '\'' || c == '"');
        (!unquoted.is_empty()).then(|| PathBuf::from(unquoted))
    }
}
