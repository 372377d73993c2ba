//! The addressable frame sequence and the scroll position that drives it.

use std::sync::Arc;

use crate::capture::{CapturedFrame, CapturedFrames};

/// Vertical scroll state of the virtual page the sequence is laid out on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollPosition {
    /// A page `page_multiplier` viewports tall, scrolled to the top
    pub fn new(viewport_height: f64, page_multiplier: f64) -> Self {
        Self {
            scroll_top: 0.0,
            scroll_height: viewport_height * page_multiplier,
            viewport_height,
        }
    }

    /// Largest reachable `scroll_top`; zero when the page does not scroll
    pub fn max_scroll(&self) -> f64 {
        (self.scroll_height - self.viewport_height).max(0.0)
    }

    /// How far down the page we are, in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        let max = self.max_scroll();
        if max <= 0.0 || !max.is_finite() || !self.scroll_top.is_finite() {
            return 0.0;
        }
        (self.scroll_top / max).clamp(0.0, 1.0)
    }

    pub fn scroll_by(&mut self, delta: f64) {
        self.scroll_to(self.scroll_top + delta);
    }

    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.clamp(0.0, self.max_scroll());
    }

    /// Resize the viewport, keeping the same relative position on the page
    pub fn set_viewport(&mut self, viewport_height: f64, page_multiplier: f64) {
        let fraction = self.fraction();
        self.viewport_height = viewport_height;
        self.scroll_height = viewport_height * page_multiplier;
        self.scroll_top = fraction * self.max_scroll();
    }
}

/// Map a scroll position onto a 1-based index into a sequence of
/// `frame_count` slots. The result lies in `[1, frame_count - 1]` and never
/// decreases as `scroll_top` grows.
pub fn scroll_to_index(position: &ScrollPosition, frame_count: usize) -> usize {
    let last = frame_count.saturating_sub(1).max(1);
    let raw = (position.fraction() * frame_count as f64).ceil() as usize;
    (raw + 1).min(last)
}

/// Remote image URL for a sequence slot
pub fn fallback_url(base_url: &str, index: usize) -> String {
    format!("{}{:04}.jpg", base_url, index)
}

/// What the display surface should show for a slot
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRef<'a> {
    /// Pre-capture: a frame of the remote fallback set
    Remote { index: usize, url: String },
    /// Post-capture: one of our own frames
    Captured(&'a CapturedFrame),
    /// Post-capture, but the captured set has no such slot
    Unavailable { index: usize, available: usize },
}

/// Fixed-length sequence of image slots, served remotely until a capture
/// is handed over.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    base_url: String,
    frame_count: usize,
    captured: Option<Arc<CapturedFrames>>,
}

impl FrameSequence {
    pub fn new(base_url: impl Into<String>, frame_count: usize) -> Self {
        Self {
            base_url: base_url.into(),
            frame_count,
            captured: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured length of the remote sequence
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of addressable slots: the captured count once a capture has
    /// been installed, the configured count before.
    pub fn len(&self) -> usize {
        match &self.captured {
            Some(frames) => frames.len(),
            None => self.frame_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_captured(&self) -> bool {
        self.captured.is_some()
    }

    pub fn captured(&self) -> Option<&Arc<CapturedFrames>> {
        self.captured.as_ref()
    }

    /// Swap in a completed capture
    pub fn install(&mut self, frames: Arc<CapturedFrames>) {
        self.captured = Some(frames);
    }

    /// Drop any installed capture and go back to the remote set
    pub fn clear(&mut self) {
        self.captured = None;
    }

    pub fn resolve(&self, index: usize) -> FrameRef<'_> {
        match &self.captured {
            None => FrameRef::Remote {
                index,
                url: fallback_url(&self.base_url, index),
            },
            Some(frames) => match frames.get(index) {
                Some(frame) => FrameRef::Captured(frame),
                None => FrameRef::Unavailable {
                    index,
                    available: frames.len(),
                },
            },
        }
    }

    /// Remote frames worth warming up. Empty once a real capture exists.
    pub fn preload_requests(&self) -> Vec<(usize, String)> {
        let captured = self.captured.as_ref().map_or(0, |frames| frames.len());
        if captured >= 2 {
            return Vec::new();
        }
        (0..self.frame_count)
            .map(|index| (index, fallback_url(&self.base_url, index)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::SyntheticSource;
    use crate::capture::{CancellationToken, CaptureConfig, CaptureDriver, NoProgress};

    fn capture(duration: f64) -> Arc<CapturedFrames> {
        let mut driver = CaptureDriver::new(
            SyntheticSource::new(duration),
            CaptureConfig::default(),
            CancellationToken::new(),
        );
        Arc::new(driver.run(&NoProgress).unwrap())
    }

    fn page(top: f64) -> ScrollPosition {
        ScrollPosition {
            scroll_top: top,
            scroll_height: 6000.0,
            viewport_height: 1000.0,
        }
    }

    #[test]
    fn test_index_at_top() {
        assert_eq!(scroll_to_index(&page(0.0), 145), 1);
    }

    #[test]
    fn test_index_halfway() {
        assert_eq!(scroll_to_index(&page(2500.0), 145), 74);
    }

    #[test]
    fn test_index_at_bottom_stays_in_range() {
        assert_eq!(scroll_to_index(&page(5000.0), 145), 144);
        assert_eq!(scroll_to_index(&page(9000.0), 145), 144);
    }

    #[test]
    fn test_index_monotonic_and_bounded() {
        let mut previous = 0;
        for step in 0..=5000 {
            let index = scroll_to_index(&page(step as f64), 145);
            assert!(index >= previous);
            assert!((1..=144).contains(&index));
            previous = index;
        }
    }

    #[test]
    fn test_unscrollable_page() {
        let flat = ScrollPosition {
            scroll_top: 0.0,
            scroll_height: 800.0,
            viewport_height: 800.0,
        };
        assert_eq!(flat.fraction(), 0.0);
        assert_eq!(scroll_to_index(&flat, 145), 1);

        let short = ScrollPosition {
            scroll_top: 10.0,
            scroll_height: 500.0,
            viewport_height: 800.0,
        };
        assert_eq!(scroll_to_index(&short, 145), 1);
    }

    #[test]
    fn test_tiny_sequences() {
        assert_eq!(scroll_to_index(&page(5000.0), 2), 1);
        assert_eq!(scroll_to_index(&page(5000.0), 1), 1);
    }

    #[test]
    fn test_scroll_by_clamps() {
        let mut position = ScrollPosition::new(40.0, 6.0);
        position.scroll_by(-10.0);
        assert_eq!(position.scroll_top, 0.0);
        position.scroll_by(1000.0);
        assert_eq!(position.scroll_top, 200.0);
        assert_eq!(position.fraction(), 1.0);
    }

    #[test]
    fn test_set_viewport_keeps_fraction() {
        let mut position = ScrollPosition::new(40.0, 6.0);
        position.scroll_to(100.0);
        position.set_viewport(20.0, 6.0);
        assert_eq!(position.max_scroll(), 100.0);
        assert_eq!(position.scroll_top, 50.0);
    }

    #[test]
    fn test_fallback_url() {
        assert_eq!(fallback_url("https://x/", 7), "https://x/0007.jpg");
        assert_eq!(fallback_url("https://x/", 144), "https://x/0144.jpg");
    }

    #[test]
    fn test_resolve_before_capture() {
        let sequence = FrameSequence::new("https://x/", 145);
        assert_eq!(
            sequence.resolve(12),
            FrameRef::Remote {
                index: 12,
                url: "https://x/0012.jpg".to_string()
            }
        );
        assert_eq!(sequence.len(), 145);
    }

    #[test]
    fn test_resolve_after_capture() {
        let mut sequence = FrameSequence::new("https://x/", 145);
        sequence.install(capture(2.0));
        assert_eq!(sequence.len(), 50);

        match sequence.resolve(3) {
            FrameRef::Captured(frame) => assert_eq!(frame.position, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            sequence.resolve(74),
            FrameRef::Unavailable {
                index: 74,
                available: 50
            }
        );

        sequence.clear();
        assert!(matches!(sequence.resolve(3), FrameRef::Remote { .. }));
    }

    #[test]
    fn test_preload_requests() {
        let mut sequence = FrameSequence::new("https://x/", 145);
        let requests = sequence.preload_requests();
        assert_eq!(requests.len(), 145);
        assert_eq!(requests[0], (0, "https://x/0000.jpg".to_string()));
        assert_eq!(requests[144].1, "https://x/0144.jpg");

        sequence.install(capture(0.04));
        assert_eq!(sequence.preload_requests().len(), 145);

        sequence.install(capture(0.08));
        assert!(sequence.preload_requests().is_empty());
    }
}
