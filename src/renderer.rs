use crate::capture::{CaptureProgress, CaptureState};
use crate::converter::AsciiFrame;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableMouseCapture, EnableMouseCapture},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use log::debug;
use std::io::{stdout, Stdout, Write};

/// Terminal display surface for the frame sequence
pub struct Renderer {
    stdout: Stdout,
    transparent_mode: bool,
    use_colors: bool,
    terminal_width: u16,
    terminal_height: u16,
    active: bool,
}

impl Renderer {
    /// Create a new renderer for a terminal of the given size
    pub fn new(transparent_mode: bool, use_colors: bool, (width, height): (u16, u16)) -> Self {
        Self {
            stdout: stdout(),
            transparent_mode,
            use_colors,
            terminal_width: width,
            terminal_height: height,
            active: false,
        }
    }

    /// Initialize the terminal for rendering and wheel events
    pub fn init(&mut self) -> std::io::Result<()> {
        enable_raw_mode()?;
        execute!(self.stdout, EnterAlternateScreen, Hide, EnableMouseCapture, Clear(ClearType::All))?;
        self.active = true;
        debug!("Terminal initialized for rendering");
        Ok(())
    }

    /// Restore terminal to normal state
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        if !self.active {
            return Ok(());
        }
        execute!(self.stdout, DisableMouseCapture, Show, ResetColor, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        self.active = false;
        debug!("Terminal restored to normal state");
        Ok(())
    }

    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.terminal_width = width;
        self.terminal_height = height;
        debug!("Terminal dimensions updated: {}x{}", width, height);
    }

    /// Get current terminal dimensions
    pub fn dimensions(&self) -> (u16, u16) {
        (self.terminal_width, self.terminal_height)
    }

    /// Rows available for the frame itself (one is kept for the status line)
    pub fn frame_area(&self) -> (u16, u16) {
        (self.terminal_width, self.terminal_height.saturating_sub(1).max(1))
    }

    /// Draw a frame centered on screen, with a status line at the bottom
    pub fn render_frame_with_status(&mut self, frame: &AsciiFrame, status: &str) -> std::io::Result<()> {
        let (area_width, area_height) = self.frame_area();
        let offset_x = area_width.saturating_sub(frame.width) / 2;
        let offset_y = area_height.saturating_sub(frame.height) / 2;

        queue!(self.stdout, Clear(ClearType::All))?;

        for y in 0..frame.height {
            queue!(self.stdout, MoveTo(offset_x, offset_y + y))?;
            for x in 0..frame.width {
                let index = (y as usize) * (frame.width as usize) + x as usize;
                let Some(&character) = frame.characters.get(index) else {
                    break;
                };

                // Skip rendering spaces in transparent mode
                if self.transparent_mode && character == ' ' {
                    queue!(self.stdout, MoveTo(offset_x + x + 1, offset_y + y))?;
                    continue;
                }

                if self.use_colors {
                    let (r, g, b) = frame.fg_colors[index];
                    queue!(self.stdout, SetForegroundColor(Color::Rgb { r, g, b }))?;
                    if let Some(&(r, g, b)) = frame.bg_colors.as_ref().and_then(|bg| bg.get(index)) {
                        queue!(self.stdout, SetBackgroundColor(Color::Rgb { r, g, b }))?;
                    }
                }

                queue!(self.stdout, Print(character))?;
            }
        }

        if self.use_colors {
            queue!(self.stdout, ResetColor)?;
        }
        self.queue_status(status)?;
        self.stdout.flush()
    }

    /// Display a message in the center of the screen, with a status line
    pub fn display_message(&mut self, message: &str, status: &str) -> std::io::Result<()> {
        self.display_text(message, Color::Yellow, status)
    }

    /// Display an error message
    pub fn display_error(&mut self, error: &str, status: &str) -> std::io::Result<()> {
        self.display_text(&format!("ERROR: {}", error), Color::Red, status)
    }

    fn display_text(&mut self, message: &str, color: Color, status: &str) -> std::io::Result<()> {
        let lines: Vec<&str> = message.lines().collect();
        let start_y = (self.terminal_height / 2).saturating_sub(lines.len() as u16 / 2);

        queue!(self.stdout, Clear(ClearType::All))?;
        if self.use_colors {
            queue!(self.stdout, SetForegroundColor(color))?;
        }

        for (i, line) in lines.iter().enumerate() {
            let width = line.chars().count() as u16;
            let x = (self.terminal_width / 2).saturating_sub(width / 2);
            queue!(self.stdout, MoveTo(x, start_y + i as u16), Print(line))?;
        }

        if self.use_colors {
            queue!(self.stdout, ResetColor)?;
        }
        self.queue_status(status)?;
        self.stdout.flush()
    }

    fn queue_status(&mut self, status: &str) -> std::io::Result<()> {
        if status.is_empty() {
            return Ok(());
        }
        let status_y = self.terminal_height.saturating_sub(1);
        queue!(self.stdout, MoveTo(0, status_y))?;

        if self.use_colors {
            queue!(self.stdout, SetForegroundColor(Color::White), SetBackgroundColor(Color::DarkGrey))?;
        }

        // Truncate status to fit terminal width
        let truncated: String = status.chars().take(self.terminal_width as usize).collect();
        queue!(self.stdout, Print(truncated))?;

        if self.use_colors {
            queue!(self.stdout, ResetColor)?;
        }
        Ok(())
    }

    /// Check if renderer is in transparent mode
    pub fn is_transparent(&self) -> bool {
        self.transparent_mode
    }

    /// Check if renderer uses colors
    pub fn uses_colors(&self) -> bool {
        self.use_colors
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Ensure terminal is restored on drop
        let _ = self.cleanup();
    }
}

/// Status line for the current view
pub fn format_status(
    index: usize,
    len: usize,
    state: CaptureState,
    progress: CaptureProgress,
    exporting: bool,
) -> String {
    let capture = match state {
        CaptureState::Idle => "no file".to_string(),
        CaptureState::Loaded => "ready (g to generate)".to_string(),
        CaptureState::Capturing => format!("capturing {}%", progress.percent),
        CaptureState::Complete => format!("captured {} frames", progress.total),
        CaptureState::Cancelled => "capture cancelled".to_string(),
        CaptureState::Failed => "capture failed".to_string(),
    };
    let export = if exporting { " | exporting.." } else { "" };
    format!(
        "Frame {:04}/{:04} | {}{} | h: help",
        index,
        len.saturating_sub(1),
        capture,
        export
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_properties() {
        let renderer = Renderer::new(true, false, (80, 24));
        assert!(renderer.is_transparent());
        assert!(!renderer.uses_colors());

        let renderer = Renderer::new(false, true, (80, 24));
        assert!(!renderer.is_transparent());
        assert!(renderer.uses_colors());
    }

    #[test]
    fn test_frame_area_reserves_status_line() {
        let renderer = Renderer::new(false, true, (80, 24));
        assert_eq!(renderer.frame_area(), (80, 23));

        let renderer = Renderer::new(false, true, (80, 1));
        assert_eq!(renderer.frame_area(), (80, 1));
    }

    #[test]
    fn test_status_line() {
        let status = format_status(74, 145, CaptureState::Capturing, CaptureProgress::new(25, 50), false);
        assert_eq!(status, "Frame 0074/0144 | capturing 50% | h: help");

        let status = format_status(1, 50, CaptureState::Complete, CaptureProgress::new(50, 50), true);
        assert!(status.contains("captured 50 frames"));
        assert!(status.contains("exporting"));
    }
}
