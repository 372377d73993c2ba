use crate::cli::ColorPalette;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::debug;

/// A frame reduced to terminal cells
#[derive(Debug, Clone)]
pub struct AsciiFrame {
    /// Row-major glyphs
    pub characters: Vec<char>,
    pub fg_colors: Vec<(u8, u8, u8)>,
    /// `None` in transparent mode
    pub bg_colors: Option<Vec<(u8, u8, u8)>>,
    pub width: u16,
    pub height: u16,
}

impl AsciiFrame {
    fn with_capacity(width: u16, height: u16, transparent: bool) -> Self {
        let cells = width as usize * height as usize;
        Self {
            characters: Vec::with_capacity(cells),
            fg_colors: Vec::with_capacity(cells),
            bg_colors: (!transparent).then(|| Vec::with_capacity(cells)),
            width,
            height,
        }
    }

    fn push(&mut self, glyph: char, fg: (u8, u8, u8), bg: (u8, u8, u8)) {
        self.characters.push(glyph);
        self.fg_colors.push(fg);
        if let Some(bg_colors) = self.bg_colors.as_mut() {
            bg_colors.push(bg);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub palette: ColorPalette,
    pub transparent: bool,
    /// Cell width divided by cell height
    pub cell_aspect: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            palette: ColorPalette::Color,
            transparent: false,
            cell_aspect: 0.5,
        }
    }
}

/// Fits frame images into the terminal and shades them with a glyph ramp
pub struct FrameConverter {
    config: ConversionConfig,
}

impl FrameConverter {
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// Convert `image` into at most `columns` x `rows` cells
    pub fn convert_image(&self, image: &RgbImage, columns: u16, rows: u16) -> AsciiFrame {
        let (width, height) = fit_cells(image.width(), image.height(), columns, rows, self.config.cell_aspect);
        debug!(
            "Shading {}x{} frame into {}x{} cells",
            image.width(),
            image.height(),
            width,
            height
        );

        let scaled = imageops::resize(image, width as u32, height as u32, FilterType::Nearest);
        let ramp = self.config.palette.ascii_chars();
        let mut frame = AsciiFrame::with_capacity(width, height, self.config.transparent);

        for &Rgb([r, g, b]) in scaled.pixels() {
            let luma = luma(r, g, b);
            let glyph = ramp[ramp_index(luma, ramp.len())];
            let (fg, bg) = match self.config.palette {
                ColorPalette::Ascii => ((255, 255, 255), (0, 0, 0)),
                ColorPalette::Grayscale => ((luma, luma, luma), (0, 0, 0)),
                ColorPalette::Color => ((r, g, b), (r / 4, g / 4, b / 4)),
            };
            frame.push(glyph, fg, bg);
        }

        frame
    }
}

/// Largest cell grid inside `columns` x `rows` that keeps the image's proportions
fn fit_cells(src_width: u32, src_height: u32, columns: u16, rows: u16, cell_aspect: f64) -> (u16, u16) {
    if src_width == 0 || src_height == 0 || columns == 0 || rows == 0 {
        return (1, 1);
    }
    let image_aspect = src_width as f64 / src_height as f64;
    // Cells needed per row of cells to keep the image undistorted
    let wanted_columns = rows as f64 * image_aspect / cell_aspect;

    let (width, height) = if wanted_columns > columns as f64 {
        let height = columns as f64 * cell_aspect / image_aspect;
        (columns, (height as u16).min(rows))
    } else {
        ((wanted_columns as u16).min(columns), rows)
    };
    (width.max(1), height.max(1))
}

/// BT.709 luma
fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

fn ramp_index(luma: u8, ramp_len: usize) -> usize {
    let last = ramp_len.saturating_sub(1);
    ((luma as f64 / 255.0 * last as f64).round() as usize).min(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
    }

    #[test]
    fn test_ramp_index_bounds() {
        assert_eq!(ramp_index(0, 10), 0);
        assert_eq!(ramp_index(255, 10), 9);
        assert_eq!(ramp_index(255, 1), 0);
    }

    #[test]
    fn test_black_frame_is_blank() {
        let converter = FrameConverter::new(ConversionConfig::default());
        let frame = converter.convert_image(&solid(2, 2, [0, 0, 0]), 10, 10);

        assert_eq!(frame.characters.len(), frame.width as usize * frame.height as usize);
        assert_eq!(frame.fg_colors.len(), frame.characters.len());
        assert!(frame.characters.iter().all(|&c| c == ' '));
    }

    #[test]
    fn test_white_frame_uses_densest_glyph() {
        let converter = FrameConverter::new(ConversionConfig {
            palette: ColorPalette::Ascii,
            ..Default::default()
        });
        let frame = converter.convert_image(&solid(4, 4, [255, 255, 255]), 8, 8);
        assert!(frame.characters.iter().all(|&c| c == '@'));
    }

    #[test]
    fn test_transparent_frame_has_no_background() {
        let converter = FrameConverter::new(ConversionConfig {
            transparent: true,
            ..Default::default()
        });
        let frame = converter.convert_image(&solid(3, 3, [50, 50, 50]), 10, 10);
        assert!(frame.bg_colors.is_none());
    }

    #[test]
    fn test_fit_cells_stays_inside_terminal() {
        // 16:9 video in an 80x24 terminal is limited by width
        assert_eq!(fit_cells(1920, 1080, 80, 24, 0.5), (80, 22));
        // Square image is limited by height
        assert_eq!(fit_cells(100, 100, 80, 20, 0.5), (40, 20));
        assert_eq!(fit_cells(0, 100, 80, 20, 0.5), (1, 1));
    }
}
