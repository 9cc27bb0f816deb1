// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Drawing detections onto images.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::detection::Detection;
use crate::labels::Label;

/// Box outline thickness in pixels.
const BOX_THICKNESS: i32 = 3;
/// Padding between label text and its background edge.
const TEXT_PADDING: i32 = 6;
/// Pixel size for scalable fonts.
const SCALABLE_FONT_PX: f32 = 40.0;
/// Pixel size for the basic font.
const BASIC_FONT_PX: f32 = 12.0;
/// Width per character when there is no font to measure with.
const FALLBACK_CHAR_WIDTH: u32 = 6;
/// Line height when there is no font to measure with.
const FALLBACK_TEXT_HEIGHT: u32 = 12;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Get the box color for a class name, white if it is not a known label.
#[must_use]
pub fn class_color(class_name: &str) -> Rgb<u8> {
    Label::from_name(class_name).map_or(WHITE, |label| Rgb(label.color()))
}

/// Where to look for label fonts.
#[derive(Debug, Clone)]
pub struct FontConfig {
    /// Preferred scalable font.
    pub primary: PathBuf,
    /// Scalable font tried when the primary one is unusable.
    pub fallback: PathBuf,
    /// Locations searched for a basic font, in order.
    pub basic_candidates: Vec<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        let mut basic_candidates: Vec<PathBuf> = dirs::config_dir()
            .map(|dir| dir.join("Dentalogic").join("Arial.ttf"))
            .into_iter()
            .collect();
        basic_candidates.extend(
            [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
                "/usr/share/fonts/TTF/DejaVuSans.ttf",
                "/usr/share/fonts/dejavu/DejaVuSans.ttf",
                "/Library/Fonts/Arial.ttf",
                "C:\\Windows\\Fonts\\arial.ttf",
            ]
            .map(PathBuf::from),
        );

        Self {
            primary: PathBuf::from("/System/Library/Fonts/Helvetica.ttc"),
            fallback: PathBuf::from("/System/Library/Fonts/Supplemental/Arial.ttf"),
            basic_candidates,
        }
    }
}

/// The font used for detection labels.
pub enum LabelFont {
    /// A scalable font, measured exactly and drawn large.
    Scalable(FontVec),
    /// A font found in the basic locations, drawn small.
    Basic(FontVec),
    /// No usable font; labels get a background but no text.
    Unavailable,
}

impl LabelFont {
    /// Resolve the font chain: primary, fallback, then the basic candidates.
    ///
    /// Never fails; a missing or corrupt font just moves on to the next option.
    #[must_use]
    pub fn load(config: &FontConfig) -> Self {
        for path in [&config.primary, &config.fallback] {
            if let Some(font) = read_font(path) {
                info!(path = %path.display(), "Using scalable label font");
                return Self::Scalable(font);
            }
        }

        for path in &config.basic_candidates {
            if let Some(font) = read_font(path) {
                info!(path = %path.display(), "Using basic label font");
                return Self::Basic(font);
            }
        }

        warn!("No label font found, annotations will have no text");
        Self::Unavailable
    }

    /// Short name of the resolved tier.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalable(_) => "scalable",
            Self::Basic(_) => "basic",
            Self::Unavailable => "none",
        }
    }

    /// Size of `text` as drawn, (width, height).
    #[must_use]
    pub fn measure(&self, text: &str) -> (u32, u32) {
        match self {
            Self::Scalable(font) => text_size(PxScale::from(SCALABLE_FONT_PX), font, text),
            Self::Basic(font) => text_size(PxScale::from(BASIC_FONT_PX), font, text),
            Self::Unavailable => {
                let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
                (chars.saturating_mul(FALLBACK_CHAR_WIDTH), FALLBACK_TEXT_HEIGHT)
            }
        }
    }

    fn draw(&self, img: &mut RgbImage, x: i32, y: i32, text: &str) {
        match self {
            Self::Scalable(font) => {
                draw_text_mut(img, TEXT_COLOR, x, y, PxScale::from(SCALABLE_FONT_PX), font, text);
            }
            Self::Basic(font) => {
                draw_text_mut(img, TEXT_COLOR, x, y, PxScale::from(BASIC_FONT_PX), font, text);
            }
            Self::Unavailable => {}
        }
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LabelFont").field(&self.kind()).finish()
    }
}

fn read_font(path: &Path) -> Option<FontVec> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), "Font not readable: {e}");
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!(path = %path.display(), "Font could not be parsed: {e}");
            None
        }
    }
}

/// Annotate an image with detection boxes and labels.
///
/// Draws on a copy; `image` is left untouched. Each label reads
/// `"<class> <confidence>%"` in black on a background of the box color,
/// placed directly above the box.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn annotate_image(image: &DynamicImage, detections: &[Detection], font: &LabelFont) -> DynamicImage {
    let mut img = image.to_rgb8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return DynamicImage::ImageRgb8(img);
    }

    for det in detections {
        let color = class_color(det.class.as_str());

        // Get box coordinates and clamp to image bounds
        let x1 = (det.bbox[0].round() as i32).clamp(0, width as i32 - 1);
        let y1 = (det.bbox[1].round() as i32).clamp(0, height as i32 - 1);
        let x2 = (det.bbox[2].round() as i32).clamp(0, width as i32 - 1);
        let y2 = (det.bbox[3].round() as i32).clamp(0, height as i32 - 1);

        // A box with no width or height is still drawn, as a line
        if x2 <= x1 || y2 <= y1 {
            draw_line_segment_mut(&mut img, (x1 as f32, y1 as f32), (x2 as f32, y2 as f32), color);
        }

        for t in 0..BOX_THICKNESS {
            let tx1 = (x1 + t).min(x2);
            let ty1 = (y1 + t).min(y2);
            let tx2 = (x2 - t).max(tx1);
            let ty2 = (y2 - t).max(ty1);
            if tx2 > tx1 && ty2 > ty1 {
                let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
                draw_hollow_rect_mut(&mut img, rect, color);
            }
        }

        let label = format!("{} {:.1}%", det.class, det.confidence);
        let (text_w, text_h) = font.measure(&label);
        let text_h = text_h as i32;

        let background = Rect::at(x1, y1 - text_h - 2 * TEXT_PADDING)
            .of_size(text_w + 2 * TEXT_PADDING as u32, (text_h + 2 * TEXT_PADDING) as u32);
        draw_filled_rect_mut(&mut img, background, color);

        font.draw(&mut img, x1 + TEXT_PADDING, y1 - text_h - TEXT_PADDING, &label);
    }

    DynamicImage::ImageRgb8(img)
}
