//! Drawing the diagnosis onto a display copy of the X-ray.
//!
//! The display copy gets a solid border in the class color, the two
//! diagnosis lines in white near the top-left corner, and is then scaled to
//! fit the caller's viewport. The source image is never modified.

use std::path::Path;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use crate::config::{ClassSet, RenderConfig, ScaleRule};
use crate::diagnosis::Diagnosis;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const UNKNOWN_CLASS_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

const SYSTEM_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct ResultRenderer {
    classes: ClassSet,
    config: RenderConfig,
    font: Option<FontVec>,
}

impl ResultRenderer {
    /// Creates a renderer, loading the configured font or the first system
    /// font found. Without any font the text overlay is skipped.
    pub fn new(classes: ClassSet, config: RenderConfig) -> Self {
        let font = load_font(config.font_path.as_deref());
        if font.is_none() {
            log::warn!("No usable font found, diagnosis text will not be drawn on the image");
        }
        ResultRenderer {
            classes,
            config,
            font,
        }
    }

    /// A renderer that only draws the border and scales.
    pub fn without_font(classes: ClassSet, config: RenderConfig) -> Self {
        ResultRenderer {
            classes,
            config,
            font: None,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn border_color(&self, label: &str) -> Rgb<u8> {
        self.classes.color_of(label).unwrap_or_else(|| {
            log::warn!("No palette entry for {label:?}");
            UNKNOWN_CLASS_COLOR
        })
    }

    pub fn render(&self, original: &RgbImage, diagnosis: &Diagnosis, rule: ScaleRule) -> RgbImage {
        let color = self.border_color(&diagnosis.label);
        let mut canvas = add_border(original, self.config.border, color);
        if let Some(font) = &self.font {
            let lines = [diagnosis.diagnosis_line(), diagnosis.confidence_line()];
            for (text, baseline) in lines.iter().zip(self.config.baselines) {
                self.draw_line(&mut canvas, font, text, baseline);
            }
        }
        fit(&canvas, rule)
    }

    fn draw_line(&self, canvas: &mut RgbImage, font: &FontVec, text: &str, baseline: i32) {
        let scale = PxScale::from(self.config.font_scale);
        // draw_text_mut positions the top of the line box
        let top = baseline - font.as_scaled(scale).ascent().round() as i32;
        let stroke = self.config.stroke.max(1) as i32;
        for dy in 0..stroke {
            for dx in 0..stroke {
                draw_text_mut(
                    canvas,
                    TEXT_COLOR,
                    self.config.text_x + dx,
                    top + dy,
                    scale,
                    font,
                    text,
                );
            }
        }
    }
}

/// Copy of `image` framed by a solid border `width` pixels wide.
pub fn add_border(image: &RgbImage, width: u32, color: Rgb<u8>) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(
        image.width() + 2 * width,
        image.height() + 2 * width,
        color,
    );
    imageops::replace(&mut canvas, image, i64::from(width), i64::from(width));
    canvas
}

/// Uniform bilinear resize to the size `rule` picks.
pub fn fit(image: &RgbImage, rule: ScaleRule) -> RgbImage {
    let (width, height) = rule.target_size(image.width(), image.height());
    imageops::resize(image, width, height, FilterType::Triangle)
}

fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        match read_font(path) {
            Some(font) => return Some(font),
            None => log::warn!("Cannot load font {}, trying system fonts", path.display()),
        }
    }
    SYSTEM_FONTS.iter().map(Path::new).find_map(read_font)
}

fn read_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    let font = FontVec::try_from_vec(data).ok()?;
    log::debug!("Using font {}", path.display());
    Some(font)
}
