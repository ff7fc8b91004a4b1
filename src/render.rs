//! Box overlays for inspecting detections.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ClassVocabulary, NormalizedDetection};

const PALETTE: [Rgb<u8>; 8] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
    Rgb([255, 225, 25]),
];

const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

/// Detections at or above `threshold`, in their original order.
pub fn visible_detections(
    detections: &[NormalizedDetection],
    threshold: f32,
) -> Vec<&NormalizedDetection> {
    detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}

pub fn label_text(vocabulary: &ClassVocabulary, detection: &NormalizedDetection) -> String {
    match vocabulary.name(detection.class_id) {
        Some(name) => format!("{} {:.1}%", name, detection.confidence),
        None => format!("#{} {:.1}%", detection.class_id, detection.confidence),
    }
}

/// Pixel rectangle for a normalized box, clamped to the image.
fn pixel_rect(detection: &NormalizedDetection, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    let to_px = |v: f32, extent: u32| (v * extent as f32).round().clamp(0.0, (extent - 1) as f32) as i32;
    let x1 = to_px(detection.x1, width);
    let y1 = to_px(detection.y1, height);
    let x2 = to_px(detection.x2, width);
    let y2 = to_px(detection.y2, height);
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));
    Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

pub struct Renderer {
    /// Labels are drawn only when a font is available.
    pub font: Option<FontVec>,
    pub font_scale: f32,
    pub thickness: u32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            thickness: 2,
        }
    }
}

impl Renderer {
    pub fn with_font_path(font_path: &Path) -> Result<Self> {
        let data = std::fs::read(font_path)?;
        let font = FontVec::try_from_vec(data).map_err(|_| {
            Error::Config(format!("failed to parse font file: {}", font_path.display()))
        })?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Tries a few well-known font locations, falling back to boxes only.
    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONTS {
            if let Ok(data) = std::fs::read(path)
                && let Ok(font) = FontVec::try_from_vec(data)
            {
                info!("Loaded system font: {}", path);
                return Self {
                    font: Some(font),
                    ..Self::default()
                };
            }
        }
        debug!("No system font found, labels will be skipped");
        Self::default()
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    /// Draws every detection with `confidence >= threshold` onto a copy of `image`.
    pub fn render(
        &self,
        image: &DynamicImage,
        detections: &[NormalizedDetection],
        vocabulary: &ClassVocabulary,
        threshold: f32,
    ) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();
        for detection in visible_detections(detections, threshold) {
            let Some(rect) = pixel_rect(detection, width, height) else {
                continue;
            };
            let color = class_color(detection.class_id);
            self.draw_box(&mut canvas, rect, color);
            if let Some(font) = &self.font {
                self.draw_label(&mut canvas, font, rect, color, &label_text(vocabulary, detection));
            }
        }
        canvas
    }

    pub fn render_path(
        &self,
        path: &Path,
        detections: &[NormalizedDetection],
        vocabulary: &ClassVocabulary,
        threshold: f32,
    ) -> Result<RgbImage> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(self.render(&image, detections, vocabulary, threshold))
    }

    fn draw_box(&self, canvas: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
        for inset in 0..self.thickness {
            let inset_i = inset as i32;
            let w = rect.width().saturating_sub(2 * inset);
            let h = rect.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let r = Rect::at(rect.left() + inset_i, rect.top() + inset_i).of_size(w, h);
            draw_hollow_rect_mut(canvas, r, color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, font: &FontVec, rect: Rect, color: Rgb<u8>, text: &str) {
        let scale = PxScale::from(self.font_scale);
        let (text_w, text_h) = text_size(scale, font, text);
        if text_w == 0 || text_h == 0 {
            return;
        }
        let pad = 2;
        let label_h = text_h as i32 + 2 * pad;
        // Above the box when there is room, otherwise inside its top edge.
        let y = if rect.top() >= label_h {
            rect.top() - label_h
        } else {
            rect.top()
        };
        let background = Rect::at(rect.left(), y).of_size(text_w + 2 * pad as u32, label_h as u32);
        draw_filled_rect_mut(canvas, background, color);
        draw_text_mut(canvas, TEXT_COLOR, rect.left() + pad, y + pad, scale, font, text);
    }
}
