use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

use super::typeface::Typeface;

pub const CAPTION_PX: f32 = 30.0;
pub const LINE_SPACING: i32 = 35;
pub const CAPTION_INSET: i32 = 50;
pub const SIDE_MARGIN: u32 = 40;
const STROKE_WIDTH: f32 = 3.0;

const WATERMARK: &str = "ProblemBaba.com";
const WATERMARK_PX: f32 = 12.0;
const WATERMARK_INSET: i32 = 10;

const FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const STROKE: Rgba<u8> = Rgba([0, 0, 0, 255]);
// rgba(255, 152, 0, 0.7)
const WATERMARK_COLOR: Rgba<u8> = Rgba([255, 152, 0, 178]);
const BRAND_ORANGE: Rgba<u8> = Rgba([255, 152, 0, 255]);

#[derive(Clone, Copy)]
enum Align {
    Center,
    Right,
}

/// Draws captioned memes on a fixed-size canvas.
#[derive(Clone)]
pub struct MemeCompositor {
    width: u32,
    height: u32,
    typeface: Arc<dyn Typeface>,
}

impl MemeCompositor {
    pub fn new(width: u32, height: u32, typeface: Arc<dyn Typeface>) -> Self {
        Self { width, height, typeface }
    }

    /// Widest a caption line may be.
    pub fn line_budget(&self) -> f32 {
        self.width.saturating_sub(SIDE_MARGIN) as f32
    }

    /// Template used when the caller supplies no image.
    pub fn default_background(&self) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BRAND_ORANGE);
        let mid_y = self.height as i32 / 2;
        self.draw_text(&mut canvas, "ProblemBaba", self.width as f32 / 2.0, mid_y, 24.0, FILL, Align::Center);
        canvas
    }

    /// Renders the meme. Empty captions are skipped; the watermark is always drawn last.
    pub fn render(&self, base: &DynamicImage, top_text: &str, bottom_text: &str) -> RgbaImage {
        let mut canvas = imageops::resize(&base.to_rgba8(), self.width, self.height, FilterType::Triangle);
        let center_x = self.width as f32 / 2.0;

        if !top_text.trim().is_empty() {
            let lines = self.wrap(top_text);
            for (i, line) in lines.iter().enumerate() {
                let y = CAPTION_INSET + i as i32 * LINE_SPACING;
                self.draw_caption_line(&mut canvas, line, center_x, y);
            }
        }

        if !bottom_text.trim().is_empty() {
            let lines = self.wrap(bottom_text);
            let last = lines.len() as i32 - 1;
            for (i, line) in lines.iter().enumerate() {
                let y = self.height as i32 - CAPTION_INSET - (last - i as i32) * LINE_SPACING;
                self.draw_caption_line(&mut canvas, line, center_x, y);
            }
        }

        self.draw_text(
            &mut canvas,
            WATERMARK,
            (self.width as i32 - WATERMARK_INSET) as f32,
            self.height as i32 - WATERMARK_INSET,
            WATERMARK_PX,
            WATERMARK_COLOR,
            Align::Right,
        );
        canvas
    }

    /// Greedy word wrap at the caption size.
    pub fn wrap(&self, text: &str) -> Vec<String> {
        let typeface = self.typeface.as_ref();
        wrap_text(text, self.line_budget(), |s| typeface.measure(s, CAPTION_PX))
    }

    fn draw_caption_line(&self, canvas: &mut RgbaImage, line: &str, center_x: f32, y: i32) {
        let width = self.typeface.measure(line, CAPTION_PX);
        let left = (center_x - width / 2.0).round() as i32;

        // Outline: the fill shape smeared over a disc of the stroke radius.
        let radius = (STROKE_WIDTH / 2.0).ceil() as i32;
        let limit = (STROKE_WIDTH / 2.0) * (STROKE_WIDTH / 2.0);
        let mut stroke_offsets = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if (dx * dx + dy * dy) as f32 <= limit {
                    stroke_offsets.push((dx, dy));
                }
            }
        }
        self.typeface.rasterize(line, CAPTION_PX, &mut |x, py, coverage| {
            for (dx, dy) in &stroke_offsets {
                blend(canvas, left + x + dx, y + py + dy, STROKE, coverage);
            }
        });
        self.typeface.rasterize(line, CAPTION_PX, &mut |x, py, coverage| {
            blend(canvas, left + x, y + py, FILL, coverage);
        });
    }

    fn draw_text(&self, canvas: &mut RgbaImage, text: &str, x: f32, y: i32, px: f32, color: Rgba<u8>, align: Align) {
        let width = self.typeface.measure(text, px);
        let left = match align {
            Align::Center => (x - width / 2.0).round() as i32,
            Align::Right => (x - width).round() as i32,
        };
        self.typeface.rasterize(text, px, &mut |gx, gy, coverage| {
            blend(canvas, left + gx, y + gy, color, coverage);
        });
    }
}

/// Source-over blend of `color` scaled by `coverage`; out-of-bounds is clipped.
fn blend(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0) * color[3] as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    let px = canvas.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let dst = px[c] as f32;
        px[c] = (dst + (color[c] as f32 - dst) * alpha).round() as u8;
    }
    px[3] = px[3].max((alpha * 255.0).round() as u8);
}

/// Greedy line breaking: grow the current line until the next word would exceed
/// `max_width`, then start a new line with that word. A single word wider than
/// the budget is broken at character boundaries.
pub fn wrap_text<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = place_word(word, max_width, &measure, &mut lines);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure(&candidate) > max_width {
            lines.push(std::mem::take(&mut current));
            current = place_word(word, max_width, &measure, &mut lines);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// Starts a line with `word`, flushing full-width chunks when it is too wide on its own.
fn place_word<F>(word: &str, max_width: f32, measure: &F, lines: &mut Vec<String>) -> String
where
    F: Fn(&str) -> f32,
{
    if measure(word) <= max_width {
        return word.to_string();
    }
    let mut chunk = String::new();
    for ch in word.chars() {
        chunk.push(ch);
        if measure(&chunk) > max_width && chunk.chars().count() > 1 {
            chunk.pop();
            lines.push(std::mem::take(&mut chunk));
            chunk.push(ch);
        }
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meme::typeface::BlockTypeface;

    fn compositor() -> MemeCompositor {
        MemeCompositor::new(500, 500, Arc::new(BlockTypeface))
    }

    fn plain_base(color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba(color)))
    }

    #[test]
    fn wrapped_lines_fit_the_budget() {
        let c = compositor();
        let caption = "when you finally fix the bug at three in the morning and realize the tests were never running at all";
        let lines = c.wrap(caption);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(BlockTypeface.measure(line, CAPTION_PX) <= c.line_budget(), "line too wide: {line}");
        }
        assert_eq!(lines.join(" "), caption);
    }

    #[test]
    fn wrapping_is_idempotent() {
        let c = compositor();
        let lines = c.wrap("one two three four five six seven eight nine ten eleven twelve thirteen fourteen");
        assert_eq!(c.wrap(&lines.join(" ")), lines);
    }

    #[test]
    fn overlong_word_is_split_to_fit() {
        let c = compositor();
        let word = "a".repeat(60);
        let lines = c.wrap(&word);
        assert!(lines.len() >= 2);
        for line in &lines {
            assert!(BlockTypeface.measure(line, CAPTION_PX) <= c.line_budget());
        }
        assert_eq!(lines.concat(), word);
        assert_eq!(c.wrap(&lines.join(" ")), lines);
    }

    #[test]
    fn wrap_of_blank_text_is_empty() {
        assert!(compositor().wrap("   ").is_empty());
    }

    #[test]
    fn render_is_deterministic_and_sized_to_canvas() {
        let c = compositor();
        let base = plain_base([10, 120, 200, 255]);
        let a = c.render(&base, "top caption", "bottom caption that is rather long and wraps");
        let b = c.render(&base, "top caption", "bottom caption that is rather long and wraps");
        assert_eq!(a.dimensions(), (500, 500));
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn captions_are_filled_white_and_outlined_black() {
        let c = compositor();
        let out = c.render(&plain_base([10, 120, 200, 255]), "WWWW", "");
        // Middle of the first block glyph of the centred top line.
        let width = BlockTypeface.measure("WWWW", CAPTION_PX);
        let left = (250.0 - width / 2.0).round() as u32;
        assert_eq!(*out.get_pixel(left + 5, CAPTION_INSET as u32), FILL);
        // Just outside the glyph's top edge lies stroke.
        let half_h = (CAPTION_PX * 0.7 / 2.0).round() as u32;
        assert_eq!(*out.get_pixel(left + 5, CAPTION_INSET as u32 - half_h - 1), STROKE);
    }

    #[test]
    fn bottom_block_grows_upward_from_the_edge() {
        let c = compositor();
        let base = plain_base([10, 120, 200, 255]);
        let single = c.render(&base, "", "short");
        let bottom_y = 500 - CAPTION_INSET as u32;
        let left = (250.0 - BlockTypeface.measure("short", CAPTION_PX) / 2.0).round() as u32;
        assert_eq!(*single.get_pixel(left + 5, bottom_y), FILL);

        let text = "many words here to force the bottom caption onto at least two separate lines";
        let lines = c.wrap(text);
        assert!(lines.len() >= 2);
        let out = c.render(&base, "", text);
        let last = lines.last().unwrap();
        let left = (250.0 - BlockTypeface.measure(last, CAPTION_PX) / 2.0).round() as u32;
        assert_eq!(*out.get_pixel(left + 5, bottom_y), FILL);
    }

    #[test]
    fn watermark_is_translucent_orange_in_bottom_right() {
        let c = compositor();
        let out = c.render(&plain_base([0, 0, 0, 255]), "", "");
        let right = 500 - WATERMARK_INSET as u32;
        let x = right - 3;
        let y = 500 - WATERMARK_INSET as u32;
        let px = out.get_pixel(x, y);
        // 0.7 alpha over black.
        assert!(px[0] > 150 && px[0] < 200, "{px:?}");
        assert!(px[1] > 90 && px[1] < 120, "{px:?}");
        assert_eq!(px[2], 0);
        assert_eq!(out.get_pixel(20, 20).0[..3], [0, 0, 0]);
    }

    #[test]
    fn default_background_is_brand_orange() {
        let bg = compositor().default_background();
        assert_eq!(bg.dimensions(), (500, 500));
        assert_eq!(*bg.get_pixel(0, 0), BRAND_ORANGE);
    }
}
