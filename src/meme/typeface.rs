//! Text measurement and rasterization for meme captions.

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use std::path::Path;

use crate::errors::RenderError;

/// A font the compositor can measure and draw with.
///
/// `rasterize` reports coverage in `0.0..=1.0` for pixels relative to the
/// left edge of the text and its vertical middle (canvas "middle" baseline).
pub trait Typeface: Send + Sync + 'static {
    fn measure(&self, text: &str, px: f32) -> f32;

    fn rasterize(&self, text: &str, px: f32, plot: &mut dyn FnMut(i32, i32, f32));
}

/// Outline font loaded from a TrueType/OpenType file.
pub struct GlyphTypeface {
    font: FontVec,
}

impl GlyphTypeface {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RenderError> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::Font(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(bytes)
    }
}

impl Typeface for GlyphTypeface {
    fn measure(&self, text: &str, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(p) = prev {
                width += scaled.kern(p, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    fn rasterize(&self, text: &str, px: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        let scaled = self.font.as_scaled(PxScale::from(px));
        // Baseline sits below the middle by half the ascent+descent span.
        let baseline = (scaled.ascent() + scaled.descent()) / 2.0;
        let mut caret = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(p) = prev {
                caret += scaled.kern(p, id);
            }
            let glyph = id.with_scale_and_position(px, point(caret, baseline));
            caret += scaled.h_advance(id);
            prev = Some(id);

            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                let (ox, oy) = (bounds.min.x.floor() as i32, bounds.min.y.floor() as i32);
                outlined.draw(|x, y, coverage| plot(ox + x as i32, oy + y as i32, coverage));
            }
        }
    }
}

/// Fixed-advance block glyphs. Used when no font file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTypeface;

impl BlockTypeface {
    const ADVANCE: f32 = 0.6;
    const INK_WIDTH: f32 = 0.5;
    const INK_HEIGHT: f32 = 0.7;
}

impl Typeface for BlockTypeface {
    fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars().count() as f32 * px * Self::ADVANCE
    }

    fn rasterize(&self, text: &str, px: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        let advance = px * Self::ADVANCE;
        let ink_w = (px * Self::INK_WIDTH).round() as i32;
        let half_h = (px * Self::INK_HEIGHT / 2.0).round() as i32;
        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = (i as f32 * advance).round() as i32;
            for y in -half_h..half_h {
                for x in left..left + ink_w {
                    plot(x, y, 1.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_measure_is_additive() {
        let t = BlockTypeface;
        let px = 30.0;
        assert_eq!(t.measure("", px), 0.0);
        assert_eq!(t.measure("ab cd", px), t.measure("ab", px) + t.measure(" ", px) + t.measure("cd", px));
    }

    #[test]
    fn block_rasterize_stays_within_measured_width() {
        let t = BlockTypeface;
        let mut max_x = i32::MIN;
        let mut painted = 0;
        t.rasterize("hi there", 20.0, &mut |x, _, _| {
            max_x = max_x.max(x);
            painted += 1;
        });
        assert!(painted > 0);
        assert!((max_x as f32) < t.measure("hi there", 20.0));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(matches!(
            GlyphTypeface::from_bytes(vec![0, 1, 2, 3]),
            Err(RenderError::Font(_))
        ));
    }
}
