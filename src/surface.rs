//! Drawing surface abstraction.
//!
//! The render loop only needs rectangle and text fills plus the current
//! dimensions; everything else about the display (cells vs. pixels, double
//! buffering, presentation) belongs to the implementation. The terminal
//! backend lives in [`crate::terminal`]; tests use a recording surface.

/// 24-bit color used by all drawing calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
pub const WHITE: Rgb = Rgb {
    r: 255,
    g: 255,
    b: 255,
};

/// Rectangle/text drawing primitives consumed by the render loop.
///
/// Coordinates are in the surface's own drawing units with the origin at the
/// top-left and y growing downward. Negative-height rectangles grow upward
/// from `y`, mirroring how the level meters are drawn.
pub trait Surface {
    /// Current drawing width in surface units.
    fn width(&self) -> f32;

    /// Current drawing height in surface units.
    fn height(&self) -> f32;

    /// Fill the whole surface with one color.
    fn clear(&mut self, color: Rgb);

    /// Fill an axis-aligned rectangle. `h` may be negative.
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb);

    /// Draw a text string with its left edge at `x`, baseline at `y`.
    /// Labels are allowed to overflow the surface; no clipping is applied.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgb);

    /// Select the label font. Surfaces without font control ignore this.
    fn set_font(&mut self, _font: &str) {}

    /// Viewport predicate: true when the viewport is at least `threshold_px`
    /// device pixels wide. Distinct from [`Surface::width`], which is in
    /// drawing units; re-evaluated every frame so resizes take effect.
    fn is_wide_viewport(&self, threshold_px: f32) -> bool;
}

/// Normalize a possibly negative-height rectangle to a top-left anchored one.
pub(crate) fn normalize_rect(x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    if h < 0.0 {
        (x, y + h, w, -h)
    } else {
        (x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_flips_negative_height() {
        assert_eq!(normalize_rect(1.0, 10.0, 2.0, -4.0), (1.0, 6.0, 2.0, 4.0));
        assert_eq!(normalize_rect(1.0, 10.0, 2.0, 4.0), (1.0, 10.0, 2.0, 4.0));
    }
}
