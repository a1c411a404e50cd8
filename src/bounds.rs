//! Pixel rectangle of the hidden content.
//!
//! The sizing reproduces a line-aware heuristic rather than real multi-line
//! layout: the measured single-line height is multiplied by the line count and
//! the measured width divided by it.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Padding {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Padding {
    pub const fn uniform(px: i32) -> Self {
        Self {
            left: px,
            top: px,
            right: px,
            bottom: px,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HorizontalAlign {
    Left,
    Right,
    #[default]
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerticalAlign {
    Top,
    Bottom,
    #[default]
    Center,
}

/// Rectangle in surface pixels; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ContentBounds {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub const fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Intersection with a `width`x`height` raster, as `(x, y, w, h)`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (width, height) = (to_i32(width), to_i32(height));
        let left = self.left.clamp(0, width);
        let top = self.top.clamp(0, height);
        let right = self.right.clamp(0, width);
        let bottom = self.bottom.clamp(0, height);
        if right <= left || bottom <= top {
            return None;
        }
        Some((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Measured pixel size of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextExtent {
    pub width: i32,
    pub height: i32,
}

/// Host capability that measures text in pixels.
pub trait MeasureText: Send {
    fn measure(&self, text: &str) -> TextExtent;
}

/// A fixed extent, for hosts that measure text themselves.
impl MeasureText for TextExtent {
    fn measure(&self, _text: &str) -> TextExtent {
        *self
    }
}

/// Measures the ink bounds of a single-line run with `ab_glyph`.
#[derive(Debug, Clone)]
pub struct GlyphMeasure {
    font: FontArc,
    scale: PxScale,
}

impl GlyphMeasure {
    pub fn new(font: FontArc, px_size: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(px_size),
        }
    }
}

impl MeasureText for GlyphMeasure {
    /// Width is the right edge of the ink box measured from the pen origin, height
    /// is the descent below the baseline plus the full ink height.
    fn measure(&self, text: &str) -> TextExtent {
        let scaled = self.font.as_scaled(self.scale);
        let mut caret = 0.0f32;
        let mut previous = None;
        let mut ink: Option<(f32, f32, f32)> = None;
        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, glyph_id);
            }
            let glyph = glyph_id.with_scale_and_position(self.scale, point(caret, 0.0));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let b = outlined.px_bounds();
                ink = Some(match ink {
                    None => (b.max.x, b.min.y, b.max.y),
                    Some((right, top, bottom)) => {
                        (right.max(b.max.x), top.min(b.min.y), bottom.max(b.max.y))
                    }
                });
            }
            caret += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
        match ink {
            None => TextExtent::default(),
            Some((right, top, bottom)) => TextExtent {
                width: right.ceil().max(0.0) as i32,
                height: (bottom + (bottom - top)).ceil().max(0.0) as i32,
            },
        }
    }
}

/// Text, line metrics and placement of the hidden content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentLayout {
    pub text: String,
    /// Lines reported by the host's text layout; zero is treated as one.
    pub line_count: u32,
    pub padding: Padding,
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
}

/// Resolve the content rectangle inside a `surface_w`x`surface_h` surface.
///
/// Dimensions larger than the surface are clamped to the padded interior and
/// left unscaled; otherwise they are multiplied by `scale`.
pub fn resolve(
    surface_w: u32,
    surface_h: u32,
    layout: &ContentLayout,
    measure: &dyn MeasureText,
    scale: f32,
) -> ContentBounds {
    let view_w = to_i32(surface_w);
    let view_h = to_i32(surface_h);
    let pad = layout.padding;

    let extent = measure.measure(&layout.text);
    let lines = to_i32(layout.line_count.max(1));
    let mut height = extent.height.saturating_mul(lines);
    let mut width = extent.width / lines;

    // float-to-int casts saturate
    if height > view_h {
        height = view_h.saturating_sub(pad.bottom.saturating_add(pad.top));
    } else {
        height = (height as f32 * scale) as i32;
    }
    if width > view_w {
        width = view_w.saturating_sub(pad.left.saturating_add(pad.right));
    } else {
        width = (width as f32 * scale) as i32;
    }

    let left = match layout.horizontal {
        HorizontalAlign::Left => pad.left,
        HorizontalAlign::Right => view_w.saturating_sub(pad.right).saturating_sub(width),
        HorizontalAlign::Center => (view_w / 2).saturating_sub(width / 2),
    };
    let top = match layout.vertical {
        VerticalAlign::Top => pad.top,
        VerticalAlign::Bottom => view_h.saturating_sub(pad.bottom).saturating_sub(height),
        VerticalAlign::Center => (view_h / 2).saturating_sub(height / 2),
    };
    ContentBounds::new(
        left,
        top,
        left.saturating_add(width),
        top.saturating_add(height),
    )
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
