//! Offscreen cover raster.
//!
//! The mask holds the cover layer as RGBA8. Erasing clears pixels towards
//! fully transparent; nothing ever makes an erased pixel opaque again except
//! re-initialisation on resize.

use image::{Rgba, RgbaImage};
use lyon::math::Point;
use lyon::path::PathEvent;
use lyon::path::iterator::PathIterator;
use tracing::trace;

use crate::bounds::ContentBounds;
use crate::config::{CoverFit, TransparencyRule};
use crate::error::Error;
use crate::processing::cover::compose_cover;
use crate::stroke::StrokePath;

/// Flattening tolerance for curved stroke segments, in pixels.
const FLATTEN_TOLERANCE: f32 = 0.1;

/// Cover layer with per-pixel erase state.
#[derive(Debug, Clone)]
pub struct PixelMask {
    image: RgbaImage,
    rule: TransparencyRule,
}

impl PixelMask {
    /// Allocate a `width`x`height` mask filled with `cover`.
    pub fn new(
        width: u32,
        height: u32,
        cover: &RgbaImage,
        fit: CoverFit,
        rule: TransparencyRule,
    ) -> Result<Self, Error> {
        Ok(Self {
            image: compose_cover(cover, width, height, fit)?,
            rule,
        })
    }

    /// Reallocate at a new size and recomposite the cover, discarding all erase state.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        cover: &RgbaImage,
        fit: CoverFit,
    ) -> Result<(), Error> {
        self.image = compose_cover(cover, width, height, fit)?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn rule(&self) -> TransparencyRule {
        self.rule
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Paint a new cover over the current erase state.
    ///
    /// Colour comes from the new cover; alpha is the product of the new cover's
    /// alpha and the current alpha, so erased pixels stay erased.
    pub fn composite_cover(&mut self, cover: &RgbaImage, fit: CoverFit) -> Result<(), Error> {
        let (width, height) = self.dimensions();
        let layer = compose_cover(cover, width, height, fit)?;
        for (dst, src) in self.image.pixels_mut().zip(layer.pixels()) {
            let alpha = mul_u8(src[3], dst[3]);
            *dst = if alpha == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([src[0], src[1], src[2], alpha])
            };
        }
        Ok(())
    }

    /// Clear every pixel within `stroke_width / 2` of `stroke` (round joins and caps).
    ///
    /// With `anti_alias`, edge pixels keep the uncovered share of their channels.
    /// Returns whether any pixel changed.
    pub fn cut(&mut self, stroke: &StrokePath, stroke_width: f32, anti_alias: bool) -> bool {
        let segments = flatten(stroke);
        if segments.is_empty() || self.image.width() == 0 || self.image.height() == 0 {
            return false;
        }
        let radius = (stroke_width / 2.0).max(0.0);
        let reach = radius + 1.0;

        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for (a, b) in &segments {
            min_x = min_x.min(a.x.min(b.x));
            min_y = min_y.min(a.y.min(b.y));
            max_x = max_x.max(a.x.max(b.x));
            max_y = max_y.max(a.y.max(b.y));
        }
        let x0 = (min_x - reach).floor().max(0.0) as u32;
        let y0 = (min_y - reach).floor().max(0.0) as u32;
        let x1 = ((max_x + reach).ceil().max(0.0) as u32).min(self.image.width());
        let y1 = ((max_y + reach).ceil().max(0.0) as u32).min(self.image.height());

        let mut changed = false;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let distance = segments
                    .iter()
                    .map(|(a, b)| distance_to_segment(center, *a, *b))
                    .fold(f32::MAX, f32::min);
                let coverage = if anti_alias {
                    (radius + 0.5 - distance).clamp(0.0, 1.0)
                } else if distance <= radius {
                    1.0
                } else {
                    0.0
                };
                if coverage <= 0.0 {
                    continue;
                }
                let pixel = self.image.get_pixel_mut(x, y);
                let before = pixel.0;
                if coverage >= 1.0 {
                    pixel.0 = [0, 0, 0, 0];
                } else {
                    for channel in pixel.0.iter_mut() {
                        *channel = (*channel as f32 * (1.0 - coverage)).round() as u8;
                    }
                }
                changed |= before != pixel.0;
            }
        }
        trace!(segments = segments.len(), radius, changed, "cut stroke");
        changed
    }

    /// Clear every pixel of `rect` (clipped to the mask) to fully transparent.
    pub fn cut_rect(&mut self, rect: ContentBounds) {
        let Some((x, y, w, h)) = rect.clamp_to(self.image.width(), self.image.height()) else {
            return;
        };
        for py in y..y + h {
            for px in x..x + w {
                self.image.put_pixel(px, py, Rgba([0, 0, 0, 0]));
            }
        }
        trace!(x, y, w, h, "cut rect");
    }

    /// Fraction of pixels that are erased under the mask's transparency rule.
    ///
    /// O(width x height); keep it off the interactive thread for large masks.
    pub fn transparent_fraction(&self) -> f32 {
        fraction_of(self.image.as_raw(), self.rule)
    }

    /// Copy the pixels to measure, optionally restricted to `scope`.
    pub fn snapshot(&self, scope: Option<ContentBounds>) -> MaskSnapshot {
        let pixels = match scope {
            None => self.image.as_raw().clone(),
            Some(rect) => match rect.clamp_to(self.image.width(), self.image.height()) {
                Some((x, y, w, h)) => {
                    image::imageops::crop_imm(&self.image, x, y, w, h)
                        .to_image()
                        .into_raw()
                }
                None => Vec::new(),
            },
        };
        MaskSnapshot {
            pixels,
            rule: self.rule,
        }
    }

    /// Share of identical bytes between two masks of the same size.
    pub fn similarity(&self, other: &PixelMask) -> f32 {
        if self.dimensions() != other.dimensions() {
            return 0.0;
        }
        let a = self.image.as_raw();
        let b = other.image.as_raw();
        if a.is_empty() {
            return 0.0;
        }
        let same = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
        same as f32 / a.len() as f32
    }
}

/// Owned copy of mask pixels handed to a background sample.
#[derive(Debug, Clone, Default)]
pub struct MaskSnapshot {
    pixels: Vec<u8>,
    rule: TransparencyRule,
}

impl MaskSnapshot {
    pub fn transparent_fraction(&self) -> f32 {
        fraction_of(&self.pixels, self.rule)
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Transparent fraction of an optional mask; absent masks measure 0.0.
pub fn transparent_fraction(mask: Option<&PixelMask>) -> f32 {
    mask.map_or(0.0, PixelMask::transparent_fraction)
}

/// Similarity of two optional masks; 0.0 when either is absent.
pub fn similarity(a: Option<&PixelMask>, b: Option<&PixelMask>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => a.similarity(b),
        _ => 0.0,
    }
}

fn fraction_of(rgba: &[u8], rule: TransparencyRule) -> f32 {
    let total = rgba.len() / 4;
    if total == 0 {
        return 0.0;
    }
    let clear = rgba
        .chunks_exact(4)
        .filter(|px| match rule {
            TransparencyRule::Alpha => px[3] == 0,
            TransparencyRule::AllChannels => px == &[0, 0, 0, 0],
        })
        .count();
    clear as f32 / total as f32
}

fn flatten(stroke: &StrokePath) -> Vec<(Point, Point)> {
    let mut segments = Vec::new();
    for event in stroke.path().iter().flattened(FLATTEN_TOLERANCE) {
        if let PathEvent::Line { from, to } = event {
            segments.push((from, to));
        }
    }
    segments
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len_sq = ab.square_length();
    if len_sq <= f32::EPSILON {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

fn mul_u8(a: u8, b: u8) -> u8 {
    ((a as u16 * b as u16 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeTracker;

    fn opaque(width: u32, height: u32) -> PixelMask {
        let cover = RgbaImage::from_pixel(1, 1, Rgba([200, 180, 40, 255]));
        PixelMask::new(width, height, &cover, CoverFit::Stretch, TransparencyRule::Alpha).unwrap()
    }

    fn drag(points: &[(f32, f32)]) -> Vec<StrokePath> {
        let mut tracker = StrokeTracker::new();
        let (x, y) = points[0];
        tracker.begin(x, y);
        let mut out: Vec<StrokePath> = points[1..]
            .iter()
            .filter_map(|&(x, y)| tracker.extend(x, y))
            .collect();
        let (x, y) = points[points.len() - 1];
        out.extend(tracker.end(x, y));
        out
    }

    #[test]
    fn fresh_mask_is_opaque() {
        assert_eq!(opaque(100, 100).transparent_fraction(), 0.0);
    }

    #[test]
    fn full_rect_cut_is_fully_transparent() {
        let mut mask = opaque(100, 100);
        mask.cut_rect(ContentBounds::new(0, 0, 100, 100));
        assert_eq!(mask.transparent_fraction(), 1.0);
    }

    #[test]
    fn rect_cut_is_clipped() {
        let mut mask = opaque(10, 10);
        mask.cut_rect(ContentBounds::new(-5, -5, 5, 5));
        assert!((mask.transparent_fraction() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn tap_clears_round_dot() {
        let mut mask = opaque(40, 40);
        let segments = drag(&[(20.0, 20.0)]);
        assert_eq!(segments.len(), 1);
        assert!(mask.cut(&segments[0], 10.0, false));
        assert_eq!(mask.as_image().get_pixel(20, 20)[3], 0);
        // corner of the bounding square lies outside the radius
        assert_eq!(mask.as_image().get_pixel(15, 15)[3], 255);
        assert_eq!(mask.as_image().get_pixel(30, 20)[3], 255);
    }

    #[test]
    fn drag_clears_along_path() {
        let mut mask = opaque(100, 20);
        for segment in drag(&[(10.0, 10.0), (30.0, 10.0), (50.0, 10.0), (70.0, 10.0)]) {
            mask.cut(&segment, 10.0, true);
        }
        for x in [12, 25, 40, 60, 69] {
            assert_eq!(mask.as_image().get_pixel(x, 10).0, [0, 0, 0, 0], "x = {x}");
        }
        assert_eq!(mask.as_image().get_pixel(90, 10)[3], 255);
        assert_eq!(mask.as_image().get_pixel(40, 1)[3], 255);
    }

    #[test]
    fn anti_aliased_edges_are_partial() {
        let mut mask = opaque(40, 40);
        let segment = drag(&[(20.0, 20.0)]).remove(0);
        mask.cut(&segment, 9.0, true);
        let partial = mask
            .as_image()
            .pixels()
            .filter(|p| p[3] > 0 && p[3] < 255)
            .count();
        assert!(partial > 0);
    }

    #[test]
    fn cutting_never_decreases_transparency() {
        let mut mask = opaque(60, 60);
        let mut last = mask.transparent_fraction();
        for segment in drag(&[(5.0, 5.0), (20.0, 12.0), (35.0, 30.0), (50.0, 55.0)]) {
            mask.cut(&segment, 12.0, true);
            let now = mask.transparent_fraction();
            assert!(now >= last);
            last = now;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn composite_keeps_erased_pixels() {
        let mut mask = opaque(10, 10);
        mask.cut_rect(ContentBounds::new(0, 0, 5, 10));
        let red = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        mask.composite_cover(&red, CoverFit::Stretch).unwrap();
        assert_eq!(mask.as_image().get_pixel(2, 2).0, [0, 0, 0, 0]);
        assert_eq!(mask.as_image().get_pixel(7, 2).0, [255, 0, 0, 255]);
        assert!((mask.transparent_fraction() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn initialize_discards_erase_state() {
        let mut mask = opaque(10, 10);
        mask.cut_rect(ContentBounds::new(0, 0, 10, 10));
        let cover = RgbaImage::from_pixel(1, 1, Rgba([1, 1, 1, 255]));
        mask.initialize(20, 5, &cover, CoverFit::Stretch).unwrap();
        assert_eq!(mask.dimensions(), (20, 5));
        assert_eq!(mask.transparent_fraction(), 0.0);
    }

    #[test]
    fn all_channels_rule_ignores_black_opaque_pixels() {
        let black = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let mut mask =
            PixelMask::new(4, 4, &black, CoverFit::Stretch, TransparencyRule::AllChannels)
                .unwrap();
        assert_eq!(mask.transparent_fraction(), 0.0);
        mask.cut_rect(ContentBounds::new(0, 0, 2, 4));
        assert!((mask.transparent_fraction() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn similarity_properties() {
        let a = opaque(8, 8);
        assert_eq!(a.similarity(&a), 1.0);
        assert_eq!(a.similarity(&opaque(8, 9)), 0.0);
        let mut b = a.clone();
        b.cut_rect(ContentBounds::new(0, 0, 8, 4));
        let s = a.similarity(&b);
        assert!(s > 0.0 && s < 1.0);
        assert_eq!(similarity(Some(&a), None), 0.0);
    }

    #[test]
    fn absent_and_empty_masks_measure_zero() {
        assert_eq!(transparent_fraction(None), 0.0);
        assert_eq!(MaskSnapshot::default().transparent_fraction(), 0.0);
        assert_eq!(opaque(0, 0).transparent_fraction(), 0.0);
    }

    #[test]
    fn scoped_snapshot_measures_only_the_rect() {
        let mut mask = opaque(20, 20);
        mask.cut_rect(ContentBounds::new(0, 0, 10, 10));
        let inner = mask.snapshot(Some(ContentBounds::new(0, 0, 10, 10)));
        assert_eq!(inner.transparent_fraction(), 1.0);
        let whole = mask.snapshot(None);
        assert!((whole.transparent_fraction() - 0.25).abs() < 1e-6);
    }
}
