use anyhow::{Context, anyhow};
use fast_image_resize as fir;
use image::{RgbaImage, imageops};
use tracing::debug;

use crate::config::CoverFit;
use crate::error::Error;
use crate::processing::layout::{center_offset, resize_to_cover};

/// Build a `width`x`height` cover layer from `cover` using the requested fit.
pub fn compose_cover(
    cover: &RgbaImage,
    width: u32,
    height: u32,
    fit: CoverFit,
) -> Result<RgbaImage, Error> {
    if cover.width() == 0 || cover.height() == 0 {
        return Err(Error::EmptyCover);
    }
    if width == 0 || height == 0 {
        return Ok(RgbaImage::new(width, height));
    }

    let composed = match fit {
        CoverFit::Stretch => resize_rgba(cover, width, height).map_err(Error::Compose)?,
        CoverFit::Tile => tile(cover, width, height),
        CoverFit::Cover => {
            let (bg_w, bg_h) = resize_to_cover(width, height, cover.width(), cover.height());
            let resized = resize_rgba(cover, bg_w, bg_h).map_err(Error::Compose)?;
            let (crop_x, crop_y) = center_offset(width, height, bg_w, bg_h);
            imageops::crop_imm(&resized, crop_x, crop_y, width, height).to_image()
        }
    };
    debug!(
        width,
        height,
        source_width = cover.width(),
        source_height = cover.height(),
        ?fit,
        "composed cover"
    );
    Ok(composed)
}

fn tile(cover: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (cw, ch) = cover.dimensions();
    RgbaImage::from_fn(width, height, |x, y| *cover.get_pixel(x % cw, y % ch))
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> anyhow::Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }
    // A single pixel is a solid fill; skip the convolution.
    if source.width() == 1 && source.height() == 1 {
        return Ok(RgbaImage::from_pixel(
            target_w,
            target_h,
            *source.get_pixel(0, 0),
        ));
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for cover resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("cover resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow!("failed to construct resized RGBA cover"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker() -> RgbaImage {
        RgbaImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn solid_stretch_fills_every_pixel() {
        let cover = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let out = compose_cover(&cover, 8, 4, CoverFit::Stretch).unwrap();
        assert_eq!(out.dimensions(), (8, 4));
        assert!(out.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn stretch_resizes_to_target() {
        let out = compose_cover(&checker(), 6, 3, CoverFit::Stretch).unwrap();
        assert_eq!(out.dimensions(), (6, 3));
        assert!(out.pixels().all(|p| p[3] >= 250));
    }

    #[test]
    fn tile_repeats_from_origin() {
        let out = compose_cover(&checker(), 5, 3, CoverFit::Tile).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(2, 0).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(4, 2).0, [255, 0, 0, 255]);
    }

    #[test]
    fn cover_fit_matches_target_size() {
        let cover = RgbaImage::from_pixel(40, 10, Rgba([1, 2, 3, 255]));
        let out = compose_cover(&cover, 16, 16, CoverFit::Cover).unwrap();
        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn empty_cover_is_rejected() {
        let cover = RgbaImage::new(0, 0);
        assert!(matches!(
            compose_cover(&cover, 4, 4, CoverFit::Stretch),
            Err(Error::EmptyCover)
        ));
    }
}
