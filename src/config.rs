use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::bounds::{ContentLayout, HorizontalAlign, Padding, VerticalAlign};

/// How a cover image is fitted into the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverFit {
    /// Resize to exactly the mask size, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Repeat the image at its native size from the top-left corner.
    Tile,
    /// Scale preserving aspect ratio until the mask is covered, then centre-crop.
    Cover,
}

/// Which pixels count as erased when measuring the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransparencyRule {
    /// Alpha channel is zero.
    #[default]
    Alpha,
    /// All four channels are zero.
    AllChannels,
}

/// Region of the mask that reveal sampling measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasureScope {
    /// Every pixel of the mask, regardless of where the content sits.
    #[default]
    WholeSurface,
    /// Only the resolved content rectangle (scale 1.0).
    ContentBounds,
}

impl fmt::Display for MeasureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WholeSurface => "whole-surface",
            Self::ContentBounds => "content-bounds",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CoverOptions {
    /// Optional cover image file; a solid `color` cover is used otherwise.
    pub path: Option<PathBuf>,
    pub fit: CoverFit,
    pub color: [u8; 4],
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self {
            path: None,
            fit: CoverFit::default(),
            color: [192, 160, 64, 255],
        }
    }
}

impl CoverOptions {
    /// Decode the configured cover, or build a single-pixel solid cover.
    pub fn load(&self) -> Result<image::RgbaImage> {
        match &self.path {
            Some(path) => Ok(image::open(path)
                .with_context(|| format!("failed to load cover image at {}", path.display()))?
                .to_rgba8()),
            None => Ok(image::RgbaImage::from_pixel(1, 1, image::Rgba(self.color))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ContentOptions {
    /// Hidden text whose bounds drive `reveal()` and scoped sampling.
    pub text: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    /// Host-reported line count. Defaults to the number of lines in `text`.
    pub line_count: Option<u32>,
    pub padding: Padding,
    pub horizontal_align: HorizontalAlign,
    pub vertical_align: VerticalAlign,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_path: None,
            font_size: 32.0,
            line_count: None,
            padding: Padding::default(),
            horizontal_align: HorizontalAlign::default(),
            vertical_align: VerticalAlign::default(),
        }
    }
}

impl ContentOptions {
    pub fn layout(&self) -> ContentLayout {
        let line_count = self
            .line_count
            .unwrap_or_else(|| self.text.lines().count() as u32);
        ContentLayout {
            text: self.text.clone(),
            line_count,
            padding: self.padding,
            horizontal: self.horizontal_align,
            vertical: self.vertical_align,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Erase stroke width as a multiple of the 10 px base width.
    pub stroke_width_multiplier: u32,
    /// Soft (partially cleared) stroke edges.
    pub anti_alias: bool,
    pub transparency: TransparencyRule,
    pub measure_scope: MeasureScope,
    /// Reveal everything once a percent-changed event reaches this value.
    pub auto_reveal_percent: Option<f32>,
    /// How long to wait for outstanding samples before giving up.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    pub cover: CoverOptions,
    pub content: ContentOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.stroke_width_multiplier >= 1,
            "stroke-width-multiplier must be at least 1"
        );
        if let Some(percent) = self.auto_reveal_percent {
            ensure!(
                percent > 0.0 && percent <= 100.0,
                "auto-reveal-percent must be within (0, 100]"
            );
        }
        ensure!(
            self.settle_timeout > Duration::ZERO,
            "settle-timeout must be positive"
        );
        ensure!(
            self.content.font_size > 0.0,
            "content.font-size must be positive"
        );
        if let Some(path) = &self.cover.path {
            ensure!(
                path.is_file(),
                "cover.path {} must point to a file",
                path.display()
            );
        }
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            stroke_width_multiplier: 6,
            anti_alias: true,
            transparency: TransparencyRule::default(),
            measure_scope: MeasureScope::default(),
            auto_reveal_percent: None,
            settle_timeout: Duration::from_secs(2),
            cover: CoverOptions::default(),
            content: ContentOptions::default(),
        }
    }
}
