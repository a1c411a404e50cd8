use thiserror::Error;

/// Library error type for scratch surface operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Stroke width multipliers start at 1.
    #[error("invalid stroke width multiplier {0}; must be at least 1")]
    InvalidStrokeWidth(u32),

    /// The supplied cover image has no pixels.
    #[error("cover image has zero width or height")]
    EmptyCover,

    /// Decoding a cover image failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde error while reading configuration or gesture scripts.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// No usable font could be loaded for text measurement.
    #[error("font error: {0}")]
    Font(String),

    /// Resizing or tiling the cover into the mask failed.
    #[error("cover composition failed: {0}")]
    Compose(anyhow::Error),
}
