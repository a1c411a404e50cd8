pub mod bounds;
pub mod config;
pub mod error;
pub mod events;
pub mod fonts;
pub mod gesture;
pub mod mask;
pub mod stroke;
pub mod surface;
pub mod processing {
    pub mod cover;
    pub mod layout;
}
pub mod tasks {
    pub mod sampler;
}

pub use bounds::{ContentBounds, ContentLayout, GlyphMeasure, MeasureText, TextExtent};
pub use config::Configuration;
pub use error::Error;
pub use events::{PointerEvent, RevealEvent};
pub use mask::PixelMask;
pub use stroke::StrokeTracker;
pub use surface::{REVEAL_ALL_SCALE, ScratchSurface};
pub use tasks::sampler::RevealSampler;
