//! Interactive scratch-off surface.
//!
//! The surface owns the mask and the stroke tracker and is driven from a
//! single interactive thread: pointer events cut into the mask immediately and
//! request a background sample, and finished samples are applied when the
//! host calls [`ScratchSurface::poll`] or [`ScratchSurface::settle`]. Listener
//! callbacks therefore always run on the interactive thread.

use std::time::{Duration, Instant};

use anyhow::Context;
use image::{RgbaImage, imageops};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::bounds::{self, ContentBounds, ContentLayout, MeasureText};
use crate::config::{Configuration, CoverFit, MeasureScope, TransparencyRule};
use crate::error::Error;
use crate::events::{PointerEvent, RevealEvent, SampleCompleted};
use crate::mask::PixelMask;
use crate::stroke::{StrokePath, StrokeTracker, stroke_width_for};
use crate::tasks::sampler::RevealSampler;

/// Bounds scale used by [`ScratchSurface::reveal`]; large enough to clear the
/// whole cover despite measurement error.
pub const REVEAL_ALL_SCALE: f32 = 15.0;

const DEFAULT_STROKE_MULTIPLIER: u32 = 6;

/// Longest single wait inside `settle`, so a sample lost to a panic is noticed.
const SETTLE_SLICE: Duration = Duration::from_millis(20);

pub type RevealListener = Box<dyn FnMut(&RevealEvent) + Send>;

/// Last applied measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RevealState {
    /// Transparent fraction in `[0, 1]`.
    pub fraction: f32,
    pub fully_revealed: bool,
    generation: u64,
}

impl RevealState {
    /// Apply a finished sample and return the events it produces, in delivery order.
    ///
    /// Samples older than the last applied one are ignored, and nothing changes
    /// once the surface is fully revealed.
    pub fn apply(&mut self, done: SampleCompleted) -> Vec<RevealEvent> {
        if done.generation <= self.generation {
            debug!(
                generation = done.generation,
                applied = self.generation,
                "stale sample discarded"
            );
            return Vec::new();
        }
        self.generation = done.generation;
        if self.fully_revealed {
            return Vec::new();
        }

        let mut events = Vec::new();
        if done.fraction != self.fraction {
            self.fraction = done.fraction;
            events.push(RevealEvent::PercentChanged(done.fraction * 100.0));
        }
        if done.fraction >= 1.0 {
            self.fully_revealed = true;
            events.push(RevealEvent::FullyRevealed);
        }
        events
    }

    /// Ignore every sample admitted at or before `generation`.
    pub fn discard_through(&mut self, generation: u64) {
        self.generation = self.generation.max(generation);
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Stroke segments cut into the mask.
    pub commits: u64,
    pub samples_dispatched: u64,
    /// Sample requests shed by the single-flight guard.
    pub samples_dropped: u64,
}

pub struct ScratchSurface {
    width: u32,
    height: u32,
    mask: Option<PixelMask>,
    cover: RgbaImage,
    cover_fit: CoverFit,
    transparency: TransparencyRule,
    stroke_width: f32,
    anti_alias: bool,
    tracker: StrokeTracker,
    sampler: RevealSampler,
    measure_scope: MeasureScope,
    layout: ContentLayout,
    measure: Box<dyn MeasureText>,
    listener: Option<RevealListener>,
    state: RevealState,
    auto_reveal_percent: Option<f32>,
    auto_revealed: bool,
    /// A sample request was shed since the last dispatched one.
    resample_pending: bool,
    redraw_requested: bool,
    stats: SurfaceStats,
}

impl ScratchSurface {
    /// Surface with default options. Call [`on_resize`](Self::on_resize) before erasing.
    pub fn new(
        runtime: Handle,
        cover: RgbaImage,
        measure: Box<dyn MeasureText>,
    ) -> Result<Self, Error> {
        if cover.width() == 0 || cover.height() == 0 {
            return Err(Error::EmptyCover);
        }
        Ok(Self {
            width: 0,
            height: 0,
            mask: None,
            cover,
            cover_fit: CoverFit::default(),
            transparency: TransparencyRule::default(),
            stroke_width: stroke_width_for(DEFAULT_STROKE_MULTIPLIER),
            anti_alias: true,
            tracker: StrokeTracker::new(),
            sampler: RevealSampler::new(runtime),
            measure_scope: MeasureScope::default(),
            layout: ContentLayout::default(),
            measure,
            listener: None,
            state: RevealState::default(),
            auto_reveal_percent: None,
            auto_revealed: false,
            resample_pending: false,
            redraw_requested: false,
            stats: SurfaceStats::default(),
        })
    }

    /// Surface configured from a validated [`Configuration`].
    pub fn from_config(
        config: &Configuration,
        runtime: Handle,
        measure: Box<dyn MeasureText>,
    ) -> anyhow::Result<Self> {
        let cover = config.cover.load()?;
        let mut surface = Self::new(runtime, cover, measure)?;
        surface
            .set_stroke_width(config.stroke_width_multiplier)
            .context("invalid stroke-width-multiplier")?;
        surface.cover_fit = config.cover.fit;
        surface.transparency = config.transparency;
        surface.anti_alias = config.anti_alias;
        surface.measure_scope = config.measure_scope;
        surface.auto_reveal_percent = config.auto_reveal_percent;
        surface.layout = config.content.layout();
        debug!(
            stroke_width = surface.stroke_width,
            scope = %surface.measure_scope,
            "surface configured"
        );
        Ok(surface)
    }

    /// Reallocate the mask at `width`x`height` with a fresh cover.
    ///
    /// Erase state is discarded and samples of the old mask still in flight
    /// are ignored; the last measured percent is kept until the next sample.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        match &mut self.mask {
            Some(mask) => mask.initialize(width, height, &self.cover, self.cover_fit)?,
            None => {
                self.mask = Some(PixelMask::new(
                    width,
                    height,
                    &self.cover,
                    self.cover_fit,
                    self.transparency,
                )?)
            }
        }
        self.width = width;
        self.height = height;
        self.state.discard_through(self.sampler.latest_generation());
        self.redraw_requested = true;
        debug!(width, height, "surface resized");
        Ok(())
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down { x, y } => self.on_pointer_down(x, y),
            PointerEvent::Move { x, y } => self.on_pointer_move(x, y),
            PointerEvent::Up { x, y } => self.on_pointer_up(x, y),
        }
    }

    pub fn on_pointer_down(&mut self, x: f32, y: f32) {
        self.tracker.begin(x, y);
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        if let Some(segment) = self.tracker.extend(x, y) {
            self.commit(segment);
        }
    }

    pub fn on_pointer_up(&mut self, x: f32, y: f32) {
        if let Some(segment) = self.tracker.end(x, y) {
            self.commit(segment);
        }
    }

    fn commit(&mut self, segment: StrokePath) {
        let Some(mask) = &mut self.mask else {
            trace!("no mask yet, segment ignored");
            return;
        };
        mask.cut(&segment, self.stroke_width, self.anti_alias);
        self.stats.commits += 1;
        self.redraw_requested = true;
        self.check_revealed();
    }

    /// Request a background sample unless the surface is already fully revealed.
    pub fn check_revealed(&mut self) {
        if self.is_revealed() {
            return;
        }
        let bounds = self.content_bounds(1.0);
        let scope = match self.measure_scope {
            MeasureScope::WholeSurface => None,
            MeasureScope::ContentBounds => Some(bounds),
        };
        match self.sampler.request(self.mask.as_ref(), scope) {
            Some(generation) => {
                self.stats.samples_dispatched += 1;
                self.resample_pending = false;
                trace!(generation, ?bounds, "reveal sample requested");
            }
            None => {
                self.stats.samples_dropped += 1;
                self.resample_pending = true;
            }
        }
    }

    /// Measure again once a slot frees up if a request was shed, so the last
    /// mutation is always sampled.
    fn flush_pending_sample(&mut self) {
        if !self.resample_pending || !self.sampler.has_capacity() {
            return;
        }
        self.resample_pending = false;
        if !self.is_revealed() {
            trace!("trailing sample after shed request");
            self.check_revealed();
        }
    }

    /// Clear the content area at [`REVEAL_ALL_SCALE`] and sample again.
    ///
    /// Without measurable content the whole surface is cleared.
    pub fn reveal(&mut self) {
        let mut rect = self.content_bounds(REVEAL_ALL_SCALE);
        if rect.is_empty() {
            rect = ContentBounds::new(0, 0, self.width as i32, self.height as i32);
        }
        info!(?rect, "revealing content");
        self.cut_rect(rect);
    }

    /// Clear `rect` to transparent and sample again.
    pub fn cut_rect(&mut self, rect: ContentBounds) {
        if let Some(mask) = &mut self.mask {
            mask.cut_rect(rect);
        }
        self.check_revealed();
        self.redraw_requested = true;
    }

    /// True once a sample measured the surface as fully transparent.
    pub fn is_revealed(&self) -> bool {
        self.state.fully_revealed
    }

    /// Last measured transparent fraction in `[0, 1]`.
    pub fn reveal_percent(&self) -> f32 {
        self.state.fraction
    }

    pub fn set_reveal_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&RevealEvent) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_reveal_listener(&mut self) {
        self.listener = None;
    }

    /// Set the erase width to `multiplier` x 10 px. Applies to the next segment.
    pub fn set_stroke_width(&mut self, multiplier: u32) -> Result<(), Error> {
        if multiplier < 1 {
            return Err(Error::InvalidStrokeWidth(multiplier));
        }
        self.stroke_width = stroke_width_for(multiplier);
        Ok(())
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    /// Swap the cover image, layering it over the current erase state.
    pub fn set_cover_image(&mut self, cover: RgbaImage) -> Result<(), Error> {
        if cover.width() == 0 || cover.height() == 0 {
            return Err(Error::EmptyCover);
        }
        if let Some(mask) = &mut self.mask {
            mask.composite_cover(&cover, self.cover_fit)?;
        }
        self.cover = cover;
        self.redraw_requested = true;
        Ok(())
    }

    pub fn set_layout(&mut self, layout: ContentLayout) {
        self.layout = layout;
    }

    pub fn set_measure(&mut self, measure: Box<dyn MeasureText>) {
        self.measure = measure;
    }

    pub fn set_auto_reveal_percent(&mut self, percent: Option<f32>) {
        self.auto_reveal_percent = percent;
    }

    /// Content rectangle at `scale`, recomputed from the current layout.
    pub fn content_bounds(&self, scale: f32) -> ContentBounds {
        bounds::resolve(
            self.width,
            self.height,
            &self.layout,
            self.measure.as_ref(),
            scale,
        )
    }

    /// Composite the cover layer over `target`, anchored at the top-left corner.
    pub fn render(&self, target: &mut RgbaImage) {
        if let Some(mask) = &self.mask {
            imageops::overlay(target, mask.as_image(), 0, 0);
        }
    }

    /// Whether anything asked for a redraw since the last call.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    pub fn mask(&self) -> Option<&PixelMask> {
        self.mask.as_ref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    pub fn samples_in_flight(&self) -> usize {
        self.sampler.in_flight()
    }

    /// Apply every finished sample without blocking and return the events produced.
    pub fn poll(&mut self) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        while let Some(done) = self.sampler.try_completed() {
            events.extend(self.apply_sample(done));
        }
        self.flush_pending_sample();
        events
    }

    /// Apply samples until none is outstanding, waiting at most `timeout`.
    ///
    /// Returns `false` when the timeout elapsed first.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // an idle sampler has already queued all of its results
            let idle = self.sampler.is_idle();
            self.poll();
            if idle && self.sampler.is_idle() && !self.resample_pending {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    in_flight = self.sampler.in_flight(),
                    "samples still outstanding after settle timeout"
                );
                return false;
            }
            if let Some(done) = self.sampler.wait_completed(remaining.min(SETTLE_SLICE)) {
                self.apply_sample(done);
            }
        }
    }

    fn apply_sample(&mut self, done: SampleCompleted) -> Vec<RevealEvent> {
        let events = self.state.apply(done);
        for event in &events {
            match event {
                RevealEvent::PercentChanged(percent) => debug!(percent, "reveal percent changed"),
                RevealEvent::FullyRevealed => info!("surface fully revealed"),
            }
            if let Some(listener) = self.listener.as_mut() {
                listener(event);
            }
        }

        if let Some(threshold) = self.auto_reveal_percent
            && !self.auto_revealed
            && !self.state.fully_revealed
            && events
                .iter()
                .any(|e| matches!(e, RevealEvent::PercentChanged(p) if *p >= threshold))
        {
            self.auto_revealed = true;
            info!(threshold, "auto reveal threshold reached");
            self.reveal();
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(generation: u64, fraction: f32) -> SampleCompleted {
        SampleCompleted {
            generation,
            fraction,
        }
    }

    #[test]
    fn percent_change_then_fully_revealed() {
        let mut state = RevealState::default();
        assert_eq!(
            state.apply(sample(1, 0.5)),
            vec![RevealEvent::PercentChanged(50.0)]
        );
        assert_eq!(
            state.apply(sample(2, 1.0)),
            vec![RevealEvent::PercentChanged(100.0), RevealEvent::FullyRevealed]
        );
        assert!(state.fully_revealed);
    }

    #[test]
    fn unchanged_fraction_is_silent() {
        let mut state = RevealState::default();
        state.apply(sample(1, 0.3));
        assert!(state.apply(sample(2, 0.3)).is_empty());
    }

    #[test]
    fn fully_revealed_fires_once() {
        let mut state = RevealState::default();
        state.apply(sample(1, 1.0));
        assert!(state.apply(sample(2, 1.0)).is_empty());
        assert!(state.apply(sample(3, 0.2)).is_empty());
        assert!(state.fully_revealed);
        assert_eq!(state.fraction, 1.0);
    }

    #[test]
    fn stale_sample_is_discarded() {
        let mut state = RevealState::default();
        state.apply(sample(2, 0.6));
        assert!(state.apply(sample(1, 0.4)).is_empty());
        assert_eq!(state.fraction, 0.6);
    }

    #[test]
    fn zero_stroke_multiplier_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let cover = RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
        let mut surface =
            ScratchSurface::new(rt.handle().clone(), cover, Box::new(bounds::TextExtent::default()))
                .unwrap();
        assert!(matches!(
            surface.set_stroke_width(0),
            Err(Error::InvalidStrokeWidth(0))
        ));
        surface.set_stroke_width(2).unwrap();
        assert_eq!(surface.stroke_width(), 20.0);
    }

    #[test]
    fn discarded_generations_are_never_applied() {
        let mut state = RevealState::default();
        state.apply(sample(1, 0.2));
        state.discard_through(3);
        assert!(state.apply(sample(2, 1.0)).is_empty());
        assert!(state.apply(sample(3, 1.0)).is_empty());
        assert!(!state.fully_revealed);
        assert_eq!(
            state.apply(sample(4, 0.4)),
            vec![RevealEvent::PercentChanged(40.0)]
        );
        // a lower floor never rewinds
        state.discard_through(1);
        assert!(state.apply(sample(4, 0.9)).is_empty());
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn opaque_surface(rt: &tokio::runtime::Runtime, width: u32, height: u32) -> ScratchSurface {
        let cover = RgbaImage::from_pixel(1, 1, image::Rgba([90, 90, 90, 255]));
        let extent = bounds::TextExtent {
            width: 20,
            height: 10,
        };
        let mut surface = ScratchSurface::new(rt.handle().clone(), cover, Box::new(extent)).unwrap();
        surface.on_resize(width, height).unwrap();
        surface
    }

    #[test]
    fn shed_request_is_sampled_once_a_slot_frees() {
        let rt = runtime();
        let mut surface = opaque_surface(&rt, 60, 40);
        let busy = [
            surface.sampler.begin_sample().unwrap(),
            surface.sampler.begin_sample().unwrap(),
        ];

        surface.reveal();
        assert_eq!(surface.stats().samples_dropped, 1);
        assert_eq!(surface.stats().samples_dispatched, 0);
        // still busy: nothing to apply and no slot for the trailing sample
        assert!(surface.poll().is_empty());
        assert_eq!(surface.stats().samples_dispatched, 0);

        drop(busy);
        assert!(surface.settle(Duration::from_secs(5)));
        assert_eq!(surface.stats().samples_dispatched, 1);
        assert!(surface.is_revealed());
        assert_eq!(surface.reveal_percent(), 1.0);
    }

    #[test]
    fn samples_from_before_a_resize_are_ignored() {
        let rt = runtime();
        let mut surface = opaque_surface(&rt, 30, 30);
        surface.cut_rect(ContentBounds::new(0, 0, 30, 30));
        assert_eq!(surface.stats().samples_dispatched, 1);

        surface.on_resize(50, 20).unwrap();
        assert!(surface.settle(Duration::from_secs(5)));
        assert!(!surface.is_revealed());
        assert_eq!(surface.reveal_percent(), 0.0);

        // the fresh mask is still measured normally
        surface.cut_rect(ContentBounds::new(0, 0, 25, 20));
        assert!(surface.settle(Duration::from_secs(5)));
        assert!((surface.reveal_percent() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segments_before_resize_are_not_commits() {
        let rt = runtime();
        let cover = RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
        let mut surface =
            ScratchSurface::new(rt.handle().clone(), cover, Box::new(bounds::TextExtent::default()))
                .unwrap();
        surface.on_pointer_down(0.0, 0.0);
        surface.on_pointer_move(40.0, 40.0);
        surface.on_pointer_up(40.0, 40.0);
        assert_eq!(surface.stats(), SurfaceStats::default());
        assert!(!surface.take_redraw_request());
    }
}
