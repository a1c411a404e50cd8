//! Background transparency sampling with a single-flight guard.
//!
//! Samples run on the tokio blocking pool. Each admitted request takes a
//! ticket that holds one slot of the in-flight counter until the worker has
//! sent its result; requests arriving while the counter is above one are
//! dropped rather than queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::bounds::ContentBounds;
use crate::events::SampleCompleted;
use crate::mask::{MaskSnapshot, PixelMask};

/// Requests are dropped while more than this many samples are outstanding.
const MAX_OUTSTANDING: usize = 1;

/// Admission to run one sample. Dropping an undispatched ticket releases its slot.
#[derive(Debug)]
pub struct SampleTicket {
    generation: u64,
    guard: InFlightGuard,
}

impl SampleTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Dispatches transparency samples and collects their results.
pub struct RevealSampler {
    runtime: Handle,
    in_flight: Arc<AtomicUsize>,
    tx: Sender<SampleCompleted>,
    rx: Receiver<SampleCompleted>,
    next_generation: u64,
}

impl RevealSampler {
    pub fn new(runtime: Handle) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            runtime,
            in_flight: Arc::new(AtomicUsize::new(0)),
            tx,
            rx,
            next_generation: 0,
        }
    }

    /// Try to take an in-flight slot.
    ///
    /// Returns `None` when more than one sample is already outstanding.
    pub fn begin_sample(&mut self) -> Option<SampleTicket> {
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n <= MAX_OUTSTANDING).then_some(n + 1)
            })
            .is_ok();
        if !admitted {
            trace!(in_flight = self.in_flight(), "sample request dropped");
            return None;
        }
        self.next_generation += 1;
        Some(SampleTicket {
            generation: self.next_generation,
            guard: InFlightGuard(Arc::clone(&self.in_flight)),
        })
    }

    /// Run `job` on the blocking pool under `ticket`.
    ///
    /// The slot is released only after the result has been queued, so an idle
    /// sampler never has an undelivered result pending. A panicking job releases
    /// the slot without producing a result.
    pub fn dispatch<F>(&self, ticket: SampleTicket, job: F)
    where
        F: FnOnce() -> f32 + Send + 'static,
    {
        let tx = self.tx.clone();
        let SampleTicket { generation, guard } = ticket;
        trace!(generation, "sample dispatched");
        self.runtime.spawn_blocking(move || {
            let fraction = job();
            if tx.send(SampleCompleted { generation, fraction }).is_err() {
                debug!(generation, "sampler gone, result discarded");
            }
            drop(guard);
        });
    }

    /// Admit and dispatch a sample of `mask`, restricted to `scope` when given.
    ///
    /// The pixels are copied only after admission; an absent mask samples as 0.0.
    /// Returns the generation of the dispatched sample.
    pub fn request(&mut self, mask: Option<&PixelMask>, scope: Option<ContentBounds>) -> Option<u64> {
        let ticket = self.begin_sample()?;
        let generation = ticket.generation();
        let snapshot = mask.map(|m| m.snapshot(scope)).unwrap_or_default();
        self.dispatch(ticket, move || measure(&snapshot));
        Some(generation)
    }

    /// Number of samples admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Whether a request made now would be admitted.
    pub fn has_capacity(&self) -> bool {
        self.in_flight() <= MAX_OUTSTANDING
    }

    /// Generation of the most recently admitted sample; 0 before the first.
    pub fn latest_generation(&self) -> u64 {
        self.next_generation
    }

    /// Next finished sample, if any, without blocking.
    pub fn try_completed(&self) -> Option<SampleCompleted> {
        match self.rx.try_recv() {
            Ok(done) => Some(done),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("sample channel disconnected");
                None
            }
        }
    }

    /// Wait up to `timeout` for the next finished sample.
    pub fn wait_completed(&self, timeout: Duration) -> Option<SampleCompleted> {
        match self.rx.recv_timeout(timeout) {
            Ok(done) => Some(done),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("sample channel disconnected");
                None
            }
        }
    }
}

fn measure(snapshot: &MaskSnapshot) -> f32 {
    let fraction = snapshot.transparent_fraction();
    trace!(fraction, empty = snapshot.is_empty(), "sample measured");
    fraction
}
