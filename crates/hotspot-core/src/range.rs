//! Asynchronous range reduction.
//!
//! Each surface owns a [`RangeDriver`], a small state machine advanced once
//! per tick:
//!
//! ```text
//! Idle --trigger--> ReductionRequested --poll--> ReadbackPending
//!                                                  |  done   --> Idle (range updated)
//!                                                  |  error  --> RetryWait
//!                                                  |  pending --> ReadbackPending
//! RetryWait --poll, delay elapsed--> ReadbackPending
//! ```
//!
//! Triggers while a cycle is running are coalesced into it. Dropping the
//! driver (or calling [`RangeDriver::restart`]) abandons any outstanding
//! readback; the backend's completion is then discarded.

use std::time::Duration;

use hotspot_types::{EventRange, SummaryPixel};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::surface::{RenderBackend, SurfaceId};

/// Default delay before a failed readback is reissued.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Errors a backend may report for a readback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadbackError {
    /// The backend could not read the summary buffer.
    #[error("readback failed: {0}")]
    Failed(String),

    /// The backend dropped the request without completing it.
    #[error("readback abandoned by backend")]
    Abandoned,
}

type ReadbackResult = Result<Vec<SummaryPixel>, ReadbackError>;

/// Backend side of a readback.
#[derive(Debug)]
pub struct ReadbackCompleter(oneshot::Sender<ReadbackResult>);

impl ReadbackCompleter {
    /// Deliver the summary buffer.
    pub fn complete(self, pixels: Vec<SummaryPixel>) {
        if self.0.send(Ok(pixels)).is_err() {
            debug!("readback completed after its driver was reset");
        }
    }

    /// Report a failed readback.
    pub fn fail(self, reason: impl Into<String>) {
        if self.0.send(Err(ReadbackError::Failed(reason.into()))).is_err() {
            debug!("readback failed after its driver was reset");
        }
    }
}

/// Outcome of polling a [`ReadbackHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadbackPoll {
    /// Not finished yet.
    Pending,
    /// Finished with the summary buffer.
    Done(Vec<SummaryPixel>),
    /// Finished with an error.
    Failed(ReadbackError),
}

/// Driver side of an in-flight readback.
#[derive(Debug)]
pub struct ReadbackHandle {
    rx: oneshot::Receiver<ReadbackResult>,
}

impl ReadbackHandle {
    /// Create a handle and the completer the backend resolves it with.
    pub fn channel() -> (ReadbackCompleter, Self) {
        let (tx, rx) = oneshot::channel();
        (ReadbackCompleter(tx), Self { rx })
    }

    /// A handle that is already complete.
    pub fn ready(pixels: Vec<SummaryPixel>) -> Self {
        let (completer, handle) = Self::channel();
        completer.complete(pixels);
        handle
    }

    /// A handle that has already failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        let (completer, handle) = Self::channel();
        completer.fail(reason);
        handle
    }

    /// Check for completion without blocking.
    pub fn poll(&mut self) -> ReadbackPoll {
        match self.rx.try_recv() {
            Ok(Ok(pixels)) => ReadbackPoll::Done(pixels),
            Ok(Err(e)) => ReadbackPoll::Failed(e),
            Err(TryRecvError::Empty) => ReadbackPoll::Pending,
            Err(TryRecvError::Closed) => ReadbackPoll::Failed(ReadbackError::Abandoned),
        }
    }
}

/// Min of the `r` channel and max of the `g` channel over a summary buffer.
///
/// Returns `None` for an empty buffer.
pub fn reduce_summary(pixels: &[SummaryPixel]) -> Option<EventRange> {
    pixels
        .iter()
        .map(|p| EventRange::new(p.r, p.g))
        .reduce(EventRange::union)
}

/// Externally visible state of a [`RangeDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePhase {
    /// Nothing to do.
    Idle,
    /// A reduction will be issued on the next poll.
    ReductionRequested,
    /// Waiting for the backend to deliver the summary buffer.
    ReadbackPending,
    /// A readback failed; waiting before reissuing it.
    RetryWait,
}

#[derive(Debug)]
enum RangeState {
    Idle,
    ReductionRequested,
    ReadbackPending(ReadbackHandle),
    RetryWait { until: Instant },
}

/// Per-surface range reduction state machine.
#[derive(Debug)]
pub struct RangeDriver {
    state: RangeState,
    range: Option<EventRange>,
    retry_delay: Duration,
    retries: u64,
}

impl Default for RangeDriver {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RangeDriver {
    /// Create an idle driver.
    pub const fn new(retry_delay: Duration) -> Self {
        Self {
            state: RangeState::Idle,
            range: None,
            retry_delay,
            retries: 0,
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> RangePhase {
        match self.state {
            RangeState::Idle => RangePhase::Idle,
            RangeState::ReductionRequested => RangePhase::ReductionRequested,
            RangeState::ReadbackPending(_) => RangePhase::ReadbackPending,
            RangeState::RetryWait { .. } => RangePhase::RetryWait,
        }
    }

    /// Last completed range, if any.
    pub const fn range(&self) -> Option<EventRange> {
        self.range
    }

    /// Failed readbacks since the driver was created.
    pub const fn retries(&self) -> u64 {
        self.retries
    }

    /// Request a refresh. Returns `false` if a cycle is already running.
    pub fn trigger(&mut self) -> bool {
        if matches!(self.state, RangeState::Idle) {
            self.state = RangeState::ReductionRequested;
            true
        } else {
            false
        }
    }

    /// Abandon any running cycle, forget the range, and request a refresh.
    pub fn restart(&mut self) {
        self.state = RangeState::ReductionRequested;
        self.range = None;
    }

    /// Advance the state machine.
    ///
    /// Returns `true` when a readback completed this call, meaning
    /// [`RangeDriver::range`] may have changed.
    pub fn poll(&mut self, surface: SurfaceId, backend: &mut dyn RenderBackend, now: Instant) -> bool {
        match core::mem::replace(&mut self.state, RangeState::Idle) {
            RangeState::Idle => false,
            RangeState::ReductionRequested => {
                backend.request_reduction(surface);
                let handle = backend.request_readback(surface);
                self.check(surface, handle, now)
            }
            RangeState::ReadbackPending(handle) => self.check(surface, handle, now),
            RangeState::RetryWait { until } => {
                if now >= until {
                    let handle = backend.request_readback(surface);
                    self.check(surface, handle, now)
                } else {
                    self.state = RangeState::RetryWait { until };
                    false
                }
            }
        }
    }

    fn check(&mut self, surface: SurfaceId, mut handle: ReadbackHandle, now: Instant) -> bool {
        match handle.poll() {
            ReadbackPoll::Pending => {
                self.state = RangeState::ReadbackPending(handle);
                false
            }
            ReadbackPoll::Failed(e) => {
                self.retries = self.retries.saturating_add(1);
                warn!(
                    surface = %surface,
                    retries = self.retries,
                    error = %e,
                    "Range readback failed, retrying"
                );
                let until = now.checked_add(self.retry_delay).unwrap_or(now);
                self.state = RangeState::RetryWait { until };
                false
            }
            ReadbackPoll::Done(pixels) => {
                self.range = reduce_summary(&pixels);
                debug!(surface = %surface, range = ?self.range, "Range readback complete");
                true
            }
        }
    }
}

/// Aggregate display range across all surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeAggregate {
    range: EventRange,
    dirty: bool,
}

impl RangeAggregate {
    /// Mark the aggregate for recomputation.
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a recomputation is pending.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current aggregate range; `(0, 0)` until a surface reports one.
    pub const fn range(&self) -> EventRange {
        self.range
    }

    /// Recompute from the per-surface ranges if marked dirty.
    ///
    /// The aggregate is the minimum of minimums and the maximum of maximums.
    pub fn recompute<I>(&mut self, ranges: I) -> EventRange
    where
        I: IntoIterator<Item = Option<EventRange>>,
    {
        if self.dirty {
            self.range = ranges
                .into_iter()
                .flatten()
                .reduce(EventRange::union)
                .unwrap_or(EventRange::ZERO);
            self.dirty = false;
        }
        self.range
    }
}
