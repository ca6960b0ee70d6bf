//! Frame scheduling: at most one pending flush at a time.
//!
//! [`FrameScheduler`] holds the pending flag. A [`FrameClock`] supplies the
//! rendering opportunities: [`IntervalClock`] ticks on a timer, while
//! [`ManualClock`] ticks only when its [`FrameTrigger`] fires, which suits
//! tests and hosts with their own render loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Counters describing how token bursts were coalesced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Requests that armed a new frame.
    pub scheduled: u64,
    /// Requests absorbed by an already pending frame.
    pub coalesced: u64,
    /// Frames that arrived with a flush pending.
    pub fired: u64,
    /// Pending frames cancelled before they fired.
    pub cancelled: u64,
}

/// The pending-flush flag for one conversation.
///
/// The flush callback is always the owning aggregator's flush, so the
/// scheduler only tracks whether one is due.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: bool,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a flush at the next frame. Returns `false` if one was already pending.
    pub fn schedule(&mut self) -> bool {
        if self.pending {
            self.stats.coalesced += 1;
            return false;
        }
        self.pending = true;
        self.stats.scheduled += 1;
        true
    }

    /// Drop the pending request, if any. Returns whether one was pending.
    pub fn cancel_pending(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.stats.cancelled += 1;
        true
    }

    /// A frame arrived: clear the flag and report whether a flush is due.
    pub fn fire(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.stats.fired += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

/// A source of rendering opportunities.
#[async_trait]
pub trait FrameClock: Send {
    /// Resolve at the next rendering opportunity. Must be cancel-safe.
    async fn next_frame(&mut self);
}

/// Frames on a fixed timer.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) {
        self.interval.tick().await;
    }
}

/// Frames delivered explicitly through a [`FrameTrigger`].
pub struct ManualClock {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Fires frames for a [`ManualClock`].
#[derive(Clone)]
pub struct FrameTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl FrameTrigger {
    /// Deliver one frame. Returns `false` if the clock is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Create a manually driven clock and its trigger.
pub fn manual_clock() -> (FrameTrigger, ManualClock) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameTrigger { tx }, ManualClock { rx })
}

#[async_trait]
impl FrameClock for ManualClock {
    async fn next_frame(&mut self) {
        if self.rx.recv().await.is_none() {
            // Trigger dropped: no more frames will ever arrive.
            std::future::pending::<()>().await;
        }
    }
}
