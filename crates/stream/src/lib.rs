//! Streaming state aggregation for council pipeline runs.
//!
//! Folds the high-frequency event stream of one run into re-renderable
//! conversation snapshots while bounding how often snapshots are produced:
//!
//! 1. **Token events** accumulate in a [`TokenBuffer`] and request a frame
//!    from the [`FrameScheduler`]; at most one flush is ever pending.
//! 2. **Discrete events** first fold any buffered tokens synchronously, then
//!    apply a pure [`transition`] to the last message.
//! 3. The [`ConversationAggregator`] is the sole writer of the snapshot and
//!    publishes each change on a `watch` channel.
//! 4. The [`PipelineDriver`] opens one stream per send and rolls back the
//!    optimistic message pair when the run fails before any stage finishes.

pub mod aggregator;
pub mod buffer;
pub mod driver;
pub mod scheduler;
pub mod transition;

pub use aggregator::{ConversationAggregator, RunOutcome, Snapshot, TransitionResult};
pub use buffer::TokenBuffer;
pub use driver::{ConversationIndex, PipelineDriver};
pub use scheduler::{
    FrameClock, FrameScheduler, FrameTrigger, IntervalClock, ManualClock, SchedulerStats, manual_clock,
};
pub use transition::Effect;
