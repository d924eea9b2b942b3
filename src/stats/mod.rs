//! Stat tracker model (C3).

pub mod realtime;
pub mod tracker;

pub use realtime::{ChannelStatReporter, IntervalSample, NullStatReporter, RealTimeStatReporter};
pub use tracker::{
    CategoricalTracker, Error, FloatTracker, IncrementalCounterTracker, IntegerTracker, LongTracker, StatTracker,
    TimeTracker, TrackerKind, TrackerSnapshot,
};
