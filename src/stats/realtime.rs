//! Real-time stat reporter adapter.
//!
//! While a tracker is active, each completed interval's summary is pushed
//! here. Delivery is best-effort: a stat channel failure is logged and the
//! job continues regardless.

use tokio::sync::mpsc;
use tracing::warn;

use super::tracker::TrackerSnapshot;

#[derive(Clone, Debug)]
pub struct JobId(pub String);

/// One interval's worth of a single tracker's data, ready to ship as
/// Report-Stat.
#[derive(Clone, Debug)]
pub struct IntervalSample {
    pub job_id: JobId,
    pub snapshot: TrackerSnapshot,
}

pub trait RealTimeStatReporter: Send + Sync {
    fn report(&self, sample: IntervalSample);
}

/// Forwards samples onto an mpsc channel read by the worker's stat-channel
/// task. A full queue drops the sample and logs a warning rather than
/// blocking the job.
pub struct ChannelStatReporter {
    tx: mpsc::Sender<IntervalSample>,
}

impl ChannelStatReporter {
    pub fn new(tx: mpsc::Sender<IntervalSample>) -> Self {
        Self { tx }
    }
}

impl RealTimeStatReporter for ChannelStatReporter {
    fn report(&self, sample: IntervalSample) {
        if let Err(err) = self.tx.try_send(sample) {
            warn!(%err, "dropping real-time stat sample, channel full or closed");
        }
    }
}

/// No-op reporter used when real-time stats are disabled, so tracker code
/// never branches on an `Option<dyn RealTimeStatReporter>`.
pub struct NullStatReporter;

impl RealTimeStatReporter for NullStatReporter {
    fn report(&self, _sample: IntervalSample) {}
}
