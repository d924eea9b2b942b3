//! Stat tracker model (C3): in-memory per-interval time series with merge
//! and codec hooks.

use tokio::time::Instant;

use crate::codec::Element;

#[derive(Debug)]
pub enum Error {
    KindMismatch,
    IntervalMismatch,
    InvalidField { field: &'static str, reason: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::KindMismatch => write!(f, "cannot aggregate trackers of different kinds"),
            Error::IntervalMismatch => {
                write!(f, "cannot aggregate trackers with different collection intervals")
            },
            Error::InvalidField { field, reason } => write!(f, "field `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackerKind {
    Integer,
    Long,
    Float,
    IncrementalCounter,
    Time,
    Categorical,
}

impl TrackerKind {
    pub fn to_i64(self) -> i64 {
        match self {
            TrackerKind::Integer => 0,
            TrackerKind::Long => 1,
            TrackerKind::Float => 2,
            TrackerKind::IncrementalCounter => 3,
            TrackerKind::Time => 4,
            TrackerKind::Categorical => 5,
        }
    }

    pub fn from_i64(v: i64) -> Result<Self, Error> {
        Ok(match v {
            0 => TrackerKind::Integer,
            1 => TrackerKind::Long,
            2 => TrackerKind::Float,
            3 => TrackerKind::IncrementalCounter,
            4 => TrackerKind::Time,
            5 => TrackerKind::Categorical,
            other => {
                return Err(Error::InvalidField {
                    field: "trackerKind",
                    reason: format!("unrecognised value {other}"),
                })
            },
        })
    }
}

/// The wire-transferable form of a tracker, used in Job-Completed and
/// Report-Stat. Live trackers are transient; a snapshot is what actually
/// crosses a connection.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerSnapshot {
    pub kind: TrackerKind,
    pub display_name: String,
    pub client_id: String,
    pub thread_id: u32,
    pub interval_sec: u32,
    /// Per-interval bucket values. For `Categorical`, laid out as
    /// `values[interval * categories.len() + category_index]`.
    pub values: Vec<f64>,
    pub counts: Vec<u64>,
    /// Category names, in the order their values appear; empty unless
    /// `kind == Categorical`.
    pub categories: Vec<String>,
}

impl TrackerSnapshot {
    pub fn interval_count(&self) -> usize {
        if self.categories.is_empty() {
            self.values.len()
        } else {
            self.values.len() / self.categories.len().max(1)
        }
    }

    pub fn encode(&self) -> Element {
        use bytes::Bytes;
        Element::Sequence(vec![
            Element::Integer(self.kind.to_i64()),
            Element::OctetString(Bytes::from(self.display_name.clone().into_bytes())),
            Element::OctetString(Bytes::from(self.client_id.clone().into_bytes())),
            Element::Integer(self.thread_id as i64),
            Element::Integer(self.interval_sec as i64),
            Element::Sequence(self.values.iter().map(|v| Element::Integer(v.to_bits() as i64)).collect()),
            Element::Sequence(self.counts.iter().map(|c| Element::Integer(*c as i64)).collect()),
            Element::Sequence(
                self.categories
                    .iter()
                    .map(|c| Element::OctetString(Bytes::from(c.clone().into_bytes())))
                    .collect(),
            ),
        ])
    }

    pub fn decode(el: &Element) -> Result<Self, Error> {
        let children = el.as_sequence().ok_or_else(|| Error::InvalidField {
            field: "statTracker",
            reason: "expected a nested sequence".into(),
        })?;
        if children.len() != 8 {
            return Err(Error::InvalidField {
                field: "statTracker",
                reason: format!("expected 8 children, got {}", children.len()),
            });
        }
        let kind = TrackerKind::from_i64(children[0].as_integer().ok_or_else(err_int("kind"))?)?;
        let display_name = utf8_of(&children[1], "displayName")?;
        let client_id = utf8_of(&children[2], "clientID")?;
        let thread_id = children[3].as_integer().ok_or_else(err_int("threadID"))? as u32;
        let interval_sec = children[4].as_integer().ok_or_else(err_int("intervalSec"))? as u32;
        let values = children[5]
            .as_sequence()
            .ok_or_else(err_seq("values"))?
            .iter()
            .map(|e| e.as_integer().map(|bits| f64::from_bits(bits as u64)).ok_or_else(err_int("values[]")))
            .collect::<Result<Vec<_>, _>>()?;
        let counts = children[6]
            .as_sequence()
            .ok_or_else(err_seq("counts"))?
            .iter()
            .map(|e| e.as_integer().map(|v| v as u64).ok_or_else(err_int("counts[]")))
            .collect::<Result<Vec<_>, _>>()?;
        let categories = children[7]
            .as_sequence()
            .ok_or_else(err_seq("categories"))?
            .iter()
            .map(|e| utf8_of(e, "categories[]"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TrackerSnapshot { kind, display_name, client_id, thread_id, interval_sec, values, counts, categories })
    }

    /// Merges an interval-aligned snapshot of the same kind and display
    /// name, elementwise-summing values and counts.
    pub fn aggregate(&mut self, other: &TrackerSnapshot) -> Result<(), Error> {
        if self.kind != other.kind {
            return Err(Error::KindMismatch);
        }
        if self.interval_sec != other.interval_sec {
            return Err(Error::IntervalMismatch);
        }

        let n = self.values.len().max(other.values.len());
        self.values.resize(n, 0.0);
        let mut other_values = other.values.clone();
        other_values.resize(n, 0.0);
        for (a, b) in self.values.iter_mut().zip(other_values.iter()) {
            *a += b;
        }

        let n = self.counts.len().max(other.counts.len());
        self.counts.resize(n, 0);
        let mut other_counts = other.counts.clone();
        other_counts.resize(n, 0);
        for (a, b) in self.counts.iter_mut().zip(other_counts.iter()) {
            *a += b;
        }

        Ok(())
    }
}

fn utf8_of(el: &Element, field: &'static str) -> Result<String, Error> {
    let bytes = el.as_octet_string().ok_or(Error::InvalidField {
        field,
        reason: "expected an octet string".into(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidField { field, reason: "not valid utf-8".into() })
}

fn err_int(field: &'static str) -> impl Fn() -> Error {
    move || Error::InvalidField { field, reason: "expected an integer".into() }
}

fn err_seq(field: &'static str) -> impl Fn() -> Error {
    move || Error::InvalidField { field, reason: "expected a sequence".into() }
}

/// Common bucket-accumulation logic shared by every concrete tracker.
#[derive(Debug)]
struct IntervalBuckets {
    display_name: String,
    client_id: String,
    thread_id: u32,
    interval_sec: u32,
    start: Option<Instant>,
    active: bool,
    values: Vec<f64>,
    counts: Vec<u64>,
}

impl IntervalBuckets {
    fn new(display_name: impl Into<String>, client_id: impl Into<String>, thread_id: u32, interval_sec: u32) -> Self {
        Self {
            display_name: display_name.into(),
            client_id: client_id.into(),
            thread_id,
            interval_sec,
            start: None,
            active: false,
            values: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn start(&mut self, now: Instant) {
        self.start = Some(now);
        self.active = true;
    }

    fn stop(&mut self, _now: Instant) {
        self.active = false;
    }

    /// `⌊(now − trackerStart) / intervalSec⌋`.
    fn bucket_of(&self, now: Instant) -> Option<usize> {
        let start = self.start?;
        let interval = self.interval_sec.max(1) as f64;
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        Some((elapsed / interval).floor() as usize)
    }

    fn ensure_bucket(&mut self, idx: usize) {
        if self.values.len() <= idx {
            self.values.resize(idx + 1, 0.0);
            self.counts.resize(idx + 1, 0);
        }
    }

    /// Samples added while inactive are dropped.
    fn add_value(&mut self, now: Instant, v: f64) {
        if !self.active {
            return;
        }
        if let Some(idx) = self.bucket_of(now) {
            self.ensure_bucket(idx);
            self.values[idx] += v;
            self.counts[idx] += 1;
        }
    }

    fn set_interval_data(&mut self, values: Vec<f64>, counts: Vec<u64>) {
        self.values = values;
        self.counts = counts;
    }

    fn snapshot(&self, kind: TrackerKind, categories: Vec<String>) -> TrackerSnapshot {
        TrackerSnapshot {
            kind,
            display_name: self.display_name.clone(),
            client_id: self.client_id.clone(),
            thread_id: self.thread_id,
            interval_sec: self.interval_sec,
            values: self.values.clone(),
            counts: self.counts.clone(),
            categories,
        }
    }
}

pub trait StatTracker: Send {
    fn display_name(&self) -> &str;
    fn owner(&self) -> (&str, u32);
    fn interval_sec(&self) -> u32;
    fn start(&mut self, now: Instant);
    fn stop(&mut self, now: Instant);
    fn set_interval_data(&mut self, values: Vec<f64>, counts: Vec<u64>);
    fn aggregate(&mut self, other: &dyn StatTracker) -> Result<(), Error>;
    fn snapshot(&self) -> TrackerSnapshot;

    fn encode(&self) -> Element {
        self.snapshot().encode()
    }
}

macro_rules! numeric_tracker {
    ($name:ident, $kind:expr, $add_fn:ident) => {
        #[derive(Debug)]
        pub struct $name {
            buckets: IntervalBuckets,
        }

        impl $name {
            pub fn new(
                display_name: impl Into<String>,
                client_id: impl Into<String>,
                thread_id: u32,
                interval_sec: u32,
            ) -> Self {
                Self { buckets: IntervalBuckets::new(display_name, client_id, thread_id, interval_sec) }
            }

            pub fn $add_fn(&mut self, now: Instant, value: f64) {
                self.buckets.add_value(now, value);
            }
        }

        impl StatTracker for $name {
            fn display_name(&self) -> &str {
                &self.buckets.display_name
            }

            fn owner(&self) -> (&str, u32) {
                (&self.buckets.client_id, self.buckets.thread_id)
            }

            fn interval_sec(&self) -> u32 {
                self.buckets.interval_sec
            }

            fn start(&mut self, now: Instant) {
                self.buckets.start(now);
            }

            fn stop(&mut self, now: Instant) {
                self.buckets.stop(now);
            }

            fn set_interval_data(&mut self, values: Vec<f64>, counts: Vec<u64>) {
                self.buckets.set_interval_data(values, counts);
            }

            fn aggregate(&mut self, other: &dyn StatTracker) -> Result<(), Error> {
                let mut snap = self.snapshot();
                snap.aggregate(&other.snapshot())?;
                self.buckets.values = snap.values;
                self.buckets.counts = snap.counts;
                Ok(())
            }

            fn snapshot(&self) -> TrackerSnapshot {
                self.buckets.snapshot($kind, Vec::new())
            }
        }
    };
}

numeric_tracker!(IntegerTracker, TrackerKind::Integer, add_value);
numeric_tracker!(LongTracker, TrackerKind::Long, add_value);
numeric_tracker!(FloatTracker, TrackerKind::Float, add_value);
numeric_tracker!(IncrementalCounterTracker, TrackerKind::IncrementalCounter, increment_by);

impl IncrementalCounterTracker {
    pub fn increment(&mut self, now: Instant) {
        self.increment_by(now, 1.0);
    }
}

/// Records elapsed durations as one sample per `start_timer`/`stop_timer`
/// pair.
#[derive(Debug)]
pub struct TimeTracker {
    buckets: IntervalBuckets,
    open: Option<Instant>,
}

impl TimeTracker {
    pub fn new(display_name: impl Into<String>, client_id: impl Into<String>, thread_id: u32, interval_sec: u32) -> Self {
        Self { buckets: IntervalBuckets::new(display_name, client_id, thread_id, interval_sec), open: None }
    }

    pub fn start_timer(&mut self, now: Instant) {
        self.open = Some(now);
    }

    pub fn stop_timer(&mut self, now: Instant) {
        if let Some(opened) = self.open.take() {
            let elapsed = now.saturating_duration_since(opened).as_secs_f64();
            self.buckets.add_value(now, elapsed);
        }
    }
}

impl StatTracker for TimeTracker {
    fn display_name(&self) -> &str {
        &self.buckets.display_name
    }

    fn owner(&self) -> (&str, u32) {
        (&self.buckets.client_id, self.buckets.thread_id)
    }

    fn interval_sec(&self) -> u32 {
        self.buckets.interval_sec
    }

    fn start(&mut self, now: Instant) {
        self.buckets.start(now);
    }

    fn stop(&mut self, now: Instant) {
        self.buckets.stop(now);
    }

    fn set_interval_data(&mut self, values: Vec<f64>, counts: Vec<u64>) {
        self.buckets.set_interval_data(values, counts);
    }

    fn aggregate(&mut self, other: &dyn StatTracker) -> Result<(), Error> {
        let mut snap = self.snapshot();
        snap.aggregate(&other.snapshot())?;
        self.buckets.values = snap.values;
        self.buckets.counts = snap.counts;
        Ok(())
    }

    fn snapshot(&self) -> TrackerSnapshot {
        self.buckets.snapshot(TrackerKind::Time, Vec::new())
    }
}

/// A stacked categorical series: a fixed set of named sub-counters per
/// interval (e.g. a result-code breakdown).
#[derive(Debug)]
pub struct CategoricalTracker {
    buckets: IntervalBuckets,
    categories: Vec<String>,
}

impl CategoricalTracker {
    pub fn new(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: u32,
        interval_sec: u32,
        categories: Vec<String>,
    ) -> Self {
        Self { buckets: IntervalBuckets::new(display_name, client_id, thread_id, interval_sec), categories }
    }

    pub fn increment_category(&mut self, now: Instant, category: &str) {
        let Some(cat_idx) = self.categories.iter().position(|c| c == category) else {
            return;
        };
        if !self.buckets.active {
            return;
        }
        let Some(interval_idx) = self.buckets.bucket_of(now) else {
            return;
        };
        let width = self.categories.len();
        let needed = (interval_idx + 1) * width;
        if self.buckets.values.len() < needed {
            self.buckets.values.resize(needed, 0.0);
            self.buckets.counts.resize(needed, 0);
        }
        let slot = interval_idx * width + cat_idx;
        self.buckets.values[slot] += 1.0;
        self.buckets.counts[slot] += 1;
    }
}

impl StatTracker for CategoricalTracker {
    fn display_name(&self) -> &str {
        &self.buckets.display_name
    }

    fn owner(&self) -> (&str, u32) {
        (&self.buckets.client_id, self.buckets.thread_id)
    }

    fn interval_sec(&self) -> u32 {
        self.buckets.interval_sec
    }

    fn start(&mut self, now: Instant) {
        self.buckets.start(now);
    }

    fn stop(&mut self, now: Instant) {
        self.buckets.stop(now);
    }

    fn set_interval_data(&mut self, values: Vec<f64>, counts: Vec<u64>) {
        self.buckets.set_interval_data(values, counts);
    }

    fn aggregate(&mut self, other: &dyn StatTracker) -> Result<(), Error> {
        let mut snap = self.snapshot();
        snap.aggregate(&other.snapshot())?;
        self.buckets.values = snap.values;
        self.buckets.counts = snap.counts;
        Ok(())
    }

    fn snapshot(&self) -> TrackerSnapshot {
        self.buckets.snapshot(TrackerKind::Categorical, self.categories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn integer_tracker_buckets_by_interval() {
        let mut tr = IntegerTracker::new("ops", "client-1", 0, 1);
        let t0 = Instant::now();
        tr.start(t0);
        tr.add_value(t0, 1.0);
        tr.add_value(t0 + Duration::from_millis(500), 2.0);
        tr.add_value(t0 + Duration::from_secs(1), 3.0);
        let snap = tr.snapshot();
        assert_eq!(snap.values, vec![3.0, 3.0]);
        assert_eq!(snap.counts, vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_outside_start_stop_window_are_dropped() {
        let mut tr = FloatTracker::new("cpu", "client-1", 0, 1);
        let t0 = Instant::now();
        tr.add_value(t0, 99.0); // before start(): dropped
        tr.start(t0);
        tr.add_value(t0, 1.0);
        tr.stop(t0 + Duration::from_millis(10));
        tr.add_value(t0 + Duration::from_secs(5), 2.0); // after stop(): dropped
        assert_eq!(tr.snapshot().values, vec![1.0]);
    }

    #[test]
    fn aggregate_sums_interval_aligned_trackers() {
        let mut a = TrackerSnapshot {
            kind: TrackerKind::Integer,
            display_name: "ops".into(),
            client_id: "c1".into(),
            thread_id: 0,
            interval_sec: 1,
            values: vec![1.0, 2.0, 3.0],
            counts: vec![1, 1, 1],
            categories: vec![],
        };
        let b = TrackerSnapshot { client_id: "c2".into(), values: vec![4.0, 5.0, 6.0], counts: vec![1, 1, 1], ..a.clone() };
        a.aggregate(&b).unwrap();
        assert_eq!(a.values, vec![5.0, 7.0, 9.0]);
        assert_eq!(a.counts, vec![2, 2, 2]);
    }

    #[test]
    fn tracker_snapshot_round_trips_through_codec() {
        let snap = TrackerSnapshot {
            kind: TrackerKind::Categorical,
            display_name: "result-codes".into(),
            client_id: "c1".into(),
            thread_id: 2,
            interval_sec: 5,
            values: vec![1.0, 0.0, 3.0, 2.0],
            counts: vec![1, 0, 3, 2],
            categories: vec!["success".into(), "error".into()],
        };
        let el = snap.encode();
        assert_eq!(TrackerSnapshot::decode(&el).unwrap(), snap);
    }

    #[test]
    fn categorical_tracker_increments_matching_bucket() {
        let mut tr = CategoricalTracker::new(
            "result-codes",
            "c1",
            0,
            1,
            vec!["success".into(), "error".into()],
        );
        let t0 = Instant::now();
        tr.start(t0);
        tr.increment_category(t0, "success");
        tr.increment_category(t0, "success");
        tr.increment_category(t0, "error");
        let snap = tr.snapshot();
        assert_eq!(snap.values, vec![2.0, 1.0]);
    }
}
