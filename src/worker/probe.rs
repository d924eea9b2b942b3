//! Probe and workload traits: leaf collaborators a `JobExecutor` drives
//! through one interval-tracker lifecycle, plus the small illustrative
//! set this repository ships (CPU, memory, null).

use std::collections::HashMap;
use std::fs;

use tokio::time::Instant;

use crate::stats::{FloatTracker, IncrementalCounterTracker, StatTracker, TrackerSnapshot};

/// A named host-resource sampler. `start`/`sample`/`snapshot` mirror the
/// tracker lifecycle a load-client thread drives directly.
pub trait Probe: Send {
    fn name(&self) -> &str;
    fn supported(&self) -> bool;
    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32);
    fn sample(&mut self, now: Instant);
    fn snapshot(&self) -> Vec<TrackerSnapshot>;
}

/// A named synthetic load driver. Load-client jobs spawn one `Workload` per
/// thread; each thread owns its tracker set for the job's lifetime.
pub trait Workload: Send {
    fn name(&self) -> &str;
    fn start(&mut self, client_id: &str, thread_id: u32, now: Instant, interval_sec: u32);
    /// Runs one unit of work, recording into its own trackers. Called in a
    /// tight loop by the owning worker task until the cooperative-stop
    /// signal fires.
    fn run_once(&mut self, now: Instant);
    fn snapshot(&self) -> Vec<TrackerSnapshot>;
}

/// Lets `worker::runtime::WorkerRuntime` drive either kind without knowing
/// which: the same struct drives both the load-client and monitor-client
/// binaries.
pub trait JobExecutor: Send {
    fn class_name(&self) -> &str;
    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32);
    fn tick(&mut self, now: Instant);
    fn snapshot(&self) -> Vec<TrackerSnapshot>;
}

pub struct WorkloadExecutor<W: Workload> {
    workload: W,
    thread_id: u32,
}

impl<W: Workload> WorkloadExecutor<W> {
    pub fn new(workload: W, thread_id: u32) -> Self {
        WorkloadExecutor { workload, thread_id }
    }
}

impl<W: Workload> JobExecutor for WorkloadExecutor<W> {
    fn class_name(&self) -> &str {
        self.workload.name()
    }

    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32) {
        self.workload.start(client_id, self.thread_id, now, interval_sec);
    }

    fn tick(&mut self, now: Instant) {
        self.workload.run_once(now);
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.workload.snapshot()
    }
}

pub struct ProbeExecutor<P: Probe> {
    probe: P,
}

impl<P: Probe> ProbeExecutor<P> {
    pub fn new(probe: P) -> Self {
        ProbeExecutor { probe }
    }
}

impl<P: Probe> JobExecutor for ProbeExecutor<P> {
    fn class_name(&self) -> &str {
        self.probe.name()
    }

    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32) {
        self.probe.start(client_id, now, interval_sec);
    }

    fn tick(&mut self, now: Instant) {
        self.probe.sample(now);
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.probe.snapshot()
    }
}

/// Reads `/proc/stat`'s aggregate `cpu` line and tracks user/system/idle
/// jiffies deltas as one `FloatTracker` per field — parsing stays a pure
/// function from a line to a typed sample.
pub struct CpuProbe {
    trackers: HashMap<&'static str, FloatTracker>,
    prev: Option<CpuJiffies>,
}

#[derive(Clone, Copy, Default)]
struct CpuJiffies {
    user: u64,
    system: u64,
    idle: u64,
}

/// Parses the leading `cpu  <user> <nice> <system> <idle> ...` line from
/// `/proc/stat` text. Pure function, independent of the probe's own state,
/// so it is trivially unit-testable.
fn parse_cpu_line(text: &str) -> Option<CpuJiffies> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let mut fields = line.split_whitespace().skip(1);
    let user: u64 = fields.next()?.parse().ok()?;
    let _nice: u64 = fields.next()?.parse().ok()?;
    let system: u64 = fields.next()?.parse().ok()?;
    let idle: u64 = fields.next()?.parse().ok()?;
    Some(CpuJiffies { user, system, idle })
}

impl CpuProbe {
    pub fn new() -> Self {
        CpuProbe { trackers: HashMap::new(), prev: None }
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for CpuProbe {
    fn name(&self) -> &str {
        "cpu"
    }

    fn supported(&self) -> bool {
        fs::metadata("/proc/stat").is_ok()
    }

    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32) {
        for field in ["user", "system", "idle"] {
            let mut t = FloatTracker::new(format!("cpu.{field}"), client_id, 0, interval_sec);
            t.start(now);
            self.trackers.insert(field, t);
        }
        self.prev = fs::read_to_string("/proc/stat").ok().and_then(|s| parse_cpu_line(&s));
    }

    fn sample(&mut self, now: Instant) {
        let Ok(text) = fs::read_to_string("/proc/stat") else { return };
        let Some(cur) = parse_cpu_line(&text) else { return };
        if let Some(prev) = self.prev {
            if let Some(t) = self.trackers.get_mut("user") {
                t.add_value(now, cur.user.saturating_sub(prev.user) as f64);
            }
            if let Some(t) = self.trackers.get_mut("system") {
                t.add_value(now, cur.system.saturating_sub(prev.system) as f64);
            }
            if let Some(t) = self.trackers.get_mut("idle") {
                t.add_value(now, cur.idle.saturating_sub(prev.idle) as f64);
            }
        }
        self.prev = Some(cur);
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.trackers.values().map(|t| t.snapshot()).collect()
    }
}

/// Reads `MemTotal`/`MemAvailable` from `/proc/meminfo`, tracking the used
/// fraction as a single `FloatTracker`.
pub struct MemoryProbe {
    tracker: Option<FloatTracker>,
}

fn parse_meminfo(text: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = rest.split_whitespace().next()?.parse().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = rest.split_whitespace().next()?.parse().ok();
        }
    }
    Some((total?, available?))
}

impl MemoryProbe {
    pub fn new() -> Self {
        MemoryProbe { tracker: None }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for MemoryProbe {
    fn name(&self) -> &str {
        "memory"
    }

    fn supported(&self) -> bool {
        fs::metadata("/proc/meminfo").is_ok()
    }

    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32) {
        let mut t = FloatTracker::new("memory.used_fraction", client_id, 0, interval_sec);
        t.start(now);
        self.tracker = Some(t);
    }

    fn sample(&mut self, now: Instant) {
        let Ok(text) = fs::read_to_string("/proc/meminfo") else { return };
        let Some((total, available)) = parse_meminfo(&text) else { return };
        if total == 0 {
            return;
        }
        let used_fraction = total.saturating_sub(available) as f64 / total as f64;
        if let Some(t) = self.tracker.as_mut() {
            t.add_value(now, used_fraction);
        }
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.tracker.as_ref().map(|t| vec![t.snapshot()]).unwrap_or_default()
    }
}

/// Always-supported probe that samples a constant, used for tests and for
/// exercising the runtime without a real host.
pub struct NullProbe {
    tracker: Option<FloatTracker>,
}

impl NullProbe {
    pub fn new() -> Self {
        NullProbe { tracker: None }
    }
}

impl Default for NullProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for NullProbe {
    fn name(&self) -> &str {
        "null"
    }

    fn supported(&self) -> bool {
        true
    }

    fn start(&mut self, client_id: &str, now: Instant, interval_sec: u32) {
        let mut t = FloatTracker::new("null.constant", client_id, 0, interval_sec);
        t.start(now);
        self.tracker = Some(t);
    }

    fn sample(&mut self, now: Instant) {
        if let Some(t) = self.tracker.as_mut() {
            t.add_value(now, 1.0);
        }
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.tracker.as_ref().map(|t| vec![t.snapshot()]).unwrap_or_default()
    }
}

/// Synthetic no-op load driver, the load-client analogue of `NullProbe`.
pub struct NullWorkload {
    tracker: Option<IncrementalCounterTracker>,
}

impl NullWorkload {
    pub fn new() -> Self {
        NullWorkload { tracker: None }
    }
}

impl Default for NullWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for NullWorkload {
    fn name(&self) -> &str {
        "null-op"
    }

    fn start(&mut self, client_id: &str, thread_id: u32, now: Instant, interval_sec: u32) {
        let mut t = IncrementalCounterTracker::new("iterations", client_id, thread_id, interval_sec);
        t.start(now);
        self.tracker = Some(t);
    }

    fn run_once(&mut self, now: Instant) {
        if let Some(t) = self.tracker.as_mut() {
            t.increment(now);
        }
    }

    fn snapshot(&self) -> Vec<TrackerSnapshot> {
        self.tracker.as_ref().map(|t| vec![t.snapshot()]).unwrap_or_default()
    }
}

/// Keyed by job class / probe name.
/// `HashMap<&'static str, fn() -> Box<dyn JobExecutor>>` keeps the registry
/// trivially constructible from a static list with no trait-object
/// construction boilerplate per call site.
pub struct Registry {
    factories: HashMap<&'static str, fn() -> Box<dyn JobExecutor>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { factories: HashMap::new() }
    }

    pub fn register(&mut self, class_name: &'static str, factory: fn() -> Box<dyn JobExecutor>) {
        self.factories.insert(class_name, factory);
    }

    pub fn build(&self, class_name: &str) -> Option<Box<dyn JobExecutor>> {
        self.factories.get(class_name).map(|f| f())
    }

    /// A registry with the `null-op` workload pre-registered, for the
    /// load-client binary.
    pub fn load_client_default() -> Self {
        let mut r = Self::new();
        r.register("null-op", || Box::new(WorkloadExecutor::new(NullWorkload::new(), 0)));
        r
    }

    /// A registry with the `null`/`cpu`/`memory` probes pre-registered, for
    /// the monitor-client binary.
    pub fn monitor_client_default() -> Self {
        let mut r = Self::new();
        r.register("null", || Box::new(ProbeExecutor::new(NullProbe::new())));
        r.register("cpu", || Box::new(ProbeExecutor::new(CpuProbe::new())));
        r.register("memory", || Box::new(ProbeExecutor::new(MemoryProbe::new())));
        r
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpu_line_reads_user_system_idle() {
        let text = "cpu  1000 200 300 5000 0 0 0 0 0 0\ncpu0 500 100 150 2500 0 0 0 0 0 0\n";
        let jiffies = parse_cpu_line(text).unwrap();
        assert_eq!(jiffies.user, 1000);
        assert_eq!(jiffies.system, 300);
        assert_eq!(jiffies.idle, 5000);
    }

    #[test]
    fn parse_meminfo_reads_total_and_available() {
        let text = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    8000000 kB\n";
        let (total, available) = parse_meminfo(text).unwrap();
        assert_eq!(total, 16_000_000);
        assert_eq!(available, 8_000_000);
    }

    #[test]
    fn null_probe_is_always_supported() {
        assert!(NullProbe::new().supported());
    }

    #[test]
    fn registry_builds_registered_classes_and_rejects_unknown() {
        let registry = Registry::load_client_default();
        assert!(registry.build("null-op").is_some());
        assert!(registry.build("no-such-class").is_none());
    }

    #[tokio::test]
    async fn null_workload_executor_tracks_iterations() {
        let mut executor = WorkloadExecutor::new(NullWorkload::new(), 0);
        let now = Instant::now();
        executor.start("client-1", now, 1);
        executor.tick(now);
        executor.tick(now);
        let snaps = executor.snapshot();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].display_name, "iterations");
        assert_eq!(snaps[0].counts.iter().sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn null_probe_executor_samples_constant() {
        let mut executor = ProbeExecutor::new(NullProbe::new());
        let now = Instant::now();
        executor.start("client-1", now, 1);
        executor.tick(now);
        let snaps = executor.snapshot();
        assert_eq!(snaps[0].display_name, "null.constant");
        assert_eq!(snaps[0].values, vec![1.0]);
    }
}
