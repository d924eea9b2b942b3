//! Job record: the per-`jobID` lifecycle state a worker tracks from
//! Job-Request through Job-Completed.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::message::job::{JobId, LogMessage};
use crate::stats::TrackerSnapshot;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordState {
    Pending,
    Running,
    Stopping,
    Completed,
}

/// The jobID→record entry a `WorkerRuntime` owns — the only shared
/// mutable structure on each worker.
pub struct JobRecord {
    pub job_id: JobId,
    pub job_class: String,
    pub state: RecordState,
    pub client_number: u32,
    pub threads_per_client: u32,
    pub thread_startup_delay_ms: u32,
    pub collection_interval_sec: u32,
    pub scheduled_start_millis: i64,
    pub scheduled_stop_millis: i64,
    pub duration_sec: u32,
    pub parameters: Vec<(String, String)>,
    pub actual_start_millis: Option<i64>,
    pub actual_stop_millis: Option<i64>,
    /// Cooperative-stop signal, shared by every spawned worker task
    /// a cooperative-stop signal for the tasks to observe.
    pub stop_signal: CancellationToken,
    /// Each worker task returns its final tracker snapshots on completion,
    /// so a `STOP_AND_WAIT` join or a completion join collects results
    /// directly rather than reaching back into shared state.
    pub task_handles: JoinSet<Vec<TrackerSnapshot>>,
    pub log_messages: Vec<LogMessage>,
}

impl JobRecord {
    pub fn new(
        job_id: JobId,
        job_class: String,
        client_number: u32,
        threads_per_client: u32,
        thread_startup_delay_ms: u32,
        collection_interval_sec: u32,
        scheduled_start_millis: i64,
        scheduled_stop_millis: i64,
        duration_sec: u32,
        parameters: Vec<(String, String)>,
    ) -> Self {
        JobRecord {
            job_id,
            job_class,
            state: RecordState::Pending,
            client_number,
            threads_per_client,
            thread_startup_delay_ms,
            collection_interval_sec,
            scheduled_start_millis,
            scheduled_stop_millis,
            duration_sec,
            parameters,
            actual_start_millis: None,
            actual_stop_millis: None,
            stop_signal: CancellationToken::new(),
            task_handles: JoinSet::new(),
            log_messages: Vec::new(),
        }
    }

    pub fn log(&mut self, level: &str, millis: i64, text: impl Into<String>) {
        self.log_messages.push(LogMessage { level: level.into(), millis, text: text.into() });
    }

    /// The stop deadline a watcher task waits on: the earlier of the
    /// scheduled stop and the duration-based stop: a stop watcher fires
    /// at `min(scheduledStopMillis, actualStartMillis + durationSec·1000)`,
    /// with clock skew already folded into the millis fields by the
    /// caller.
    pub fn effective_stop_millis(&self) -> i64 {
        let duration_based = self.actual_start_millis.unwrap_or(self.scheduled_start_millis)
            + self.duration_sec as i64 * 1000;
        self.scheduled_stop_millis.min(duration_based)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JobRecord {
        JobRecord::new(
            JobId("J1".into()),
            "http-get".into(),
            0,
            2,
            0,
            1,
            1_000,
            10_000,
            5,
            vec![],
        )
    }

    #[test]
    fn effective_stop_prefers_earlier_of_schedule_and_duration() {
        let mut rec = sample();
        rec.actual_start_millis = Some(2_000);
        // duration-based: 2000 + 5000 = 7000, scheduled: 10000 -> duration wins
        assert_eq!(rec.effective_stop_millis(), 7_000);
    }

    #[test]
    fn effective_stop_uses_scheduled_start_before_actual_start_is_known() {
        let rec = sample();
        // duration-based: 1000 + 5000 = 6000, scheduled: 10000 -> duration wins
        assert_eq!(rec.effective_stop_millis(), 6_000);
    }

    #[test]
    fn log_messages_accumulate_in_order() {
        let mut rec = sample();
        rec.log("INFO", 100, "started");
        rec.log("WARN", 200, "slow response");
        assert_eq!(rec.log_messages.len(), 2);
        assert_eq!(rec.log_messages[0].text, "started");
    }
}
