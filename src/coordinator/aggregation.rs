//! Start barrier and completion aggregation.

use std::time::Duration;

use crate::message::codes::JobState;
use crate::message::job::JobCompleted;
use crate::stats::TrackerSnapshot;

/// Bound on how long the dispatcher waits for every assigned worker to
/// answer Job-Request with SUCCESS before aborting the job.
pub const DEFAULT_START_BARRIER: Duration = Duration::from_secs(30);

/// Added on top of a job's own `(stopMillis - startMillis)` span when
/// computing how long to wait for a worker's Job-Completed before marking
/// its contribution missing.
pub const COMPLETION_GRACE: Duration = Duration::from_secs(5);

/// `(stopMillis − startMillis) + grace`, the deadline after which a
/// missing Job-Completed marks that worker's contribution as missing.
/// `grace` is normally `COMPLETION_GRACE`, but a deployment can widen it
/// via `CoordinatorConfig::stop_grace_sec`.
pub fn completion_deadline(start_millis: i64, stop_millis: i64, grace: Duration) -> Duration {
    let span_ms = (stop_millis - start_millis).max(0) as u64;
    Duration::from_millis(span_ms) + grace
}

fn merge_into(merged: &mut Vec<TrackerSnapshot>, snap: &TrackerSnapshot) {
    let existing = merged.iter_mut().position(|m| m.display_name == snap.display_name);
    match existing {
        Some(idx) if merged[idx].aggregate(snap).is_ok() => {},
        _ => merged.push(snap.clone()),
    }
}

/// Merges every worker's stat trackers by display name and decides the
/// job's final state: `COMPLETED_WITH_ERRORS` if an assigned worker's
/// Job-Completed never arrived or itself reported an error state,
/// otherwise `COMPLETED_SUCCESSFULLY`.
pub fn aggregate_completions(completions: &[JobCompleted], expected_workers: usize) -> (Vec<TrackerSnapshot>, JobState) {
    let mut merged = Vec::new();
    for completed in completions {
        for snap in &completed.stat_trackers {
            merge_into(&mut merged, snap);
        }
    }

    let any_missing = completions.len() < expected_workers;
    let any_error =
        completions.iter().any(|c| matches!(c.job_state, JobState::StoppedDueToError | JobState::CompletedWithErrors));
    let state = if any_missing || any_error { JobState::CompletedWithErrors } else { JobState::CompletedSuccessfully };
    (merged, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::job::JobId;
    use crate::stats::TrackerKind;

    fn completed(job_state: JobState, values: Vec<f64>) -> JobCompleted {
        JobCompleted::new(
            JobId("J1".into()),
            job_state,
            0,
            1_000,
            vec![TrackerSnapshot {
                kind: TrackerKind::Integer,
                display_name: "ops".into(),
                client_id: "w".into(),
                thread_id: 0,
                interval_sec: 1,
                values,
                counts: vec![1],
                categories: vec![],
            }],
            vec![],
        )
    }

    #[test]
    fn aggregates_two_workers_summing_values_and_counts() {
        let completions = vec![completed(JobState::CompletedSuccessfully, vec![1.0]), completed(JobState::CompletedSuccessfully, vec![4.0])];
        let (merged, state) = aggregate_completions(&completions, 2);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].values, vec![5.0]);
        assert_eq!(state, JobState::CompletedSuccessfully);
    }

    #[test]
    fn missing_worker_marks_job_completed_with_errors() {
        let completions = vec![completed(JobState::CompletedSuccessfully, vec![1.0])];
        let (_, state) = aggregate_completions(&completions, 2);
        assert_eq!(state, JobState::CompletedWithErrors);
    }

    #[test]
    fn worker_reported_error_marks_job_completed_with_errors() {
        let completions = vec![completed(JobState::StoppedDueToError, vec![1.0])];
        let (_, state) = aggregate_completions(&completions, 1);
        assert_eq!(state, JobState::CompletedWithErrors);
    }

    #[test]
    fn completion_deadline_adds_grace_to_job_span() {
        let deadline = completion_deadline(0, 5_000, COMPLETION_GRACE);
        assert_eq!(deadline, Duration::from_secs(5) + COMPLETION_GRACE);
    }
}
