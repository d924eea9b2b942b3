//! Worker runtime (C5): the job lifecycle state machine, probe/workload
//! collaborators, and the optional real-time stat channel.

pub mod backoff;
pub mod dispatch;
pub mod job_record;
pub mod probe;
pub mod runtime;

pub use backoff::jittered_delay;
pub use dispatch::{run_control_connection, DEFAULT_READ_TIMEOUT};
pub use job_record::{JobRecord, RecordState};
pub use probe::{JobExecutor, Probe, ProbeExecutor, Registry, Workload, WorkloadExecutor};
pub use runtime::{StatChannel, WorkerRuntime, STOP_GRACE};
