//! Coordinator: tracks connected workers, assigns and dispatches jobs
//! across them, and aggregates their results.

pub mod aggregation;
pub mod assignment;
pub mod dispatcher;
pub mod stat_intake;

pub use aggregation::{aggregate_completions, completion_deadline, COMPLETION_GRACE, DEFAULT_START_BARRIER};
pub use assignment::{assign_clients, JobRequirements, WorkerDescriptor};
pub use dispatcher::{Dispatcher, JobOutcome, JobSpec, WorkerConnection, DEFAULT_READ_TIMEOUT};
pub use stat_intake::accept_stat_connection;
