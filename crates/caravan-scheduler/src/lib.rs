//! caravan-scheduler — worker pool, remote execution protocol, run
//! orchestration.
//!
//! Distributes a list of independent jobs across a fixed pool of remote
//! worker slots with a greedy first-free-slot policy: each job goes to
//! whichever slot frees up soonest, in submission order, with no
//! reordering, priority, or preemption.
//!
//! # Architecture
//!
//! ```text
//! ClusterScheduler
//!   ├── WorkerPool (one slot per declared CPU, semaphore-bounded checkout)
//!   │     └── WorkerSlot = Host + RemoteSession
//!   ├── JobExecutor (per job: stage → execute → retrieve → clean up)
//!   └── ProgressCounter (atomic, observable via watch channel)
//! ```
//!
//! At most `capacity` jobs are in flight at any instant, where
//! `capacity == sum(host.cpu_count)`. Failure isolation is per job, per
//! slot: a failed job never touches another job's slot or result.

pub mod error;
pub mod executor;
pub mod pool;
pub mod progress;
pub mod scheduler;

pub use error::{JobError, JobOutcome, SchedulerError, SchedulerResult};
pub use executor::JobExecutor;
pub use pool::{SlotGuard, WorkerPool, WorkerSlot};
pub use progress::ProgressCounter;
pub use scheduler::ClusterScheduler;
