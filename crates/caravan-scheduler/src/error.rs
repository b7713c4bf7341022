//! Scheduler error taxonomy.
//!
//! Two tiers: [`JobError`] aborts one job and surfaces in that job's
//! outcome slot; [`SchedulerError`] aborts the whole run (pool
//! construction, panicked job task). Retrieval and cleanup failures are
//! neither — they are absorbed inside the executor and only logged.

use thiserror::Error;

use caravan_core::JobResult;
use caravan_session::{ConnectionError, SessionError};

/// A failure that aborts one job while the rest of the run continues.
#[derive(Debug, Error)]
pub enum JobError {
    /// Remote working-directory creation or required-file upload failed.
    #[error("staging failed for job {job_id} on {hostname}: {source}")]
    Staging {
        job_id: String,
        hostname: String,
        #[source]
        source: SessionError,
    },

    /// The command could not be dispatched. Distinct from the command
    /// running and exiting non-zero, which is a successful protocol
    /// outcome carried in [`JobResult::exit_code`].
    #[error("command dispatch failed for job {job_id} on {hostname}: {source}")]
    Execution {
        job_id: String,
        hostname: String,
        #[source]
        source: SessionError,
    },
}

impl JobError {
    /// The job this failure belongs to.
    pub fn job_id(&self) -> &str {
        match self {
            JobError::Staging { job_id, .. } | JobError::Execution { job_id, .. } => job_id,
        }
    }
}

/// A failure that prevents or aborts the run itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A worker session could not be established at startup; the run
    /// does not start on a degraded pool.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The pool was torn down while jobs were still waiting for slots.
    #[error("worker pool closed while jobs were pending")]
    PoolClosed,

    /// A job task panicked or was aborted.
    #[error("job task failed: {0}")]
    Task(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Per-job outcome of a run: the result, or the job-fatal error
/// attached to that job's id.
pub type JobOutcome = Result<JobResult, JobError>;
