//! Job executor — the four-phase remote execution protocol.
//!
//! One job, one checked-out slot, four phases against the same session:
//! stage (unique working directory + uploads), execute (`sh -c`, exit
//! code and full output captured), retrieve (downloads, per-file
//! catch-and-continue with eager reconnect), clean up (best-effort
//! `rm -rf`). Staging and dispatch failures are fatal to the job;
//! nothing in phases 3 and 4 is.

use tracing::{debug, error, info, warn};

use caravan_core::{id, Job, JobResult};
use caravan_session::SessionResult;

use crate::error::JobError;
use crate::pool::WorkerSlot;

/// Runs jobs end-to-end on checked-out worker slots.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    /// Shared temporary-files root the per-job working directories are
    /// created under.
    remote_root: String,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self {
            remote_root: "/tmp".to_string(),
        }
    }
}

impl JobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_root(mut self, root: impl Into<String>) -> Self {
        self.remote_root = root.into();
        self
    }

    /// Execute one job on one slot.
    ///
    /// Returns the job's result whenever staging and dispatch succeed,
    /// even if some return files could not be retrieved. Side effects on
    /// the worker are confined to one uniquely named directory under the
    /// remote root.
    pub async fn execute(&self, slot: &mut WorkerSlot, job: &Job) -> Result<JobResult, JobError> {
        let hostname = slot.host.hostname.clone();
        let workdir = format!("{}/caravan_{}", self.remote_root, id::instance_id());

        self.stage(slot, job, &workdir)
            .await
            .map_err(|source| JobError::Staging {
                job_id: job.id.clone(),
                hostname: hostname.clone(),
                source,
            })?;

        info!(
            job_id = %job.id,
            hostname = %hostname,
            workdir = %workdir,
            command = %job.command,
            "executing command"
        );

        // The command string is preserved verbatim inside the shell
        // invocation; quoting is the caller's responsibility.
        let wrapped = format!("cd {workdir} ; sh -c '{}'", job.command);
        let output = slot
            .session
            .execute(&wrapped)
            .await
            .map_err(|source| JobError::Execution {
                job_id: job.id.clone(),
                hostname: hostname.clone(),
                source,
            })?;

        self.retrieve(slot, job, &workdir).await;
        self.cleanup(slot, &workdir).await;

        debug!(
            job_id = %job.id,
            hostname = %hostname,
            exit_code = output.exit_code,
            "job finished"
        );

        Ok(JobResult {
            job_id: job.id.clone(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Phase 1: create the unique working directory and upload every
    /// required file into it.
    async fn stage(&self, slot: &mut WorkerSlot, job: &Job, workdir: &str) -> SessionResult<()> {
        slot.session.make_dir(workdir).await?;
        slot.session.change_dir(workdir).await?;
        for tf in &job.required_files {
            slot.session.upload(&tf.local_path, &tf.remote_path).await?;
        }
        Ok(())
    }

    /// Phase 3: per-file catch-and-continue.
    ///
    /// A failed download is logged and the session is eagerly
    /// reconnected — the transport may be in a broken state — then the
    /// remaining files are still attempted. The job keeps its result
    /// and whatever outputs did land.
    async fn retrieve(&self, slot: &mut WorkerSlot, job: &Job, workdir: &str) {
        for tf in &job.return_files {
            if let Err(e) = slot.session.download(&tf.remote_path, &tf.local_path).await {
                error!(
                    job_id = %job.id,
                    hostname = %slot.host.hostname,
                    workdir = %workdir,
                    remote_path = %tf.remote_path,
                    local_path = %tf.local_path,
                    error = %e,
                    "return-file download failed, reconnecting session"
                );
                if let Err(e) = slot.session.reconnect().await {
                    error!(
                        hostname = %slot.host.hostname,
                        error = %e,
                        "session reconnect failed"
                    );
                }
            }
        }
    }

    /// Phase 4: best-effort removal of the working directory. Failure
    /// leaves residue on the worker but cannot affect the job's result.
    async fn cleanup(&self, slot: &mut WorkerSlot, workdir: &str) {
        if let Err(e) = slot.session.execute(&format!("rm -rf {workdir}")).await {
            warn!(
                hostname = %slot.host.hostname,
                workdir = %workdir,
                error = %e,
                "working directory cleanup failed"
            );
        }
    }
}
