//! Cluster scheduler — owns the run lifecycle.
//!
//! Builds a worker pool sized to the hosts' total CPU capacity, submits
//! every job for execution bounded at exactly that capacity, collects
//! outcomes, and tracks progress. Greedy policy throughout: a job waits
//! in `acquire` and takes whichever slot frees up first.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use caravan_core::{Host, Job, Progress};
use caravan_session::Connector;

use crate::error::{JobOutcome, SchedulerError, SchedulerResult};
use crate::executor::JobExecutor;
use crate::pool::WorkerPool;
use crate::progress::ProgressCounter;

pub struct ClusterScheduler {
    connector: Arc<dyn Connector>,
    executor: JobExecutor,
    progress_tx: watch::Sender<Progress>,
}

impl ClusterScheduler {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            connector,
            executor: JobExecutor::new(),
            progress_tx,
        }
    }

    /// Use a different shared temporary-files root on the workers.
    pub fn with_remote_root(mut self, root: impl Into<String>) -> Self {
        self.executor = self.executor.with_remote_root(root);
        self
    }

    /// Observe `{total_jobs, finished_jobs}` snapshots as jobs complete.
    /// Subscribe before calling [`run`](Self::run) to see every update.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Run all jobs concurrently, bounded at pool capacity.
    ///
    /// Every submitted job appears exactly once in the returned
    /// outcomes, identified by its id; order follows completion, not
    /// submission. Per-job failures are entries in the vector, not run
    /// failures — only pool construction (or a panicked job task)
    /// aborts the run.
    pub async fn run(&self, hosts: &[Host], jobs: Vec<Job>) -> SchedulerResult<Vec<JobOutcome>> {
        let (pool, progress) = self.start_run(hosts, &jobs).await?;

        let mut tasks = JoinSet::new();
        for job in jobs {
            let pool = pool.clone();
            let executor = self.executor.clone();
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let outcome = run_one(&pool, &executor, &job).await;
                progress.job_finished();
                outcome
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| SchedulerError::Task(e.to_string()))?;
            outcomes.push(outcome?);
        }
        Ok(outcomes)
    }

    /// Sequential debugging variant: same pool and executor contract,
    /// jobs submitted one at a time. Produces the same outcomes as
    /// [`run`](Self::run), deterministically ordered, only slower.
    pub async fn run_serial(
        &self,
        hosts: &[Host],
        jobs: Vec<Job>,
    ) -> SchedulerResult<Vec<JobOutcome>> {
        let (pool, progress) = self.start_run(hosts, &jobs).await?;

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let outcome = run_one(&pool, &self.executor, job).await;
            progress.job_finished();
            outcomes.push(outcome?);
        }
        Ok(outcomes)
    }

    async fn start_run(
        &self,
        hosts: &[Host],
        jobs: &[Job],
    ) -> SchedulerResult<(WorkerPool, Arc<ProgressCounter>)> {
        let pool = WorkerPool::build(hosts, Arc::clone(&self.connector)).await?;
        info!(
            jobs = jobs.len(),
            hosts = hosts.len(),
            slots = pool.capacity(),
            "starting run"
        );
        let progress = Arc::new(ProgressCounter::new(jobs.len(), self.progress_tx.clone()));
        Ok((pool, progress))
    }
}

/// Acquire a slot, execute, release (structurally, via the guard).
///
/// The inner result is the job's own outcome; the outer error means the
/// run is broken (pool torn down under us).
async fn run_one(
    pool: &WorkerPool,
    executor: &JobExecutor,
    job: &Job,
) -> SchedulerResult<JobOutcome> {
    let mut slot = pool.acquire().await?;
    Ok(executor.execute(&mut slot, job).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use caravan_core::{Credentials, FileTransfer, JobResult};
    use caravan_session::testing::MemoryConnector;

    use crate::error::JobError;

    fn host(hostname: &str, cpu_count: u32) -> Host {
        Host {
            hostname: hostname.to_string(),
            username: "u".to_string(),
            cpu_count,
            credentials: Credentials::Default,
        }
    }

    fn echo_jobs(n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| Job {
                id: format!("j{i}"),
                command: format!("echo j{i}"),
                required_files: vec![],
                return_files: vec![],
            })
            .collect()
    }

    fn by_id(outcomes: Vec<JobOutcome>) -> HashMap<String, JobResult> {
        outcomes
            .into_iter()
            .map(|o| {
                let r = o.unwrap();
                (r.job_id.clone(), r)
            })
            .collect()
    }

    #[tokio::test]
    async fn four_echo_jobs_on_two_slots() {
        let connector = Arc::new(MemoryConnector::new());
        let scheduler = ClusterScheduler::new(connector);
        let progress = scheduler.progress();

        let outcomes = scheduler
            .run(&[host("w1", 2)], echo_jobs(4))
            .await
            .unwrap();

        let results = by_id(outcomes);
        assert_eq!(results.len(), 4);
        for i in 0..4 {
            let r = &results[&format!("j{i}")];
            assert_eq!(r.exit_code, 0);
            let stdout = String::from_utf8(r.stdout.clone()).unwrap();
            assert!(stdout.contains(&format!("j{i}")));
        }
        assert_eq!(
            *progress.borrow(),
            Progress {
                total_jobs: 4,
                finished_jobs: 4
            }
        );
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_capacity() {
        let connector = Arc::new(MemoryConnector::new());
        connector
            .host("w1")
            .set_execute_delay(Duration::from_millis(5));
        let scheduler = ClusterScheduler::new(Arc::clone(&connector) as Arc<dyn Connector>);

        scheduler
            .run(&[host("w1", 2)], echo_jobs(8))
            .await
            .unwrap();

        assert!(connector.max_concurrent_executes() <= 2);
    }

    #[tokio::test]
    async fn staging_failure_does_not_disturb_other_jobs() {
        let connector = Arc::new(MemoryConnector::new());
        let scheduler = ClusterScheduler::new(Arc::clone(&connector) as Arc<dyn Connector>);

        let broken = Job::new("true").with_required_files(vec![FileTransfer::new(
            "does-not-exist.bin",
            "in.bin",
        )]);
        let broken_id = broken.id.clone();
        let healthy = Job::new("echo survived");
        let healthy_id = healthy.id.clone();

        let outcomes = scheduler
            .run(&[host("w1", 1), host("w2", 1)], vec![broken, healthy])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);

        let failed: Vec<&JobError> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], JobError::Staging { .. }));
        assert_eq!(failed[0].job_id(), broken_id);

        let succeeded: Vec<&JobResult> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(succeeded.len(), 1);
        assert_eq!(succeeded[0].job_id, healthy_id);
        assert_eq!(succeeded[0].exit_code, 0);
    }

    #[tokio::test]
    async fn connect_failure_aborts_the_whole_run() {
        let connector = Arc::new(MemoryConnector::new());
        connector.fail_connect("w2");
        let scheduler = ClusterScheduler::new(Arc::clone(&connector) as Arc<dyn Connector>);

        let err = scheduler
            .run(&[host("w1", 1), host("w2", 1)], echo_jobs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Connection(_)));
    }

    #[tokio::test]
    async fn serial_and_concurrent_runs_agree() {
        let concurrent = {
            let connector = Arc::new(MemoryConnector::new());
            let scheduler = ClusterScheduler::new(connector);
            scheduler
                .run(&[host("w1", 2), host("w2", 1)], echo_jobs(6))
                .await
                .unwrap()
        };
        let serial = {
            let connector = Arc::new(MemoryConnector::new());
            let scheduler = ClusterScheduler::new(connector);
            scheduler
                .run_serial(&[host("w1", 2), host("w2", 1)], echo_jobs(6))
                .await
                .unwrap()
        };

        let concurrent = by_id(concurrent);
        let serial = by_id(serial);
        assert_eq!(concurrent.len(), serial.len());
        for (id, result) in &serial {
            assert_eq!(&concurrent[id], result);
        }
    }

    #[tokio::test]
    async fn auto_ids_are_unique_across_a_large_run() {
        let connector = Arc::new(MemoryConnector::new());
        let scheduler = ClusterScheduler::new(connector);

        let jobs: Vec<Job> = (0..1000).map(|_| Job::new("true")).collect();
        let outcomes = scheduler.run(&[host("w1", 8)], jobs).await.unwrap();
        assert_eq!(outcomes.len(), 1000);

        let ids: HashSet<String> = outcomes
            .into_iter()
            .map(|o| o.unwrap().job_id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[tokio::test]
    async fn progress_is_observable_mid_run() {
        let connector = Arc::new(MemoryConnector::new());
        connector
            .host("w1")
            .set_execute_delay(Duration::from_millis(2));
        let scheduler = ClusterScheduler::new(Arc::clone(&connector) as Arc<dyn Connector>);
        let mut progress = scheduler.progress();

        let seen = tokio::spawn(async move {
            let mut snapshots = Vec::new();
            while progress.changed().await.is_ok() {
                let p = *progress.borrow_and_update();
                snapshots.push(p);
                if p.done() && p.total_jobs > 0 {
                    break;
                }
            }
            snapshots
        });

        scheduler.run(&[host("w1", 1)], echo_jobs(3)).await.unwrap();
        let snapshots = seen.await.unwrap();

        // Monotonically increasing, ending at 3/3.
        let finished: Vec<usize> = snapshots.iter().map(|p| p.finished_jobs).collect();
        assert!(finished.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(snapshots.last().unwrap().finished_jobs, 3);
    }
}
