//! Run progress tracking.
//!
//! One [`ProgressCounter`] per scheduling run, owned by that run — no
//! process-wide state. Every job completion (success or failure)
//! increments the counter atomically and publishes a [`Progress`]
//! snapshot on a watch channel for telemetry consumers outside the
//! core, alongside a tracing event.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tracing::info;

use caravan_core::Progress;

pub struct ProgressCounter {
    total_jobs: usize,
    finished: AtomicUsize,
    tx: watch::Sender<Progress>,
}

impl ProgressCounter {
    /// Start a fresh count for `total_jobs`, publishing on `tx`.
    pub fn new(total_jobs: usize, tx: watch::Sender<Progress>) -> Self {
        tx.send_replace(Progress {
            total_jobs,
            finished_jobs: 0,
        });
        Self {
            total_jobs,
            finished: AtomicUsize::new(0),
            tx,
        }
    }

    /// Record one completed job and emit the new snapshot.
    pub fn job_finished(&self) -> Progress {
        let finished_jobs = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        let progress = Progress {
            total_jobs: self.total_jobs,
            finished_jobs,
        };
        self.tx.send_replace(progress);
        info!(
            finished = finished_jobs,
            total = self.total_jobs,
            "job finished"
        );
        progress
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            total_jobs: self.total_jobs,
            finished_jobs: self.finished.load(Ordering::SeqCst),
        }
    }
}
