//! Shared types used across caravan crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a transport should authenticate against a worker host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credentials {
    /// Password authentication.
    Password(String),
    /// Private-key-file authentication.
    KeyFile(PathBuf),
    /// Defer to the transport's ambient mechanism (agent, host config).
    Default,
}

/// One worker machine and the number of concurrent execution slots it offers.
///
/// Immutable, caller-supplied. The pool opens `cpu_count` independent
/// sessions to this host, one per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    pub username: String,
    /// Concurrent execution slots this host contributes to the pool.
    pub cpu_count: u32,
    pub credentials: Credentials,
}

/// A single file to move between the local machine and a worker.
///
/// Both paths are handed to the transport verbatim — caravan performs no
/// sanitization or escaping anywhere. Relative remote paths resolve
/// against the per-job remote working directory; absolute paths go where
/// they say. Callers own what they put here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransfer {
    pub local_path: String,
    pub remote_path: String,
}

impl FileTransfer {
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }
}

/// One unit of work: a shell command plus its input/output manifests.
///
/// Jobs are independent and unordered with respect to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique within a run; auto-assigned by the config layer when absent.
    pub id: String,
    /// Shell command line, run verbatim under `sh -c` in the job's
    /// remote working directory.
    pub command: String,
    /// Files uploaded into the working directory before execution.
    pub required_files: Vec<FileTransfer>,
    /// Files downloaded after the command completes.
    pub return_files: Vec<FileTransfer>,
}

impl Job {
    /// Create a job with a freshly assigned id and empty manifests.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: crate::id::job_id(),
            command: command.into(),
            required_files: Vec::new(),
            return_files: Vec::new(),
        }
    }

    pub fn with_required_files(mut self, files: Vec<FileTransfer>) -> Self {
        self.required_files = files;
        self
    }

    pub fn with_return_files(mut self, files: Vec<FileTransfer>) -> Self {
        self.return_files = files;
        self
    }
}

/// Outcome of one job's remote execution.
///
/// A non-zero `exit_code` is a successful protocol outcome — the command
/// ran and reported failure; it is not a caravan error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: String,
    pub exit_code: i32,
    /// Full captured standard output, not streamed or truncated.
    pub stdout: Vec<u8>,
    /// Full captured standard error.
    pub stderr: Vec<u8>,
}

impl JobResult {
    /// Whether the remote command itself reported success.
    pub fn command_succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Progress snapshot emitted after each job completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total_jobs: usize,
    /// Monotonically increasing, one increment per completed job
    /// (success or failure).
    pub finished_jobs: usize,
}

impl Progress {
    pub fn done(&self) -> bool {
        self.finished_jobs >= self.total_jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_new_assigns_id() {
        let job = Job::new("echo hi");
        assert!(job.id.starts_with("job-"));
        assert_eq!(job.command, "echo hi");
        assert!(job.required_files.is_empty());
    }

    #[test]
    fn job_ids_are_distinct() {
        let a = Job::new("true");
        let b = Job::new("true");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn nonzero_exit_is_not_success() {
        let result = JobResult {
            job_id: "j1".to_string(),
            exit_code: 2,
            stdout: vec![],
            stderr: b"boom".to_vec(),
        };
        assert!(!result.command_succeeded());
    }

    #[test]
    fn progress_done() {
        assert!(!Progress { total_jobs: 4, finished_jobs: 3 }.done());
        assert!(Progress { total_jobs: 4, finished_jobs: 4 }.done());
    }
}
