//! config.json / workers.json parsing.
//!
//! The job list and the worker list live in two JSON files. This module
//! parses both and normalizes the entries into scheduling-ready [`Job`]s
//! and [`Host`]s: missing job ids are auto-assigned, `commands` arrays
//! are folded into a single command line, and worker credentials are
//! resolved from the password / private-key fields.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::id;
use crate::types::{Credentials, FileTransfer, Host, Job};

/// Top-level shape of config.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Steps to run on the local machine before any job is submitted.
    #[serde(default)]
    pub local_preparation: Option<LocalPreparation>,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalPreparation {
    /// Local directories to create before the run (e.g. output folders
    /// that return-file downloads land in).
    #[serde(default)]
    pub create_folders: Vec<String>,
}

/// One job as written in config.json.
///
/// Accepts either a single `command` string or a `commands` array;
/// arrays are joined with ` && ` so a failing step stops the chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub commands: Option<Vec<String>>,
    #[serde(default)]
    pub required_files: Vec<FileTransfer>,
    #[serde(default)]
    pub return_files: Vec<FileTransfer>,
    #[serde(default)]
    pub id: Option<String>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Normalize all entries into scheduling-ready jobs.
    pub fn into_jobs(self) -> anyhow::Result<Vec<Job>> {
        self.jobs.into_iter().map(JobEntry::into_job).collect()
    }
}

impl JobEntry {
    fn into_job(self) -> anyhow::Result<Job> {
        let command = match (self.command, self.commands) {
            (Some(command), None) => command,
            (None, Some(commands)) if !commands.is_empty() => commands.join(" && "),
            (Some(_), Some(_)) => bail!("job declares both `command` and `commands`"),
            _ => bail!("job declares no command"),
        };
        Ok(Job {
            id: self.id.unwrap_or_else(id::job_id),
            command,
            required_files: self.required_files,
            return_files: self.return_files,
        })
    }
}

/// One worker as written in workers.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub hostname: String,
    pub username: String,
    #[serde(alias = "no_cpu")]
    pub cpu_count: u32,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
}

impl WorkerEntry {
    fn into_host(self) -> anyhow::Result<Host> {
        let credentials = match (self.password, self.private_key_file) {
            (Some(_), Some(_)) => {
                bail!(
                    "worker {} declares both a password and a private key file",
                    self.hostname
                )
            }
            (Some(password), None) => Credentials::Password(password),
            (None, Some(key_file)) => Credentials::KeyFile(key_file),
            (None, None) => Credentials::Default,
        };
        Ok(Host {
            hostname: self.hostname,
            username: self.username,
            cpu_count: self.cpu_count,
            credentials,
        })
    }
}

/// Load the worker list from a workers.json file.
pub fn load_hosts(path: &Path) -> anyhow::Result<Vec<Host>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading workers file {}", path.display()))?;
    let entries: Vec<WorkerEntry> = serde_json::from_str(&content)
        .with_context(|| format!("parsing workers file {}", path.display()))?;
    entries.into_iter().map(WorkerEntry::into_host).collect()
}

/// Create the local folders the run expects before any job starts.
pub fn prepare_local(config: &RunConfig) -> anyhow::Result<()> {
    if let Some(prep) = &config.local_preparation {
        for folder in &prep.create_folders {
            fs::create_dir_all(folder)
                .with_context(|| format!("creating local folder {folder}"))?;
        }
    }
    Ok(())
}
