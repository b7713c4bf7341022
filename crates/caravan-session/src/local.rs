//! Local subprocess transport.
//!
//! Treats the local machine as the "remote" worker: commands run under
//! `sh -c` as child processes, uploads and downloads are filesystem
//! copies. One `Host` with `cpu_count = N` yields N independent local
//! sessions, which makes this transport a drop-in way to saturate the
//! local CPUs — and the reference implementation for real transports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use caravan_core::Host;

use crate::error::{ConnectionError, SessionError, SessionResult};
use crate::session::{CommandOutput, Connector, RemoteSession};

/// Connects [`LocalSession`]s. Accepts any `Host` record; the hostname
/// is carried through for logging only.
#[derive(Debug, Default)]
pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, ConnectionError> {
        debug!(hostname = %host.hostname, "opening local session");
        Ok(Box::new(LocalSession {
            hostname: host.hostname.clone(),
            cwd: None,
        }))
    }
}

/// A session whose "remote" side is the local filesystem and shell.
pub struct LocalSession {
    hostname: String,
    cwd: Option<PathBuf>,
}

impl LocalSession {
    /// Relative remote paths resolve against the session working
    /// directory; absolute paths pass through verbatim.
    fn resolve(&self, remote_path: &str) -> PathBuf {
        let path = Path::new(remote_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            match &self.cwd {
                Some(cwd) => cwd.join(path),
                None => path.to_path_buf(),
            }
        }
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn make_dir(&mut self, path: &str) -> SessionResult<()> {
        tokio::fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    async fn change_dir(&mut self, path: &str) -> SessionResult<()> {
        self.cwd = Some(self.resolve(path));
        Ok(())
    }

    async fn upload(&mut self, local_path: &str, remote_path: &str) -> SessionResult<()> {
        let dest = self.resolve(remote_path);
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| SessionError::transfer(local_path, e.to_string()))?;
        Ok(())
    }

    async fn download(&mut self, remote_path: &str, local_path: &str) -> SessionResult<()> {
        let src = self.resolve(remote_path);
        tokio::fs::copy(&src, local_path)
            .await
            .map_err(|e| SessionError::transfer(remote_path, e.to_string()))?;
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> SessionResult<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| SessionError::Dispatch(e.to_string()))?;
        Ok(CommandOutput {
            // Killed-by-signal has no code; report -1 like a shell would
            // report 128+n, minus the guesswork.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn reconnect(&mut self) -> SessionResult<()> {
        // Nothing to re-establish for a process-local transport.
        debug!(hostname = %self.hostname, "local session reconnect is a no-op");
        Ok(())
    }
}
