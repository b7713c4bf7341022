//! The RemoteSession / Connector capability traits.

use async_trait::async_trait;

use caravan_core::Host;

use crate::error::{ConnectionError, SessionResult};

/// Captured outcome of one remotely executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Output-less result with the given exit code.
    pub fn empty(exit_code: i32) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// One authenticated channel to one worker machine.
///
/// At most one command is in flight per session; file operations are
/// scoped to the working directory set by [`change_dir`]: relative
/// remote paths resolve against it, absolute paths pass through.
///
/// [`change_dir`]: RemoteSession::change_dir
#[async_trait]
pub trait RemoteSession: Send {
    /// The worker this session is connected to.
    fn hostname(&self) -> &str;

    /// Create a remote directory (and missing parents).
    async fn make_dir(&mut self, path: &str) -> SessionResult<()>;

    /// Set the working directory for subsequent relative file operations.
    async fn change_dir(&mut self, path: &str) -> SessionResult<()>;

    /// Upload a local file to the worker.
    async fn upload(&mut self, local_path: &str, remote_path: &str) -> SessionResult<()>;

    /// Download a file from the worker.
    async fn download(&mut self, remote_path: &str, local_path: &str) -> SessionResult<()>;

    /// Run a command and wait for it to terminate, capturing exit code
    /// and full output. A non-zero exit code is not a `SessionError`;
    /// only failure to dispatch the command is.
    async fn execute(&mut self, command: &str) -> SessionResult<CommandOutput>;

    /// Tear down and re-establish the channel with the same host and
    /// credentials, recovering from a broken transport state.
    async fn reconnect(&mut self) -> SessionResult<()>;
}

/// Establishes sessions — injected so transports (and tests) can swap in.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, ConnectionError>;
}
