//! In-memory simulated transport for tests.
//!
//! [`MemoryConnector`] hands out [`MemorySession`]s whose "remote" side
//! is an in-memory file tree shared by every session to the same
//! hostname, and whose "local" side is a shared [`MemoryFs`]. Command
//! outcomes can be scripted, individual downloads can be made to fail a
//! set number of times, and connects/reconnects/concurrent executions
//! are counted — everything the scheduler's failure-isolation and
//! capacity tests need to observe.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use caravan_core::Host;

use crate::error::{ConnectionError, SessionError, SessionResult};
use crate::session::{CommandOutput, Connector, RemoteSession};

/// A flat in-memory file store keyed by path string.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFs {
    pub fn put(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), bytes.into());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}

#[derive(Debug)]
struct Script {
    needle: String,
    output: CommandOutput,
    /// Workdir-relative files the scripted command "writes".
    files: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct RemoteState {
    dirs: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
    /// Substring-matched scripted command outcomes; first match wins.
    /// Each carries the files the "command" leaves in the session's
    /// working directory.
    scripts: Vec<Script>,
    /// Remote path → remaining number of downloads that must fail.
    failing_downloads: HashMap<String, usize>,
    /// Commands containing any of these substrings fail to dispatch.
    failing_commands: Vec<String>,
    fail_cleanup: bool,
    commands: Vec<String>,
}

/// The shared state of one simulated worker machine.
///
/// All sessions connected to the same hostname share one `MemoryHost`,
/// like slots on a physical machine share its filesystem.
#[derive(Debug)]
pub struct MemoryHost {
    hostname: String,
    state: Mutex<RemoteState>,
    reconnects: AtomicUsize,
    gauge: Arc<ExecGauge>,
    execute_delay: Mutex<Duration>,
}

impl MemoryHost {
    /// Script the outcome for any command containing `needle`.
    pub fn script(&self, needle: impl Into<String>, output: CommandOutput) {
        self.script_with_files(needle, output, Vec::new());
    }

    /// Script an outcome that also leaves files behind in the working
    /// directory, as a real command would.
    pub fn script_with_files(
        &self,
        needle: impl Into<String>,
        output: CommandOutput,
        files: Vec<(String, Vec<u8>)>,
    ) {
        self.state.lock().unwrap().scripts.push(Script {
            needle: needle.into(),
            output,
            files,
        });
    }

    /// Make the next `times` downloads of `remote_path` fail. Matches
    /// the full resolved path or its final component, so tests can name
    /// a workdir-relative file without knowing the random workdir.
    pub fn fail_download(&self, remote_path: impl Into<String>, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failing_downloads
            .insert(remote_path.into(), times);
    }

    /// Make dispatch of any command containing `needle` fail.
    pub fn fail_execute(&self, needle: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failing_commands
            .push(needle.into());
    }

    /// Make working-directory removal fail.
    pub fn fail_cleanup(&self) {
        self.state.lock().unwrap().fail_cleanup = true;
    }

    /// Add artificial latency to every execute, so tests can observe
    /// overlap.
    pub fn set_execute_delay(&self, delay: Duration) {
        *self.execute_delay.lock().unwrap() = delay;
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Every command dispatched to this host, in order.
    pub fn commands_run(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn dir_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    /// Plant a file on the simulated machine, as if a command had
    /// written it.
    pub fn put_file(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), bytes.into());
    }

    /// Directories created over the host's lifetime that still exist.
    pub fn dirs(&self) -> Vec<String> {
        self.state.lock().unwrap().dirs.iter().cloned().collect()
    }
}

/// Tracks how many executes are in flight across a whole connector.
#[derive(Debug, Default)]
struct ExecGauge {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ExecGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connector for the in-memory transport.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    local: Arc<MemoryFs>,
    hosts: Mutex<HashMap<String, Arc<MemoryHost>>>,
    failing_hosts: Mutex<HashSet<String>>,
    connects: AtomicUsize,
    gauge: Arc<ExecGauge>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared "local machine" file store.
    pub fn local(&self) -> Arc<MemoryFs> {
        Arc::clone(&self.local)
    }

    /// The simulated machine behind `hostname`, created on first use.
    pub fn host(&self, hostname: &str) -> Arc<MemoryHost> {
        let mut hosts = self.hosts.lock().unwrap();
        Arc::clone(hosts.entry(hostname.to_string()).or_insert_with(|| {
            Arc::new(MemoryHost {
                hostname: hostname.to_string(),
                state: Mutex::default(),
                reconnects: AtomicUsize::new(0),
                gauge: Arc::clone(&self.gauge),
                execute_delay: Mutex::new(Duration::ZERO),
            })
        }))
    }

    /// Make every connect to `hostname` fail.
    pub fn fail_connect(&self, hostname: impl Into<String>) {
        self.failing_hosts.lock().unwrap().insert(hostname.into());
    }

    /// Successful session establishments so far (reconnects excluded).
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    /// Highest number of commands observed in flight at once, across
    /// all hosts of this connector.
    pub fn max_concurrent_executes(&self) -> usize {
        self.gauge.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, ConnectionError> {
        if self.failing_hosts.lock().unwrap().contains(&host.hostname) {
            return Err(ConnectionError::new(&host.hostname, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemorySession {
            host: self.host(&host.hostname),
            local: self.local(),
            cwd: None,
            connected: true,
        }))
    }
}

/// One simulated channel to a [`MemoryHost`].
pub struct MemorySession {
    host: Arc<MemoryHost>,
    local: Arc<MemoryFs>,
    cwd: Option<String>,
    connected: bool,
}

impl MemorySession {
    fn resolve(&self, remote_path: &str) -> String {
        if remote_path.starts_with('/') {
            return remote_path.to_string();
        }
        match &self.cwd {
            Some(cwd) => format!("{cwd}/{remote_path}"),
            None => remote_path.to_string(),
        }
    }
}

/// Extract the user command from the executor's
/// `cd <dir> ; sh -c '<command>'` wrapping.
fn inner_command(command: &str) -> &str {
    match command.find("sh -c '") {
        Some(idx) => {
            let rest = &command[idx + "sh -c '".len()..];
            rest.strip_suffix('\'').unwrap_or(rest)
        }
        None => command,
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    fn hostname(&self) -> &str {
        &self.host.hostname
    }

    async fn make_dir(&mut self, path: &str) -> SessionResult<()> {
        if !self.connected {
            return Err(SessionError::Disconnected);
        }
        let resolved = self.resolve(path);
        self.host.state.lock().unwrap().dirs.insert(resolved);
        Ok(())
    }

    async fn change_dir(&mut self, path: &str) -> SessionResult<()> {
        self.cwd = Some(self.resolve(path));
        Ok(())
    }

    async fn upload(&mut self, local_path: &str, remote_path: &str) -> SessionResult<()> {
        if !self.connected {
            return Err(SessionError::Disconnected);
        }
        let bytes = self
            .local
            .get(local_path)
            .ok_or_else(|| SessionError::transfer(local_path, "no such local file"))?;
        let dest = self.resolve(remote_path);
        self.host.state.lock().unwrap().files.insert(dest, bytes);
        Ok(())
    }

    async fn download(&mut self, remote_path: &str, local_path: &str) -> SessionResult<()> {
        if !self.connected {
            return Err(SessionError::Disconnected);
        }
        let resolved = self.resolve(remote_path);
        {
            let mut state = self.host.state.lock().unwrap();
            let matched = state
                .failing_downloads
                .iter()
                .find(|(key, remaining)| {
                    **remaining > 0
                        && (resolved == **key || resolved.ends_with(&format!("/{key}")))
                })
                .map(|(key, _)| key.clone());
            if let Some(key) = matched {
                if let Some(remaining) = state.failing_downloads.get_mut(&key) {
                    *remaining -= 1;
                }
                // A failed transfer leaves the channel unusable until
                // the session reconnects.
                self.connected = false;
                return Err(SessionError::transfer(&resolved, "simulated transport hiccup"));
            }
        }
        let bytes = self
            .host
            .state
            .lock()
            .unwrap()
            .files
            .get(&resolved)
            .cloned()
            .ok_or_else(|| SessionError::transfer(&resolved, "no such remote file"))?;
        self.local.put(local_path, bytes);
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> SessionResult<CommandOutput> {
        if !self.connected {
            return Err(SessionError::Disconnected);
        }
        let delay = *self.host.execute_delay.lock().unwrap();

        self.host.gauge.enter();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.execute_inner(command);
        self.host.gauge.exit();
        result
    }

    async fn reconnect(&mut self) -> SessionResult<()> {
        self.host.reconnects.fetch_add(1, Ordering::Relaxed);
        self.connected = true;
        Ok(())
    }
}

impl MemorySession {
    fn execute_inner(&mut self, command: &str) -> SessionResult<CommandOutput> {
        let mut state = self.host.state.lock().unwrap();
        state.commands.push(command.to_string());

        // Working-directory cleanup.
        if let Some(target) = command.strip_prefix("rm -rf ") {
            if state.fail_cleanup {
                return Err(SessionError::Dispatch(
                    "simulated cleanup failure".to_string(),
                ));
            }
            let target = target.trim().to_string();
            state.dirs.remove(&target);
            let prefix = format!("{target}/");
            state.files.retain(|path, _| !path.starts_with(&prefix));
            return Ok(CommandOutput::empty(0));
        }

        if state
            .failing_commands
            .iter()
            .any(|needle| command.contains(needle.as_str()))
        {
            return Err(SessionError::Dispatch(
                "simulated dispatch failure".to_string(),
            ));
        }

        let inner = inner_command(command);

        let cwd = self.cwd.clone();
        if let Some(script) = state
            .scripts
            .iter()
            .find(|s| command.contains(s.needle.as_str()))
        {
            let output = script.output.clone();
            let files: Vec<(String, Vec<u8>)> = script.files.clone();
            for (path, bytes) in files {
                let resolved = match (&cwd, path.starts_with('/')) {
                    (Some(cwd), false) => format!("{cwd}/{path}"),
                    _ => path,
                };
                state.files.insert(resolved, bytes);
            }
            return Ok(output);
        }

        // Unscripted conveniences so simple jobs just work.
        if let Some(text) = inner.strip_prefix("echo ") {
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: format!("{text}\n").into_bytes(),
                stderr: Vec::new(),
            });
        }
        if let Some(code) = inner.strip_prefix("exit ") {
            let exit_code = code.trim().parse().unwrap_or(1);
            return Ok(CommandOutput::empty(exit_code));
        }

        Ok(CommandOutput::empty(0))
    }
}
