//! caravan-session — the remote-shell capability interface.
//!
//! The scheduler core treats a worker purely as an authenticated channel
//! that can run one command at a time and move files in and out. This
//! crate defines that capability as a pair of traits:
//!
//! - [`RemoteSession`] — one live channel to one worker: directory
//!   operations, file transfer, command execution, reconnect.
//! - [`Connector`] — the factory that establishes sessions from a
//!   [`Host`](caravan_core::Host) record.
//!
//! Any transport honoring the semantics (single in-flight command per
//! session, directory-scoped file operations) qualifies. Two
//! implementations ship here:
//!
//! - [`local`] — runs commands as local subprocesses under `sh -c`,
//!   treating the local filesystem as the remote one. Useful on its own
//!   for saturating the local machine's CPUs, and as the reference
//!   implementation for transport authors.
//! - [`testing`] — a fully in-memory simulated host with scripted
//!   command outcomes and injectable failures, used by unit and
//!   integration tests across the workspace.

pub mod error;
pub mod local;
pub mod session;
pub mod testing;

pub use error::{ConnectionError, SessionError, SessionResult};
pub use local::{LocalConnector, LocalSession};
pub use session::{CommandOutput, Connector, RemoteSession};
