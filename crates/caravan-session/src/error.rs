//! Session error types.

use thiserror::Error;

/// A worker session could not be established.
///
/// Fatal to pool construction: the run does not start on a partial pool.
#[derive(Debug, Error)]
#[error("cannot establish session to {hostname}: {reason}")]
pub struct ConnectionError {
    pub hostname: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(hostname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            reason: reason.into(),
        }
    }
}

/// A failure on an established session.
///
/// How fatal this is depends on the protocol phase it occurs in; the
/// executor decides, not the transport.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    #[error("command dispatch failed: {0}")]
    Dispatch(String),

    #[error("session is disconnected")]
    Disconnected,
}

impl SessionError {
    pub fn transfer(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
