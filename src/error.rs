//! Error taxonomy for the capture engine.
//!
//! Library code returns [`PastaError`] so callers can match on kind; the
//! binary wraps it in `anyhow` at the edges for user-facing context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PastaError {
    #[error("command not found on PATH: {0}")]
    CommandNotFound(String),

    #[error("stdin is not a terminal")]
    NotATty,

    #[error("failed to allocate a pseudo-terminal: {0}")]
    PtyAllocFailed(#[source] nix::Error),

    #[error("{descriptor} does not support terminal operations")]
    UnsupportedTerminal { descriptor: &'static str },

    #[error("I/O failure on {descriptor}: {source}")]
    IoFailure {
        descriptor: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("child exited with status {0}")]
    ChildFailure(i32),

    #[error("session aborted: {0}")]
    SessionAborted(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PastaError>;
