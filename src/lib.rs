//! pasta: record an interactive terminal session as a sequence of shell
//! command Actions.
//!
//! The capture engine wraps a child process in a pseudo-terminal, relays
//! its I/O transparently to the real terminal, and segments the observed
//! byte streams into discrete [`action::Action`] records — one per shell
//! command — without any shell-language parsing.

pub mod action;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod multiplexer;
pub mod pty;
pub mod segmenter;
pub mod spool;
pub mod tty;

pub use action::{Action, History};
pub use error::{PastaError, Result};
