//! The spool supervisor (C6): the scoped operation that brackets an entire
//! capture — allocate the pty, spawn the child, run the I/O loop, and tear
//! everything down again, in that order, on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::action::History;
use crate::error::{PastaError, Result};
use crate::multiplexer::{self, IoOptions};
use crate::pty::Pty;
use crate::segmenter::{HandlerRegistry, Segmenter};
use crate::tty;

/// Knobs for a single spool, with the defaults spec'd for the supervisor.
pub struct Options {
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub echo: bool,
    pub timeout: Duration,
    pub bufsize: usize,
    pub waterlevel: usize,
    pub readsize: usize,
    pub histsize: usize,
    pub handlers: HandlerRegistry,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            env: std::env::vars().collect(),
            cwd: None,
            echo: true,
            timeout: Duration::from_secs_f64(1.0),
            bufsize: 8192,
            waterlevel: 4096,
            readsize: 1024,
            histsize: 256,
            handlers: HandlerRegistry::new(),
        }
    }
}

/// What a spool produced: the child's exit code and the completed Action
/// history.
pub struct Outcome {
    pub exit_code: i32,
    pub history: History,
}

fn resolve_command(cmd: &[String]) -> Result<Vec<String>> {
    let program = cmd
        .first()
        .ok_or_else(|| PastaError::CommandNotFound(String::new()))?;

    if program.contains('/') {
        if std::path::Path::new(program).is_file() {
            return Ok(cmd.to_vec());
        }
        return Err(PastaError::CommandNotFound(program.clone()));
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    let found = std::env::split_paths(&path).any(|dir| dir.join(program).is_file());
    if found {
        Ok(cmd.to_vec())
    } else {
        Err(PastaError::CommandNotFound(program.clone()))
    }
}

/// Run `cmd` inside a fresh pty, capturing the session as a sequence of
/// Actions. Brackets the whole capture: PTY allocation, raw mode, the I/O
/// loop, and teardown all happen here, in order, on every exit path —
/// including early return via `?`, since `RestoreToken`'s `Drop` guarantees
/// the terminal is restored regardless of how this function returns.
pub async fn spool(cmd: &[String], options: Options) -> Result<Outcome> {
    let resolved = resolve_command(cmd)?;

    if options.bufsize < 1 {
        return Err(PastaError::InvalidConfig("bufsize must be >= 1".into()));
    }
    let stdin_fd = tty::real_stdin_fd();
    if !tty::is_tty(stdin_fd) {
        return Err(PastaError::NotATty);
    }

    info!(target: "pasta.pty", argv = ?resolved, "spooling command");

    let (rows, cols) = tty::get_winsize(stdin_fd).unwrap_or((24, 80));

    let mut pty = Pty::spawn(
        &resolved,
        &options.env,
        options.cwd.as_deref(),
        rows,
        cols,
    )?;

    tty::set_echo(pty.master_fd(), options.echo)?;

    let eof_byte = tty::eof_byte(pty.master_fd());
    let mut segmenter = Segmenter::new(options.handlers, eof_byte, options.histsize);

    let restore = tty::enter_raw(stdin_fd)?;

    let io_options = IoOptions {
        waterlevel: options.waterlevel,
        readsize: options.readsize,
    };
    let result = multiplexer::run(&mut pty, &mut segmenter, options.echo, true, io_options).await;

    // Teardown order per spec §5 Cancellation: wait-or-kill the child first,
    // then restore real stdin, then close the PTY pair (on `pty`'s own drop)
    // and the prior SIGWINCH handler (on `winch`'s drop inside the loop).
    pty.shutdown(options.timeout).await;
    restore.restore();

    let exit_code = result?;
    Ok(Outcome {
        exit_code,
        history: segmenter.into_history(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_command_rejects_empty_argv() {
        let err = resolve_command(&[]).unwrap_err();
        assert!(matches!(err, PastaError::CommandNotFound(_)));
    }

    #[test]
    fn resolve_command_rejects_missing_binary() {
        let err = resolve_command(&["definitely-not-a-real-binary-xyz".to_string()]).unwrap_err();
        assert!(matches!(err, PastaError::CommandNotFound(_)));
    }

    #[test]
    fn resolve_command_finds_true_on_path() {
        let resolved = resolve_command(&["true".to_string()]).unwrap();
        assert_eq!(resolved, vec!["true".to_string()]);
    }
}
