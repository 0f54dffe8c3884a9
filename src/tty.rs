//! TTY primitives (C1): termios attributes, raw mode, echo mode, window
//! size, and the EOF control character.

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc;
use nix::pty::Winsize;
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use nix::unistd::isatty;

use crate::error::{PastaError, Result};

fn borrowed(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: callers only ever pass well-known, process-lifetime descriptors
    // (real stdin, the pty slave/master) that outlive the borrow.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

fn descriptor_name(fd: RawFd) -> &'static str {
    match fd {
        libc::STDIN_FILENO => "stdin",
        libc::STDOUT_FILENO => "stdout",
        libc::STDERR_FILENO => "stderr",
        _ => "fd",
    }
}

fn require_tty(fd: RawFd) -> Result<()> {
    match isatty(fd) {
        Ok(true) => Ok(()),
        _ => Err(PastaError::UnsupportedTerminal {
            descriptor: descriptor_name(fd),
        }),
    }
}

/// Read whether the ECHO local-mode flag is set.
pub fn get_echo(fd: RawFd) -> Result<bool> {
    require_tty(fd)?;
    let attrs = termios::tcgetattr(borrowed(fd)).map_err(|_| PastaError::UnsupportedTerminal {
        descriptor: descriptor_name(fd),
    })?;
    Ok(attrs.local_flags.contains(LocalFlags::ECHO))
}

/// Read-modify-write the ECHO local-mode flag, applied with drain semantics.
pub fn set_echo(fd: RawFd, on: bool) -> Result<()> {
    require_tty(fd)?;
    let mut attrs = termios::tcgetattr(borrowed(fd)).map_err(|_| PastaError::UnsupportedTerminal {
        descriptor: descriptor_name(fd),
    })?;
    attrs.local_flags.set(LocalFlags::ECHO, on);
    termios::tcsetattr(borrowed(fd), SetArg::TCSADRAIN, &attrs).map_err(|_| {
        PastaError::UnsupportedTerminal {
            descriptor: descriptor_name(fd),
        }
    })
}

/// Query the terminal window size.
pub fn get_winsize(fd: RawFd) -> Result<(u16, u16)> {
    let mut ws = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let res = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) };
    if res < 0 {
        return Err(PastaError::IoFailure {
            descriptor: descriptor_name(fd),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok((ws.ws_row, ws.ws_col))
}

/// Apply a window size to the given terminal descriptor.
pub fn set_winsize(fd: RawFd, rows: u16, cols: u16) -> Result<()> {
    let ws = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let res = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &ws) };
    if res < 0 {
        return Err(PastaError::IoFailure {
            descriptor: descriptor_name(fd),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Read the VEOF control character, defaulting to the platform EOF constant.
pub fn eof_byte(fd: RawFd) -> u8 {
    termios::tcgetattr(borrowed(fd))
        .map(|attrs| attrs.control_chars[SpecialCharacterIndices::VEOF as usize])
        .unwrap_or(0x04)
}

/// A snapshot of a terminal's attributes, taken before entering raw mode.
///
/// Every successful [`enter_raw`] must be paired with exactly one restore,
/// even on abnormal exit — `RestoreToken` makes that pairing idempotent and
/// drop-safe.
pub struct RestoreToken {
    fd: RawFd,
    original: Termios,
    restored: AtomicBool,
}

impl RestoreToken {
    /// Restore the attributes captured at `enter_raw` time, with flush
    /// semantics. Safe to call more than once.
    pub fn restore(&self) {
        if self.restored.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = termios::tcsetattr(borrowed(self.fd), SetArg::TCSAFLUSH, &self.original);
    }

    /// The attributes as they were immediately before `enter_raw`.
    pub fn original(&self) -> &Termios {
        &self.original
    }
}

impl Drop for RestoreToken {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Snapshot current attributes and put the terminal into raw mode: no
/// canonical processing, no echo, no signal translation.
pub fn enter_raw(fd: RawFd) -> Result<RestoreToken> {
    require_tty(fd)?;
    let original = termios::tcgetattr(borrowed(fd)).map_err(|_| PastaError::UnsupportedTerminal {
        descriptor: descriptor_name(fd),
    })?;

    let mut raw = original.clone();
    termios::cfmakeraw(&mut raw);
    termios::tcsetattr(borrowed(fd), SetArg::TCSAFLUSH, &raw).map_err(|_| {
        PastaError::UnsupportedTerminal {
            descriptor: descriptor_name(fd),
        }
    })?;

    Ok(RestoreToken {
        fd,
        original,
        restored: AtomicBool::new(false),
    })
}

/// Whether `fd` refers to a terminal at all.
pub fn is_tty(fd: RawFd) -> bool {
    isatty(fd).unwrap_or(false)
}

pub fn real_stdin_fd() -> RawFd {
    std::io::stdin().as_raw_fd()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_byte_defaults_when_not_a_tty() {
        // A regular file descriptor is never a tty; tcgetattr fails and we
        // fall back to the platform EOF constant.
        let tmp = tempfile::tempfile().unwrap();
        let fd = tmp.as_raw_fd();
        assert_eq!(eof_byte(fd), 0x04);
    }

    #[test]
    fn is_tty_false_for_regular_file() {
        let tmp = tempfile::tempfile().unwrap();
        assert!(!is_tty(tmp.as_raw_fd()));
    }

    #[test]
    fn get_echo_fails_on_non_tty() {
        let tmp = tempfile::tempfile().unwrap();
        let err = get_echo(tmp.as_raw_fd());
        assert!(matches!(err, Err(PastaError::UnsupportedTerminal { .. })));
    }
}
