//! The PTY pair (C2): a pseudo-terminal whose slave becomes the child's
//! controlling terminal and stdin, while the child's stdout/stderr are kept
//! as separate pipes so the multiplexer can tell the three streams apart.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{PastaError, Result};

fn winsize_of(rows: u16, cols: u16) -> Winsize {
    Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(PastaError::PtyAllocFailed)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(PastaError::PtyAllocFailed)?;
    Ok(())
}

/// A spawned child wired to a pseudo-terminal: stdin is the pty slave (so
/// `isatty()`, job control, and line discipline all behave normally from the
/// child's point of view), stdout/stderr are ordinary pipes.
pub struct Pty {
    child: Child,
    master: OwnedFd,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pid: Pid,
    alive: Arc<AtomicBool>,
}

impl Pty {
    /// Allocate a pty pair and spawn `argv[0]` with `argv[1..]` as arguments,
    /// connecting stdin to the slave and leaving stdout/stderr as pipes.
    pub fn spawn(
        argv: &[String],
        env: &[(String, String)],
        cwd: Option<&std::path::Path>,
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let program = argv
            .first()
            .ok_or_else(|| PastaError::CommandNotFound(String::new()))?;

        let winsize = winsize_of(rows, cols);
        let OpenptyResult { master, slave } =
            openpty(&winsize, None).map_err(PastaError::PtyAllocFailed)?;

        let slave_fd = slave.as_raw_fd();
        let master_fd = master.as_raw_fd();

        let mut command = Command::new(program);
        command.args(&argv[1..]);
        command.envs(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        // SAFETY: stdin takes ownership of `slave_fd` for the child's duration;
        // we only read it back out via `pre_exec`, which runs in the forked
        // child before exec and touches no Rust-side state but raw fds.
        command.stdin(unsafe { Stdio::from_raw_fd(slave_fd) });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        // SAFETY: `pre_exec` runs after fork, before exec, in the child. It
        // only calls async-signal-safe libc functions (setsid, ioctl, close,
        // signal) and touches no Rust allocator state.
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                libc::close(slave_fd);
                libc::close(master_fd);
                libc::signal(libc::SIGCHLD, libc::SIG_DFL);
                libc::signal(libc::SIGHUP, libc::SIG_DFL);
                libc::signal(libc::SIGINT, libc::SIG_DFL);
                libc::signal(libc::SIGQUIT, libc::SIG_DFL);
                libc::signal(libc::SIGTERM, libc::SIG_DFL);
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|_| PastaError::CommandNotFound(program.clone()))?;

        // The parent's copy of the slave fd was moved into `Stdio`, which
        // `Command` closes after fork; our own `slave` OwnedFd still refers
        // to the same descriptor number and must be forgotten, not closed
        // again, now that the kernel has reused/closed it in the child.
        std::mem::forget(slave);

        set_nonblocking(master_fd)?;

        let pid = Pid::from_raw(child.id().unwrap_or(0) as i32);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        info!(pid = pid.as_raw(), program = %program, "pasta.pty spawned child");

        Ok(Self {
            child,
            master,
            stdout,
            stderr,
            pid,
            alive: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    pub fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// Tell the kernel the terminal changed size (SIGWINCH bridge, C3).
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let ws = winsize_of(rows, cols);
        let res = unsafe { libc::ioctl(self.master_fd(), libc::TIOCSWINSZ, &ws) };
        if res < 0 {
            return Err(PastaError::IoFailure {
                descriptor: "pty-master",
                source: std::io::Error::last_os_error(),
            });
        }
        debug!(rows, cols, "pasta.pty resized");
        Ok(())
    }

    /// Wait for the child, returning its exit code.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await.map_err(|e| PastaError::IoFailure {
            descriptor: "child",
            source: e,
        })?;
        self.alive.store(false, Ordering::SeqCst);
        Ok(status.code().unwrap_or(128))
    }

    /// SIGTERM the child, escalating to SIGKILL after `grace` if it hasn't
    /// exited by then, then reap it. Safe to call more than once.
    pub async fn shutdown(&mut self, grace: Duration) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = signal::kill(self.pid, Signal::SIGTERM);

        let grace = tokio::time::timeout(grace, self.child.wait()).await;
        if grace.is_err() {
            warn!(pid = self.pid.as_raw(), "pasta.pty escalating to SIGKILL");
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = self.child.wait().await;
        }
    }
}

/// Bridges between the synchronous PTY master fd and async callers. The
/// master isn't reliably pollable through tokio's reactor on every platform,
/// so reads and writes happen on dedicated blocking threads connected by
/// small bounded channels — the same shape the teacher uses for its
/// PTY master bridge, just narrowed to the master fd alone (stdout/stderr
/// now travel over ordinary, independently-pollable pipes).
pub struct MasterIo {
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub input_tx: mpsc::Sender<Vec<u8>>,
}

impl MasterIo {
    pub fn spawn(master_fd: RawFd, alive: Arc<AtomicBool>) -> Self {
        let (output_tx, output_rx) = mpsc::channel(8);
        let (input_tx, input_rx) = mpsc::channel(1);

        let reader_alive = Arc::clone(&alive);
        std::thread::spawn(move || Self::reader_thread(master_fd, reader_alive, output_tx));

        let writer_alive = alive;
        std::thread::spawn(move || Self::writer_thread(master_fd, writer_alive, input_rx));

        Self {
            output_rx,
            input_tx,
        }
    }

    fn reader_thread(fd: RawFd, alive: Arc<AtomicBool>, tx: mpsc::Sender<Vec<u8>>) {
        let mut buf = [0u8; 4096];
        while alive.load(Ordering::SeqCst) {
            match nix::unistd::read(fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(nix::errno::Errno::EAGAIN) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(nix::errno::Errno::EIO) => break,
                Err(e) => {
                    warn!(error = %e, "pasta.pty master read error");
                    break;
                }
            }
        }
        debug!("pasta.pty master reader thread exiting");
    }

    fn writer_thread(fd: RawFd, alive: Arc<AtomicBool>, mut rx: mpsc::Receiver<Vec<u8>>) {
        while let Some(data) = rx.blocking_recv() {
            if !alive.load(Ordering::SeqCst) {
                break;
            }
            let mut written = 0;
            while written < data.len() {
                let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
                match nix::unistd::write(borrowed, &data[written..]) {
                    Ok(n) => written += n,
                    Err(nix::errno::Errno::EAGAIN) => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        warn!(error = %e, "pasta.pty master write error");
                        break;
                    }
                }
            }
        }
        debug!("pasta.pty master writer thread exiting");
    }
}
