//! The I/O multiplexer (C4): the fixed-priority select loop that reads real
//! stdin, the pty master, and the child's stdout/stderr, routes each chunk
//! through the segmenter, and writes the results back out.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::pty::{MasterIo, Pty};
use crate::segmenter::{Event, Segmenter};
use crate::tty;

/// Buffering knobs for the multiplexer loop (spec defaults: a 4096-byte
/// high watermark on the real-stdin relay, 1024-byte reads elsewhere).
#[derive(Debug, Clone, Copy)]
pub struct IoOptions {
    pub waterlevel: usize,
    pub readsize: usize,
}

impl Default for IoOptions {
    fn default() -> Self {
        Self {
            waterlevel: 4096,
            readsize: 1024,
        }
    }
}

fn spawn_stdin_relay() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// Run the main relay loop until the child exits or the session is aborted.
/// Returns the child's exit code.
///
/// `echo` is the slave's echo-mode setting (spec §4.4 step 4): when it is
/// on, the kernel's line discipline echoes keystrokes back over the pty
/// master, so that echoed copy is the authoritative STDIN event fed to the
/// segmenter and raw real-stdin bytes are forwarded to the child untouched.
/// When echo is off nothing comes back over the master, so real-stdin bytes
/// themselves are fed to the segmenter directly, and this loop echoes them
/// to the real terminal itself.
pub async fn run(
    pty: &mut Pty,
    segmenter: &mut Segmenter,
    echo: bool,
    echo_to_real_terminal: bool,
    options: IoOptions,
) -> Result<i32> {
    let alive = pty.alive_flag();
    let master = MasterIo::spawn(pty.master_fd(), alive);
    let mut master_rx = Some(master.output_rx);
    let master_tx = master.input_tx;

    let mut stdout: Option<ChildStdout> = Some(
        pty.take_stdout()
            .expect("stdout pipe already taken"),
    );
    let mut stderr: Option<ChildStderr> = Some(
        pty.take_stderr()
            .expect("stderr pipe already taken"),
    );

    let mut stdin_rx = if tty::is_tty(tty::real_stdin_fd()) {
        Some(spawn_stdin_relay())
    } else {
        None
    };

    let mut winch = signal(SignalKind::window_change()).ok();

    let mut real_stdout = tokio::io::stdout();
    let mut real_stderr = tokio::io::stderr();

    let mut buf_i: Vec<u8> = Vec::new();
    let mut cout_buf = vec![0u8; options.readsize];
    let mut cerr_buf = vec![0u8; options.readsize];

    let exit_code = loop {
        tokio::select! {
            biased;

            // STDIN — real user keystrokes, gated by the waterlevel so a
            // full downstream buffer stalls the blocking reader thread
            // transitively (the bounded channel fills, its next send blocks).
            chunk = recv_stdin(&mut stdin_rx), if buf_i.len() < options.waterlevel => {
                match chunk {
                    Some(bytes) => {
                        if echo {
                            // The slave's own echo is authoritative; just forward.
                            buf_i.extend_from_slice(&bytes);
                        } else {
                            let out = segmenter.wrap(Event::Stdin, &bytes);
                            if echo_to_real_terminal {
                                let _ = real_stdout.write_all(&out).await;
                                let _ = real_stdout.flush().await;
                            }
                            buf_i.extend_from_slice(&bytes);
                        }
                    }
                    None => stdin_rx = None,
                }
            }

            // PTM — bytes echoed back by the pty's line discipline. `None`
            // means the reader thread hit EOF/EIO; unregister the stream so
            // this branch falls through to `pending()` instead of staying
            // perpetually ready and starving `pty.wait()` below.
            chunk = recv_master(&mut master_rx) => {
                match chunk {
                    Some(bytes) => {
                        if echo {
                            let out = segmenter.wrap(Event::Stdin, &bytes);
                            if echo_to_real_terminal {
                                let _ = real_stdout.write_all(&out).await;
                                let _ = real_stdout.flush().await;
                            }
                        } else if echo_to_real_terminal {
                            let _ = real_stdout.write_all(&bytes).await;
                            let _ = real_stdout.flush().await;
                        }
                    }
                    None => master_rx = None,
                }
            }

            // COUT — the child's own stdout pipe. `Ok(0)`/`Err` means EOF:
            // unregister the stream (spec §4.4 step 3) rather than re-poll
            // a closed pipe forever.
            result = read_stream(&mut stdout, &mut cout_buf) => {
                match result {
                    Ok(0) | Err(_) => stdout = None,
                    Ok(n) => {
                        let out = segmenter.wrap(Event::Stdout, &cout_buf[..n]);
                        if echo_to_real_terminal {
                            let _ = real_stdout.write_all(&out).await;
                            let _ = real_stdout.flush().await;
                        }
                    }
                }
            }

            // CERR — the child's own stderr pipe. Same EOF handling as COUT.
            result = read_stream(&mut stderr, &mut cerr_buf) => {
                match result {
                    Ok(0) | Err(_) => stderr = None,
                    Ok(n) => {
                        let out = segmenter.wrap(Event::Stderr, &cerr_buf[..n]);
                        if echo_to_real_terminal {
                            let _ = real_stderr.write_all(&out).await;
                            let _ = real_stderr.flush().await;
                        }
                    }
                }
            }

            // PTM write — drain whatever real stdin accumulated into buf_i.
            // `select!` evaluates every enabled branch expression up front,
            // before polling any of them, so this must not mutate `buf_i`
            // here: a higher (biased) branch winning the same poll would
            // otherwise drop the in-flight `Send` future, and `buf_i`'s
            // bytes with it. Send a clone, and only clear `buf_i` once the
            // send has actually resolved.
            result = master_tx.send(buf_i.clone()), if !buf_i.is_empty() => {
                match result {
                    Ok(()) => buf_i.clear(),
                    Err(_) => break pty.wait().await.unwrap_or(128),
                }
            }

            Some(()) = recv_winch(&mut winch) => {
                if let Ok((rows, cols)) = tty::get_winsize(tty::real_stdin_fd()) {
                    let _ = pty.resize(rows, cols);
                }
            }

            code = pty.wait() => {
                break code.unwrap_or(128);
            }
        }
    };

    segmenter.flush_eof();
    Ok(exit_code)
}

async fn recv_stdin(rx: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match rx {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_master(rx: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match rx {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

/// Read from an optionally-present async stream; once the stream has been
/// unregistered (set to `None` after EOF) this just pends forever, so the
/// `select!` branch polling it stops winning and falls out of the loop's
/// hot path.
async fn read_stream<R>(stream: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match stream {
        Some(s) => s.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn recv_winch(sig: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match sig {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}
