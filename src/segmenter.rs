//! The Typescript segmenter (C5): a per-stream handler chain plus the
//! small state machine that carves the observed byte streams into Actions.

use std::collections::HashMap;
use std::time::Instant;

use crate::action::{Action, History};

/// Which stream a chunk of bytes was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Stdin,
    Stdout,
    Stderr,
}

/// A single-method byte→byte transformer. A handler may transform or veto
/// (shorten/empty) the payload it receives.
pub trait Handler: Send + Sync {
    fn apply(&self, bytes: &[u8]) -> Vec<u8>;
}

impl<F> Handler for F
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        self(bytes)
    }
}

/// Registry mapping an [`Event`] to an ordered chain of handlers. Handlers
/// run in registration order; each sees the previous one's output.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Event, Vec<Box<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: Event, handler: Box<dyn Handler>) {
        self.handlers.entry(event).or_default().push(handler);
    }

    fn run(&self, event: Event, bytes: &[u8]) -> Vec<u8> {
        match self.handlers.get(&event) {
            None => bytes.to_vec(),
            Some(chain) => {
                let mut current = bytes.to_vec();
                for handler in chain {
                    current = handler.apply(&current);
                }
                current
            }
        }
    }
}

fn ends_with_line_terminator(buf: &[u8]) -> bool {
    matches!(buf.last(), Some(b'\r') | Some(b'\n'))
}

/// The segmenter's per-spool state: the five roll-over buffers described in
/// the data model (`buf_ps1`, `buf_i`, `buf_o`, `buf_e`, `buf_c`), the
/// current command's start time, and the Action history.
pub struct Segmenter {
    handlers: HandlerRegistry,
    eof_byte: u8,
    buf_ps1: Vec<u8>,
    buf_i: Vec<u8>,
    buf_o: Vec<u8>,
    buf_e: Vec<u8>,
    buf_c: Vec<u8>,
    start_time: Instant,
    history: History,
}

impl Segmenter {
    pub fn new(handlers: HandlerRegistry, eof_byte: u8, histsize: usize) -> Self {
        Self {
            handlers,
            eof_byte,
            buf_ps1: Vec::new(),
            buf_i: Vec::new(),
            buf_o: Vec::new(),
            buf_e: Vec::new(),
            buf_c: Vec::new(),
            start_time: Instant::now(),
            history: History::new(histsize),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Consume the segmenter and take ownership of its Action history.
    pub fn into_history(self) -> History {
        self.history
    }

    /// Run `bytes` through the handler chain for `event`, then advance the
    /// Action state machine. Returns the bytes as they left the last
    /// handler, for the caller to write into its own buffers verbatim.
    pub fn wrap(&mut self, event: Event, bytes: &[u8]) -> Vec<u8> {
        let out = self.handlers.run(event, bytes);
        match event {
            Event::Stdin => self.on_stdin(&out),
            Event::Stdout => self.on_stdout(&out),
            Event::Stderr => self.on_stderr(&out),
        }
        out
    }

    /// Synthetic end-of-session flush: a STDOUT EOF followed by a STDIN
    /// EOF+CRLF, so any in-flight command is closed and emitted. Called
    /// once after the multiplexer's I/O loop exits.
    pub fn flush_eof(&mut self) {
        self.on_stdout(&[]);
        let eof_crlf = [self.eof_byte, b'\r', b'\n'];
        self.on_stdin(&eof_crlf);
    }

    fn on_stdin(&mut self, bytes: &[u8]) {
        // 1. Boundary check: a trailing newline from the *previous* call
        // plus accumulated output means the prior command has finished.
        if ends_with_line_terminator(&self.buf_i) && !self.buf_c.is_empty() {
            self.emit_action();
            self.reset_buffers();
        }

        let eof_crlf = [self.eof_byte, b'\r', b'\n'];
        if bytes == eof_crlf {
            return;
        }

        // 2. Start-of-turn: first bytes of a fresh command mark the clock.
        if self.buf_i.is_empty() && self.buf_ps1.is_empty() && self.buf_c.is_empty() {
            self.start_time = Instant::now();
        }

        // 3. Classify: output-path prompt redraw vs. real input.
        let is_prompt_redraw = self.buf_i.is_empty()
            && !self.buf_c.is_empty()
            && self.buf_c.last() != Some(&self.eof_byte);

        if is_prompt_redraw {
            self.buf_ps1.extend_from_slice(bytes);
        } else {
            self.buf_i.extend_from_slice(bytes);
        }
    }

    fn on_stdout(&mut self, bytes: &[u8]) {
        if self.buf_i.is_empty() && !bytes.is_empty() {
            self.buf_ps1.extend_from_slice(bytes);
        } else {
            self.buf_o.extend_from_slice(bytes);
            self.buf_c.extend_from_slice(bytes);
        }
    }

    fn on_stderr(&mut self, bytes: &[u8]) {
        if self.buf_i.is_empty() {
            self.buf_ps1.extend_from_slice(bytes);
        } else {
            self.buf_e.extend_from_slice(bytes);
            self.buf_c.extend_from_slice(bytes);
        }
    }

    fn emit_action(&mut self) {
        let action = Action::new(
            std::mem::take(&mut self.buf_ps1),
            std::mem::take(&mut self.buf_i),
            std::mem::take(&mut self.buf_o),
            std::mem::take(&mut self.buf_e),
            self.buf_c.clone(),
            self.start_time,
        );
        self.history.push(action);
    }

    fn reset_buffers(&mut self) {
        self.buf_ps1.clear();
        self.buf_i.clear();
        self.buf_o.clear();
        self.buf_e.clear();
        self.buf_c.clear();
    }

    /// True if any buffer still holds unflushed bytes (used to decide
    /// whether the terminal flush needs to synthesise a final Action).
    pub fn has_pending(&self) -> bool {
        !self.buf_ps1.is_empty()
            || !self.buf_i.is_empty()
            || !self.buf_o.is_empty()
            || !self.buf_e.is_empty()
            || !self.buf_c.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(HandlerRegistry::new(), 0x04, 256)
    }

    /// S1: single command, no prompt.
    #[test]
    fn single_command_no_prompt() {
        let mut seg = segmenter();
        seg.wrap(Event::Stdin, b"ls\r");
        seg.wrap(Event::Stdout, b"a b c\r\n");
        seg.flush_eof();

        assert_eq!(seg.history().len(), 1);
        let action = seg.history().iter().next().unwrap();
        assert_eq!(action.command_input, b"ls\r");
        assert_eq!(action.command_output, b"a b c\r\n");
        assert_eq!(action.command_error, b"");
        assert_eq!(action.typescript, b"ls\ra b c\r\n".to_vec());
    }

    /// S2: two commands. The prompt redrawn for the second command arrives
    /// on STDOUT before any further keystroke, so — as documented in
    /// DESIGN.md's Open Questions — it is attributed to the first Action's
    /// output rather than the second Action's prompt; the byte stream is
    /// nonetheless fully accounted for across both typescripts.
    #[test]
    fn two_commands_preserve_the_full_byte_stream() {
        let mut seg = segmenter();
        seg.wrap(Event::Stdout, b"$ ");
        seg.wrap(Event::Stdin, b"echo hi\r");
        seg.wrap(Event::Stdout, b"hi\r\n$ ");
        seg.wrap(Event::Stdin, b"echo bye\r");
        seg.wrap(Event::Stdout, b"bye\r\n");
        seg.flush_eof();

        assert_eq!(seg.history().len(), 2);
        let actions: Vec<_> = seg.history().iter().collect();
        assert_eq!(actions[0].prompt_ps1, b"$ ");
        assert_eq!(actions[0].command_input, b"echo hi\r");
        assert_eq!(actions[1].command_input, b"echo bye\r");
        assert_eq!(actions[1].command_output, b"bye\r\n");

        let total: Vec<u8> = actions
            .iter()
            .flat_map(|a| a.typescript.clone())
            .collect();
        assert_eq!(total, b"$ echo hi\rhi\r\n$ echo bye\rbye\r\n".to_vec());
    }

    /// S3: stderr-only command.
    #[test]
    fn stderr_only_command() {
        let mut seg = segmenter();
        seg.wrap(Event::Stdin, b"false\r");
        seg.wrap(Event::Stderr, b"err\r\n");
        seg.flush_eof();

        assert_eq!(seg.history().len(), 1);
        let action = seg.history().iter().next().unwrap();
        assert_eq!(action.command_error, b"err\r\n");
        assert_eq!(action.command_output, b"");
        assert!(action.typescript.ends_with(b"err\r\n"));
    }

    #[test]
    fn empty_enter_without_output_stays_open() {
        let mut seg = segmenter();
        seg.wrap(Event::Stdin, b"\r");
        seg.wrap(Event::Stdin, b"\r");
        // No output arrived between the two Enters: nothing should have
        // been emitted yet, and the second \r just extends buf_i.
        assert_eq!(seg.history().len(), 0);
    }

    #[test]
    fn no_action_emitted_with_all_buffers_empty() {
        let mut seg = segmenter();
        seg.flush_eof();
        assert_eq!(seg.history().len(), 0);
    }

    #[test]
    fn pre_input_stdout_is_treated_as_prompt() {
        let mut seg = segmenter();
        seg.wrap(Event::Stdout, b"Welcome!\n");
        seg.wrap(Event::Stdin, b"ls\r");
        seg.wrap(Event::Stdout, b"a\r\n");
        seg.flush_eof();

        let action = seg.history().iter().next().unwrap();
        assert_eq!(action.prompt_ps1, b"Welcome!\n");
    }
}
