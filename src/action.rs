//! The Action record and a bounded history of completed Actions.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

/// One completed shell command capture.
///
/// `typescript` is always the concatenation of `prompt_ps1`, `command_input`,
/// and the interleaved `command_output`/`command_error` bytes in the order
/// they were observed — see [`Action::new`].
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub id: Uuid,
    pub prompt_ps1: Vec<u8>,
    pub command_input: Vec<u8>,
    pub command_output: Vec<u8>,
    pub command_error: Vec<u8>,
    pub typescript: Vec<u8>,
    #[serde(skip)]
    pub time_started: Instant,
    pub time_elapsed: f64,
}

impl Action {
    /// Build an Action from the segmenter's roll-over buffers.
    ///
    /// `combined` is the interleaved output+error byte stream (`buf_c` in
    /// the segmenter) already in observation order.
    pub fn new(
        prompt_ps1: Vec<u8>,
        command_input: Vec<u8>,
        command_output: Vec<u8>,
        command_error: Vec<u8>,
        combined: Vec<u8>,
        time_started: Instant,
    ) -> Self {
        let mut typescript = Vec::with_capacity(
            prompt_ps1.len() + command_input.len() + combined.len(),
        );
        typescript.extend_from_slice(&prompt_ps1);
        typescript.extend_from_slice(&command_input);
        typescript.extend_from_slice(&combined);

        let time_elapsed = time_started.elapsed().as_secs_f64();

        Self {
            id: Uuid::new_v4(),
            prompt_ps1,
            command_input,
            command_output,
            command_error,
            typescript,
            time_started,
            time_elapsed,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.time_elapsed.max(0.0))
    }

    /// A machine-readable summary suitable for a log line or a `--json`
    /// consumer: the Action's identity and timing, without the raw capture
    /// bytes (which may be large and are not always valid UTF-8).
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "command_input": String::from_utf8_lossy(&self.command_input),
            "time_elapsed": self.time_elapsed,
        })
    }
}

/// FIFO-bounded history of completed Actions.
///
/// On overflow the oldest Action is dropped — capacity is fixed for the
/// lifetime of the history (`histsize`).
#[derive(Debug)]
pub struct History {
    capacity: usize,
    actions: VecDeque<Action>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            actions: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, action: Action) {
        if self.actions.len() >= self.capacity {
            self.actions.pop_front();
        }
        self.actions.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_action() -> Action {
        Action::new(vec![], vec![], vec![], vec![], vec![], Instant::now())
    }

    #[test]
    fn typescript_is_prompt_input_combined() {
        let action = Action::new(
            b"$ ".to_vec(),
            b"ls\r".to_vec(),
            b"a b c\r\n".to_vec(),
            b"".to_vec(),
            b"a b c\r\n".to_vec(),
            Instant::now(),
        );
        assert_eq!(action.typescript, b"$ ls\ra b c\r\n".to_vec());
    }

    #[test]
    fn time_elapsed_is_never_negative() {
        let action = blank_action();
        assert!(action.time_elapsed >= 0.0);
    }

    #[test]
    fn history_evicts_oldest_on_overflow() {
        let mut history = History::new(2);
        let a = blank_action();
        let b = blank_action();
        let c = blank_action();
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        history.push(a);
        history.push(b);
        history.push(c);

        assert_eq!(history.len(), 2);
        let ids: Vec<Uuid> = history.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![b_id, c_id]);
        assert!(!ids.contains(&a_id));
    }

    #[test]
    fn history_capacity_is_at_least_one() {
        let history = History::new(0);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn summary_json_carries_id_and_input() {
        let action = Action::new(
            vec![],
            b"ls\r".to_vec(),
            vec![],
            vec![],
            vec![],
            Instant::now(),
        );
        let summary = action.summary_json();
        assert_eq!(summary["id"], action.id.to_string());
        assert_eq!(summary["command_input"], "ls\r");
    }
}
