// Bounded rolling log shared by the drain task and the status readers.
//
// Every line belongs to a run generation; `reset` starts a new generation and lines pushed
// for any other generation are discarded, so a superseded run can never leak into the
// current view.

use parking_lot::Mutex;
use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 300;

#[derive(Debug, Default)]
struct LogState {
    generation: u64,
    lines: VecDeque<String>,
    evicted: u64,
}

#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    state: Mutex<LogState>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LogState {
                lines: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all lines and accept appends for `generation` only
    pub fn reset(&self, generation: u64) {
        let mut state = self.state.lock();
        state.generation = generation;
        state.lines.clear();
        state.evicted = 0;
    }

    /// Append a line for `generation`. Returns false if the line was stale and dropped.
    pub fn push(&self, generation: u64, line: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        if state.lines.len() == self.capacity {
            state.lines.pop_front();
            state.evicted += 1;
        }
        state.lines.push_back(line.into());
        true
    }

    /// Retained lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.state.lock().lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines evicted from the current generation
    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
