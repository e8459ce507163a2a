//! Log capture for TUI mode
//!
//! tracing-subscriber writes into a shared ring of lines instead of stderr,
//! so log output does not tear the ratatui alternate screen. The TUI drains
//! the ring on every refresh.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept before the oldest are dropped.
const CAPACITY: usize = 200;

/// Shared ring of captured log lines.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.trim_end_matches('\r').to_string());
    }

    /// Remove and return everything captured so far, oldest first.
    pub fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }
}

/// Per-event writer handed out to tracing-subscriber.
pub struct LineWriter {
    buffer: LogBuffer,
    partial: String,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.partial.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.partial.find('\n') {
            self.buffer.push(&self.partial[..end]);
            self.partial.drain(..=end);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.partial.is_empty() {
            self.buffer.push(&self.partial);
            self.partial.clear();
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buffer: self.clone(),
            partial: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_writer_splits_lines() {
        let logs = LogBuffer::new();
        let mut writer = logs.make_writer();
        write!(writer, "Session #1 started\r\nICE gathering").unwrap();
        assert_eq!(logs.take(), vec!["Session #1 started"]);

        drop(writer);
        assert_eq!(logs.take(), vec!["ICE gathering"]);
        assert!(logs.take().is_empty());
    }

    #[test]
    fn test_ring_drops_oldest() {
        let logs = LogBuffer::new();
        let mut writer = logs.make_writer();
        for i in 0..250 {
            writeln!(writer, "tick {}", i).unwrap();
        }
        let lines = logs.take();
        assert_eq!(lines.len(), CAPACITY);
        assert_eq!(lines[0], "tick 50");
        assert_eq!(lines[CAPACITY - 1], "tick 249");
    }
}
