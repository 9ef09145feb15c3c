//! In-memory channel for driving the protocol without hardware
//!
//! [`MockChannel`] is cheap to clone and every clone shares the same
//! state: hand one clone to the link and keep another to script inbound
//! lines and inspect what was written.
//!
//! ```
//! use grblstream_communication::{ByteChannel, MockChannel};
//!
//! let mock = MockChannel::new();
//! let mut channel = mock.clone();
//! mock.push_line("ok");
//! assert_eq!(channel.read_line().unwrap(), Some(b"ok".to_vec()));
//! ```

use super::ByteChannel;
use grblstream_core::ThreadSafe;
use std::collections::VecDeque;
use std::io;

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
}

/// A scripted [`ByteChannel`]
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: ThreadSafe<MockState>,
}

impl MockChannel {
    /// Create an empty mock channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text line the controller "sends"
    pub fn push_line(&self, line: &str) {
        self.state.lock().inbound.push_back(line.as_bytes().to_vec());
    }

    /// Queue raw line bytes, e.g. to simulate undecodable input
    pub fn push_raw_line(&self, line: &[u8]) {
        self.state.lock().inbound.push_back(line.to_vec());
    }

    /// Number of inbound lines not yet read
    pub fn pending_lines(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// Every write made so far, one entry per `write_all` call
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Writes rendered as text, useful for queued commands
    pub fn written_text(&self) -> Vec<String> {
        self.state
            .lock()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).to_string())
            .collect()
    }

    /// Drain and return the writes recorded so far
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Make subsequent reads fail with `BrokenPipe`
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Make subsequent writes fail with `BrokenPipe`
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl ByteChannel for MockChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }
        Ok(state.inbound.iter().map(|line| line.len() + 1).sum())
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }
        Ok(state.inbound.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.written.push(data.to_vec());
        Ok(())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let mock = MockChannel::new();
        let mut channel = mock.clone();

        mock.push_line("ok");
        assert_eq!(channel.bytes_available().unwrap(), 3);

        channel.write_all(b"G0X1\n").unwrap();
        assert_eq!(mock.written_text(), vec!["G0X1\n".to_string()]);
        assert_eq!(mock.take_written().len(), 1);
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_injected_failures() {
        let mock = MockChannel::new();
        let mut channel = mock.clone();

        mock.set_fail_writes(true);
        assert!(channel.write_all(b"?").is_err());

        mock.set_fail_reads(true);
        assert!(channel.bytes_available().is_err());
        assert!(channel.read_line().is_err());
    }
}
