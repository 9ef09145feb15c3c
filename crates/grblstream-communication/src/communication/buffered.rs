//! Outbound command queue
//!
//! Queued commands wait here until the pump's flow controller admits
//! them. The queue is a strict FIFO shared by any number of producers;
//! the pump is its only consumer.
//!
//! The queue is unbounded. Admission is the only backpressure, so a
//! producer that outpaces the controller grows the queue without limit
//! and must rate-limit itself.

use grblstream_core::{thread_safe_deque, ProtocolError, ThreadSafeDeque};
use std::borrow::Cow;
use std::sync::Arc;

/// An immutable, newline-terminated command
///
/// `len()` is the logical length used for planner accounting and
/// includes the terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    bytes: Arc<[u8]>,
}

impl Command {
    /// Build a queued command, normalizing its terminator
    ///
    /// Trailing `\r`/`\n` are stripped and a single `\n` is appended.
    pub fn new(payload: impl AsRef<[u8]>) -> Result<Self, ProtocolError> {
        let mut body = payload.as_ref();
        while let Some((last, rest)) = body.split_last() {
            if *last == b'\n' || *last == b'\r' {
                body = rest;
            } else {
                break;
            }
        }

        if body.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        if body.iter().any(|&b| b == b'\n' || b == b'\r') {
            return Err(ProtocolError::MultiLineCommand);
        }

        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.extend_from_slice(body);
        bytes.push(b'\n');

        Ok(Self {
            bytes: bytes.into(),
        })
    }

    /// The bytes written to the channel, terminator included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes, terminator included
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a command carries at least one byte plus terminator
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Command text without its terminator, for logging
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes[..self.bytes.len() - 1])
    }
}

impl TryFrom<&str> for Command {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Command::new(value)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Multi-producer, single-consumer FIFO of queued commands
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    inner: ThreadSafeDeque<Command>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: thread_safe_deque(),
        }
    }

    /// Append a command; never blocks on admission
    pub fn push(&self, command: Command) {
        self.inner.lock().push_back(command);
    }

    /// Pop the head only if `admit` accepts it
    ///
    /// The check and the removal happen under one lock, so the element
    /// handed to `admit` is the one returned.
    pub fn pop_if(&self, admit: impl FnOnce(&Command) -> bool) -> Option<Command> {
        let mut queue = self.inner.lock();
        match queue.front() {
            Some(head) if admit(head) => queue.pop_front(),
            _ => None,
        }
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
