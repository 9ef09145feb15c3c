//! Flow control strategies
//!
//! The pump consults a [`FlowControl`] before every transmit attempt and
//! reports every acknowledgment back to it. Two strategies are provided:
//!
//! - [`AcknowledgeGated`]: one command in flight, send the next after `ok`/`error`
//! - [`ByteBudgeted`]: mirror the controller's receive buffer and keep it
//!   as full as the budget allows
//!
//! Admissions and acknowledgments must be reported in the order commands
//! were actually written to the channel.

use crate::communication::Command;
use grblstream_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// GRBL's serial receive buffer size
pub const DEFAULT_PLANNER_CAPACITY: usize = 127;

/// Planner buffer accounting snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlannerUsage {
    /// Bytes written but not yet acknowledged
    pub usage: usize,
    /// Budget size, `None` when the strategy does not count bytes
    pub capacity: Option<usize>,
    /// Commands written but not yet acknowledged
    pub in_flight: usize,
}

impl fmt::Display for PlannerUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.capacity {
            Some(capacity) => write!(f, "{}/{} bytes, {} in flight", self.usage, capacity, self.in_flight),
            None => write!(f, "{} in flight", self.in_flight),
        }
    }
}

/// Admission strategy for queued commands
pub trait FlowControl: Send + fmt::Debug {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Check if `candidate` may be written now
    fn may_admit(&self, candidate: &Command) -> bool;

    /// Record that `command` was written to the channel
    fn on_admitted(&mut self, command: Command);

    /// Record one acknowledgment (`ok` or `error:<code>`)
    ///
    /// Returns the retired command when the strategy tracks them. An
    /// acknowledgment that matches nothing is a desynchronization.
    fn on_response(&mut self) -> Result<Option<Command>, ProtocolError>;

    /// Forget everything in flight, as after a controller reset
    fn reset(&mut self);

    /// Current accounting
    fn usage(&self) -> PlannerUsage;

    /// Longest command this strategy can ever admit
    fn max_command_len(&self) -> Option<usize> {
        None
    }
}

/// Single-outstanding-command discipline
#[derive(Debug, Clone)]
pub struct AcknowledgeGated {
    clear_to_send: bool,
    in_flight: Option<Command>,
}

impl Default for AcknowledgeGated {
    fn default() -> Self {
        Self::new()
    }
}

impl AcknowledgeGated {
    /// Create a gate that is initially open
    pub fn new() -> Self {
        Self {
            clear_to_send: true,
            in_flight: None,
        }
    }

    /// Check if the gate is open
    pub fn is_clear_to_send(&self) -> bool {
        self.clear_to_send
    }
}

impl FlowControl for AcknowledgeGated {
    fn name(&self) -> &'static str {
        "acknowledge-gated"
    }

    fn may_admit(&self, _candidate: &Command) -> bool {
        self.clear_to_send
    }

    fn on_admitted(&mut self, command: Command) {
        self.clear_to_send = false;
        self.in_flight = Some(command);
    }

    fn on_response(&mut self) -> Result<Option<Command>, ProtocolError> {
        // Any acknowledgment opens the gate, including unsolicited ones
        self.clear_to_send = true;
        Ok(self.in_flight.take())
    }

    fn reset(&mut self) {
        self.clear_to_send = true;
        self.in_flight = None;
    }

    fn usage(&self) -> PlannerUsage {
        PlannerUsage {
            usage: self.in_flight.as_ref().map_or(0, Command::len),
            capacity: None,
            in_flight: usize::from(self.in_flight.is_some()),
        }
    }
}

/// Receive-buffer simulation
///
/// Keeps `0 <= usage < capacity`: a command is admitted only when
/// `usage + len < capacity`, leaving at least one byte free.
#[derive(Debug, Clone)]
pub struct ByteBudgeted {
    usage: usize,
    capacity: usize,
    in_flight: VecDeque<Command>,
}

impl Default for ByteBudgeted {
    fn default() -> Self {
        Self::new(DEFAULT_PLANNER_CAPACITY)
    }
}

impl ByteBudgeted {
    /// Create a budget of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            usage: 0,
            capacity,
            in_flight: VecDeque::new(),
        }
    }

    /// Bytes currently accounted to the controller
    pub fn current_usage(&self) -> usize {
        self.usage
    }

    /// Budget size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands awaiting acknowledgment, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &Command> {
        self.in_flight.iter()
    }
}

impl FlowControl for ByteBudgeted {
    fn name(&self) -> &'static str {
        "byte-budgeted"
    }

    fn may_admit(&self, candidate: &Command) -> bool {
        self.usage + candidate.len() < self.capacity
    }

    fn on_admitted(&mut self, command: Command) {
        self.usage += command.len();
        self.in_flight.push_back(command);
    }

    fn on_response(&mut self) -> Result<Option<Command>, ProtocolError> {
        let Some(oldest) = self.in_flight.front() else {
            return Err(ProtocolError::UnexpectedAcknowledgment);
        };

        let released = oldest.len();
        let Some(usage) = self.usage.checked_sub(released) else {
            return Err(ProtocolError::BudgetUnderflow {
                usage: self.usage,
                released,
            });
        };

        self.usage = usage;
        Ok(self.in_flight.pop_front())
    }

    fn reset(&mut self) {
        self.usage = 0;
        self.in_flight.clear();
    }

    fn usage(&self) -> PlannerUsage {
        PlannerUsage {
            usage: self.usage,
            capacity: Some(self.capacity),
            in_flight: self.in_flight.len(),
        }
    }

    fn max_command_len(&self) -> Option<usize> {
        Some(self.capacity.saturating_sub(1))
    }
}

/// Flow control selection, chosen when the link is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FlowStrategy {
    /// [`AcknowledgeGated`]
    AcknowledgeGated,
    /// [`ByteBudgeted`] with the given capacity
    ByteBudgeted {
        /// Budget size in bytes
        capacity: usize,
    },
}

impl Default for FlowStrategy {
    fn default() -> Self {
        Self::ByteBudgeted {
            capacity: DEFAULT_PLANNER_CAPACITY,
        }
    }
}

impl FlowStrategy {
    /// Instantiate the strategy
    pub fn build(&self) -> Box<dyn FlowControl> {
        match *self {
            Self::AcknowledgeGated => Box::new(AcknowledgeGated::new()),
            Self::ByteBudgeted { capacity } => Box::new(ByteBudgeted::new(capacity)),
        }
    }
}
