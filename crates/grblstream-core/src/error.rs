//! Error handling for grblstream
//!
//! Two layers can fail:
//! - Protocol errors (buffer accounting, command admission)
//! - Connection errors (channel and worker lifecycle)
//!
//! Malformed inbound lines are not errors; they are logged and dropped by
//! the pump. Device-reported `error:N` responses are ordinary messages.

use thiserror::Error;

/// Protocol error type
///
/// The desynchronization variants mean the client's model of the
/// controller's planner buffer no longer matches the device. Further
/// admission decisions are unsafe until the link sees a fresh boot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A response arrived while no command was in flight
    #[error("Protocol desync: acknowledgment received with no command in flight")]
    UnexpectedAcknowledgment,

    /// Releasing a command would drive planner usage below zero
    #[error("Protocol desync: releasing {released} bytes from planner usage {usage}")]
    BudgetUnderflow {
        /// Tracked usage before the release.
        usage: usize,
        /// Length of the retired command.
        released: usize,
    },

    /// Admission is stopped after a desync until the controller reboots
    #[error("Admission halted after protocol desync")]
    AdmissionHalted,

    /// Command can never fit inside the planner budget
    #[error("Command of {len} bytes can never fit planner capacity {capacity}")]
    CommandTooLong {
        /// Command length including terminator.
        len: usize,
        /// Planner capacity in bytes.
        capacity: usize,
    },

    /// Byte is not part of the realtime command set
    #[error("Byte 0x{0:02X} is not a realtime command")]
    InvalidRealtimeByte(u8),

    /// Command has no content besides its terminator
    #[error("Empty command")]
    EmptyCommand,

    /// Command contains a line break before its terminator
    #[error("Command spans multiple lines")]
    MultiLineCommand,
}

impl ProtocolError {
    /// Check if this error means client and controller lost agreement
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnexpectedAcknowledgment | ProtocolError::BudgetUnderflow { .. }
        )
    }
}

/// Connection error type
///
/// Represents failures of the byte channel and of the worker task
/// driving it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Channel read or write failed
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Worker is already running
    #[error("Link worker already running")]
    AlreadyRunning,

    /// Worker is not running
    #[error("Link worker not running")]
    NotRunning,

    /// `start()` was called outside a tokio runtime
    #[error("No tokio runtime available to spawn the link worker")]
    NoRuntime,

    /// Worker task panicked or was aborted
    #[error("Link worker terminated abnormally: {reason}")]
    WorkerPanicked {
        /// The join failure description.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for grblstream
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a protocol desynchronization
    pub fn is_desync(&self) -> bool {
        matches!(self, Error::Protocol(e) if e.is_desync())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
