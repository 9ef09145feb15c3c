//! Byte channel abstraction and its implementations
//!
//! The protocol engine never touches a port directly. It talks to a
//! [`ByteChannel`], which offers exactly what the pump needs:
//! - a non-blocking query for unread bytes
//! - a newline-terminated line read
//! - a byte-sequence write

pub mod buffered;
pub mod mock;
pub mod serial;

pub use buffered::{Command, CommandQueue};
pub use mock::MockChannel;
pub use serial::{list_ports, SerialChannel, SerialPortInfo};

use serde::{Deserialize, Serialize};
use std::io;

/// Byte-level transport to the controller
///
/// Implementations must not block for long in any method: the pump
/// polls the channel from a single worker and sleeps when idle.
pub trait ByteChannel: Send {
    /// Number of unread bytes (buffered or pending in the device)
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one line, without its terminator
    ///
    /// Returns `Ok(None)` when no complete line is available yet. Partial
    /// data is kept until its newline arrives.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Write the whole byte sequence
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Human readable channel name for logs
    fn name(&self) -> String {
        "channel".to_string()
    }
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters used to open a serial channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds, kept short so reads never stall the pump
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 10,
        }
    }
}

impl ConnectionParams {
    /// Create serial parameters for a port at the given baud rate
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }
}
