//! Serial port channel
//!
//! Opens a controller port through the `serialport` crate and exposes it
//! as a [`ByteChannel`]. Reads use a short timeout and are assembled into
//! lines in a local buffer, so a half-received line never blocks the pump.

use super::{ByteChannel, ConnectionParams, SerialParity};
use grblstream_core::{ConnectionError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// Port description (e.g., "USB Arduino Uno")
    pub description: String,
    /// USB vendor ID if applicable
    pub vid: Option<u16>,
    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List serial ports that look like CNC controllers
///
/// Keeps only the usual USB serial patterns:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        io::Error::from(e)
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                description: format!(
                    "USB {} {}",
                    usb.manufacturer.as_deref().unwrap_or("Device"),
                    usb.product.as_deref().unwrap_or("Serial Port")
                ),
                port_name: port.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
            },
            _ => SerialPortInfo {
                port_name: port.port_name,
                description: "Serial Port".to_string(),
                vid: None,
                pid: None,
            },
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Remove the first complete line from `pending`, dropping `\n` and any `\r`
pub(crate) fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = pending.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

/// A [`ByteChannel`] over a real serial port
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    pending: Vec<u8>,
}

impl SerialChannel {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        if params.port.is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            }
            .into());
        }

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("invalid data bits: {}", other),
                }
                .into())
            }
        };

        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("invalid stop bits: {}", other),
                }
                .into())
            }
        };

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);

        Ok(Self {
            port,
            name: params.port.clone(),
            pending: Vec::new(),
        })
    }

    fn fill_pending(&mut self) -> io::Result<()> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if waiting == 0 {
            return Ok(());
        }

        let mut buf = vec![0u8; waiting];
        match self.port.read(&mut buf) {
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ByteChannel for SerialChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        Ok(self.pending.len() + waiting)
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = take_line(&mut self.pending) {
            return Ok(Some(line));
        }
        self.fill_pending()?;
        Ok(take_line(&mut self.pending))
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
