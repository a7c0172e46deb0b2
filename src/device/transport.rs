//! Byte transport between the driver and the card.
//!
//! The controller only needs to push byte pairs and occasionally read one
//! byte back, so the seam is a small trait. `SerialTransport` is the
//! implementation backed by the FTDI virtual COM port.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::error::{Result, Usbdo96Error};

/// Raw byte link to the card.
pub trait Transport {
    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Open the link. Opening an already open link is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Write all bytes.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read a single byte.
    fn read_byte(&mut self) -> Result<u8>;

    /// Release the link. Closing a closed link is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Serial port transport (8N1, no flow control).
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport for the given device path.
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
            port: None,
        }
    }

    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Usbdo96Error::TransportClosed)
    }
}

impl Transport for SerialTransport {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()?;

        debug!(path = %self.path, baud = self.baud_rate, "serial port opened");
        self.port = Some(port);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let port = self.port_mut()?;
        let mut buf = [0u8; 1];
        port.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(path = %self.path, "serial port closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
