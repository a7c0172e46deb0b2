//! Custom error types for the USBDO96 driver.
//!
//! This module provides fine-grained error handling for address validation,
//! serial communication, device discovery and configuration.

use thiserror::Error;

use crate::protocol::Port;

/// Main error type for USBDO96 operations.
#[derive(Error, Debug)]
pub enum Usbdo96Error {
    /// No USBDO96 found during enumeration.
    #[error("USBDO96 not found. Check USB connection and FTDI VCP drivers.")]
    DeviceNotFound,

    /// Multiple devices found when expecting one.
    #[error("Multiple USBDO96 devices found: {0:?}. Use --device to specify which one.")]
    MultipleDevicesFound(Vec<String>),

    /// Serial port error (open, configuration, enumeration).
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Underlying I/O failure while talking to the card.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write or read attempted while the transport is closed.
    #[error("Transport is closed")]
    TransportClosed,

    /// Channel, group or bit outside its valid domain.
    #[error("Invalid {what} {value}. Valid range: {min}-{max}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Port that cannot carry output values (only C and D can).
    #[error("Invalid port {0}. Only ports C and D address output channels")]
    InvalidPort(Port),

    /// Controller not initialized (or already closed).
    #[error("Device not initialized. Call initialize() first.")]
    NotInitialized,

    /// Configuration file could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic invalid input error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Usbdo96Error {
    /// Whether this error was raised by address validation (no I/O happened).
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            Usbdo96Error::OutOfRange { .. } | Usbdo96Error::InvalidPort(_)
        )
    }
}

/// Result type alias for USBDO96 operations.
pub type Result<T> = std::result::Result<T, Usbdo96Error>;
