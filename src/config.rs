//! Controller configuration.
//!
//! Serial parameters, the settle delay between commands and the teardown
//! behaviour. Every field has a default so partial config files load.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default baud rate of the FTDI virtual COM port.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial read/write timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default pause after every command.
///
/// The card drops commands sent back to back; the minimum gap has not been
/// measured, 10 ms is known to work.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 10;

/// Configuration of a `Usbdo96` controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Device path. `None` selects the single connected card.
    #[serde(default)]
    pub device: Option<String>,

    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read and write timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause after every command in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Reset all outputs and disable the board when the controller is dropped.
    #[serde(default = "default_reset_on_exit")]
    pub reset_on_exit: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_reset_on_exit() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            reset_on_exit: default_reset_on_exit(),
        }
    }
}

impl ControllerConfig {
    /// Serial timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Settle delay as a `Duration`.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Builder-style device override.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Builder-style settle delay override.
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Builder-style teardown override.
    pub fn with_reset_on_exit(mut self, reset: bool) -> Self {
        self.reset_on_exit = reset;
        self
    }
}
