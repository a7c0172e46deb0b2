//! EasyDAQ USBDO96 Library
//!
//! A Rust driver for the EasyDAQ USBDO96 96-channel digital output card.
//!
//! # Features
//!
//! - Discover the card by its FTDI vendor/product ID
//! - Switch individual channels, several at once, or all 96 simultaneously
//! - Only groups whose value changes are written
//! - Outputs reset and board disabled when the handle is dropped
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use usbdo96::config::ControllerConfig;
//! use usbdo96::device::Usbdo96;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Open, initialize, all outputs off
//!     let mut card = Usbdo96::open(&ControllerConfig::default())?;
//!
//!     // DO01 on
//!     card.turn_on(&BTreeSet::from([1]))?;
//!
//!     // DO40 and DO60 on, DO01 off
//!     card.set_channels(&BTreeSet::from([40, 60]), &BTreeSet::from([1]))?;
//!
//!     // All outputs to 0 at the same instant
//!     card.reset_all()?;
//!
//!     // Explicit close; dropping the handle would do the same
//!     card.close(true)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use config::ControllerConfig;
pub use device::{Transport, Usbdo96};
pub use error::{Result, Usbdo96Error};
pub use protocol::Port;
