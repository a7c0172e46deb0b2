//! Serial protocol implementation for the EasyDAQ USBDO96.
//!
//! This module contains the command table, message builders and the
//! channel <-> group/port/bit address mapping.

pub mod address;
pub mod commands;

pub use address::*;
pub use commands::*;
