//! Discovery of connected USBDO96 cards.
//!
//! The card enumerates as an FTDI FT232BL virtual COM port, so discovery
//! matches the FTDI vendor/product IDs among the serial ports of the system.

use std::collections::BTreeSet;

use serialport::SerialPortType;
use tracing::debug;

use crate::error::{Result, Usbdo96Error};
use crate::protocol::{FT232B_PID, FTDI_VID};

/// A serial port as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    pub vid: u16,
    pub pid: u16,
}

/// Whether a candidate looks like a USBDO96.
pub fn is_usbdo96(candidate: &PortCandidate) -> bool {
    candidate.vid == FTDI_VID && candidate.pid == FT232B_PID
}

/// Use the call-in device rather than the call-out one on macOS.
fn normalize_name(name: &str) -> String {
    name.replace("/cu", "/tty")
}

/// Pick the single matching device from a list of candidates.
///
/// # Errors
/// Returns `DeviceNotFound` if nothing matches and `MultipleDevicesFound`
/// if more than one distinct device matches.
pub fn select_device(candidates: &[PortCandidate]) -> Result<String> {
    let mut matches: BTreeSet<String> = candidates
        .iter()
        .filter(|c| is_usbdo96(c))
        .map(|c| normalize_name(&c.name))
        .collect();

    match matches.len() {
        0 => Err(Usbdo96Error::DeviceNotFound),
        1 => matches.pop_first().ok_or(Usbdo96Error::DeviceNotFound),
        _ => Err(Usbdo96Error::MultipleDevicesFound(
            matches.into_iter().collect(),
        )),
    }
}

/// Enumerate the USB serial ports of the system.
pub fn enumerate_ports() -> Result<Vec<PortCandidate>> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .filter_map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => Some(PortCandidate {
                name: info.port_name,
                vid: usb.vid,
                pid: usb.pid,
            }),
            _ => None,
        })
        .collect())
}

/// List the device paths of all connected USBDO96 cards.
pub fn list_devices() -> Result<Vec<String>> {
    let devices: BTreeSet<String> = enumerate_ports()?
        .iter()
        .filter(|c| is_usbdo96(c))
        .map(|c| normalize_name(&c.name))
        .collect();

    Ok(devices.into_iter().collect())
}

/// Find the device path of the single connected USBDO96.
pub fn find_device() -> Result<String> {
    let candidates = enumerate_ports()?;
    debug!(count = candidates.len(), "enumerated USB serial ports");
    select_device(&candidates)
}
