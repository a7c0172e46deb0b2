//! Channel addressing for the USBDO96.
//!
//! The 96 channels are split in 6 groups of 16. Within a group, channels 1-8
//! sit on bits 0-7 of port C and channels 9-16 on bits 0-7 of port D:
//!
//! - DO01, DO17, ..., DO81 -> C0
//! - DO08, DO24, ..., DO88 -> C7
//! - DO09, DO25, ..., DO89 -> D0
//! - DO16, DO32, ..., DO96 -> D7

use crate::error::{Result, Usbdo96Error};
use crate::protocol::commands::{CHANNEL_COUNT, CHANNELS_PER_GROUP, GROUP_COUNT, Port};

/// Highest valid bit index within a port.
pub const MAX_BIT: u8 = 7;

/// Location of a channel on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Group (1-6).
    pub group: u8,
    /// Port C or D.
    pub port: Port,
    /// Bit within the port (0-7).
    pub bit: u8,
}

impl Address {
    /// Bit mask of this address within its port byte.
    pub const fn mask(&self) -> u8 {
        1 << self.bit
    }

    /// Whether this output is on in a group's (C, D) bytes.
    ///
    /// # Errors
    /// Returns `InvalidPort` for an address on port B.
    pub fn is_set(&self, (c, d): (u8, u8)) -> Result<bool> {
        let byte = match self.port {
            Port::C => c,
            Port::D => d,
            Port::B => return Err(Usbdo96Error::InvalidPort(self.port)),
        };
        Ok(byte & self.mask() != 0)
    }

    /// A group's (C, D) bytes with this output switched on or off.
    ///
    /// # Errors
    /// Returns `InvalidPort` for an address on port B.
    pub fn switch(&self, (c, d): (u8, u8), on: bool) -> Result<(u8, u8)> {
        let apply = |byte: u8| if on { byte | self.mask() } else { byte & !self.mask() };
        match self.port {
            Port::C => Ok((apply(c), d)),
            Port::D => Ok((c, apply(d))),
            Port::B => Err(Usbdo96Error::InvalidPort(self.port)),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group {} {}{}", self.group, self.port, self.bit)
    }
}

/// Check a channel number (1-96).
pub fn validate_channel(channel: u8) -> Result<u8> {
    if channel == 0 || channel > CHANNEL_COUNT {
        return Err(Usbdo96Error::OutOfRange {
            what: "channel",
            value: channel.into(),
            min: 1,
            max: CHANNEL_COUNT.into(),
        });
    }
    Ok(channel)
}

/// Check a group number (1-6).
pub fn validate_group(group: u8) -> Result<u8> {
    if group == 0 || group > GROUP_COUNT {
        return Err(Usbdo96Error::OutOfRange {
            what: "group",
            value: group.into(),
            min: 1,
            max: GROUP_COUNT.into(),
        });
    }
    Ok(group)
}

/// Resolve a channel (1-based) to its group, port and bit.
///
/// # Errors
/// Returns `OutOfRange` if the channel is not in 1-96.
pub fn to_address(channel: u8) -> Result<Address> {
    let c = validate_channel(channel)? - 1;
    let group = c / CHANNELS_PER_GROUP + 1;
    let port = if (c % CHANNELS_PER_GROUP) / 8 == 0 {
        Port::C
    } else {
        Port::D
    };
    Ok(Address {
        group,
        port,
        bit: c % 8,
    })
}

/// Resolve a group/port/bit back to its channel (1-based).
///
/// # Errors
/// Returns `OutOfRange` for a group outside 1-6 or a bit above 7, and
/// `InvalidPort` for port B.
pub fn to_channel(group: u8, port: Port, bit: u8) -> Result<u8> {
    let group = validate_group(group)?;
    let port_index = match port {
        Port::C => 0,
        Port::D => 1,
        Port::B => return Err(Usbdo96Error::InvalidPort(port)),
    };
    if bit > MAX_BIT {
        return Err(Usbdo96Error::OutOfRange {
            what: "bit",
            value: bit.into(),
            min: 0,
            max: MAX_BIT.into(),
        });
    }
    Ok((group - 1) * CHANNELS_PER_GROUP + port_index * 8 + bit + 1)
}
