//! Command definitions and builders for the USBDO96 serial protocol.
//!
//! Every message is two bytes: an ASCII command letter selecting port and
//! operation, followed by the value. The datasheet table for port D is wrong;
//! the codes below are the ones the card actually answers to.

use crate::error::{Result, Usbdo96Error};

// =============================================================================
// Constants
// =============================================================================

/// FTDI Vendor ID.
pub const FTDI_VID: u16 = 0x0403;

/// FT232B/FT232BL Product ID (USB-serial bridge on the card).
pub const FT232B_PID: u16 = 0x6001;

/// Number of addressable output channels.
pub const CHANNEL_COUNT: u8 = 96;

/// Number of latch groups.
pub const GROUP_COUNT: u8 = 6;

/// Channels per group (8 on port C, 8 on port D).
pub const CHANNELS_PER_GROUP: u8 = 16;

/// Configure value making every bit of a port an output.
pub const CONFIGURE_ALL_OUTPUTS: u8 = 0x00;

/// Value byte sent along with read commands.
pub const READ_PLACEHOLDER: u8 = 0x00;

// =============================================================================
// Port B Control Bits
// =============================================================================

/// B0 cleared: every output forced to 0, group latches released.
pub const PORT_B_DISABLED: u8 = 0x00;

/// B0 set: outputs follow the latched group values.
pub const PORT_B_ENABLED: u8 = 0x01;

/// B1..B6 set: latch the current C/D values into all six groups at once.
pub const PORT_B_LATCH_ALL: u8 = 0x7E;

/// Latch bit on port B for a group (1-based). B7 is unused.
pub const fn latch_bit(group: u8) -> u8 {
    1 << group
}

// =============================================================================
// Ports & Commands
// =============================================================================

/// An 8-bit register on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Port {
    /// Control register: B0 enable, B1..B6 group latches.
    B,
    /// Low byte of a group (channels 1-8 of the group).
    C,
    /// High byte of a group (channels 9-16 of the group).
    D,
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Port::B => write!(f, "B"),
            Port::C => write!(f, "C"),
            Port::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for Port {
    type Err = Usbdo96Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B" => Ok(Port::B),
            "C" => Ok(Port::C),
            "D" => Ok(Port::D),
            _ => Err(Usbdo96Error::InvalidInput(format!(
                "Unknown port '{}'. Use: B, C or D",
                s
            ))),
        }
    }
}

/// Operation applied to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Read the port value (one response byte).
    Read,
    /// Set the direction of every bit (1 = input, 0 = output).
    Configure,
    /// Set the port value.
    Write,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Read => write!(f, "Read"),
            Command::Configure => write!(f, "Configure"),
            Command::Write => write!(f, "Write"),
        }
    }
}

/// Command byte for a port/command pair.
///
/// Port D write is 'J' (0x4A), not 'I' (0x49).
pub const fn command_byte(port: Port, command: Command) -> u8 {
    match (port, command) {
        (Port::B, Command::Read) => 0x41,
        (Port::B, Command::Configure) => 0x42,
        (Port::B, Command::Write) => 0x43,
        (Port::C, Command::Read) => 0x44,
        (Port::C, Command::Configure) => 0x45,
        (Port::C, Command::Write) => 0x46,
        (Port::D, Command::Read) => 0x47,
        (Port::D, Command::Configure) => 0x48,
        (Port::D, Command::Write) => 0x4A,
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Build the two-byte message for a port command.
///
/// # Arguments
/// * `port` - Target register
/// * `command` - Operation
/// * `value` - Argument for Configure/Write. Replaced by `READ_PLACEHOLDER` for Read.
pub const fn encode(port: Port, command: Command, value: u8) -> [u8; 2] {
    let value = match command {
        Command::Read => READ_PLACEHOLDER,
        Command::Configure | Command::Write => value,
    };
    [command_byte(port, command), value]
}

/// Look up the port/command pair behind a command byte.
///
/// Used to log outgoing messages in protocol terms.
pub fn decode(byte: u8) -> Option<(Port, Command)> {
    for port in [Port::B, Port::C, Port::D] {
        for command in [Command::Read, Command::Configure, Command::Write] {
            if command_byte(port, command) == byte {
                return Some((port, command));
            }
        }
    }
    None
}
