//! Parsing utilities for CLI arguments and configuration values.
//!
//! This module provides reusable parsing functions for the input formats
//! used by the command-line tool.

use std::collections::BTreeSet;

use crate::error::{Result, Usbdo96Error};
use crate::protocol::{Port, validate_channel};

// =============================================================================
// Channel List Parsing
// =============================================================================

/// Parse a channel list into a set of channels.
///
/// Accepts comma-separated channels and inclusive ranges, e.g. `1,3,5-8`.
/// Whitespace around items is ignored and duplicates collapse. An empty
/// string gives an empty set.
///
/// # Example
/// ```
/// use usbdo96::utils::parsing::parse_channel_list;
///
/// let channels = parse_channel_list("1, 3,5-7").unwrap();
/// assert_eq!(channels.into_iter().collect::<Vec<_>>(), vec![1, 3, 5, 6, 7]);
/// ```
pub fn parse_channel_list(list: &str) -> Result<BTreeSet<u8>> {
    let mut channels = BTreeSet::new();

    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.split_once('-') {
            Some((start, end)) => {
                let start = parse_channel(start)?;
                let end = parse_channel(end)?;
                if start > end {
                    return Err(Usbdo96Error::InvalidInput(format!(
                        "Invalid range '{}': start is after end",
                        item
                    )));
                }
                channels.extend(start..=end);
            }
            None => {
                channels.insert(parse_channel(item)?);
            }
        }
    }

    Ok(channels)
}

/// Parse a single channel number (1-96).
pub fn parse_channel(value: &str) -> Result<u8> {
    let value = value.trim();
    let channel: u8 = value.parse().map_err(|_| {
        Usbdo96Error::InvalidInput(format!("Invalid channel '{}'. Use a number 1-96", value))
    })?;
    validate_channel(channel)
}

// =============================================================================
// Port Parsing
// =============================================================================

/// Parse a port name ("B", "C" or "D", any case).
pub fn parse_port(name: &str) -> Result<Port> {
    name.parse()
}

// =============================================================================
// Formatting
// =============================================================================

/// Format channels as a compact list, merging consecutive runs into ranges.
pub fn format_channel_list(channels: &[u8]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = channels.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while end.checked_add(1).is_some_and(|next| iter.peek() == Some(&next)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }

    parts.join(",")
}

// =============================================================================
// Tests
// =============================================================================
