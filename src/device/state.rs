//! In-memory image of the group latches.
//!
//! The card cannot report the latched group values, so the driver keeps the
//! last value written to every group. The cache holds the intended pattern
//! even while the board is disabled.

use crate::error::Result;
use crate::protocol::{Address, GROUP_COUNT, validate_group};

/// Last-written port C/D value of every group.
///
/// Each word stores port C in bits 0-7 and port D in bits 8-15.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStateCache {
    groups: [u16; GROUP_COUNT as usize],
}

impl GroupStateCache {
    /// Create a cache with every output off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache from saved group words, group 1 first.
    pub fn from_words(groups: [u16; GROUP_COUNT as usize]) -> Self {
        Self { groups }
    }

    /// Get the (C, D) bytes of a group.
    pub fn get(&self, group: u8) -> Result<(u8, u8)> {
        let word = self.word(group)?;
        Ok(((word & 0xFF) as u8, (word >> 8) as u8))
    }

    /// Store the (C, D) bytes of a group.
    pub fn set(&mut self, group: u8, c: u8, d: u8) -> Result<()> {
        let index = Self::index(group)?;
        self.groups[index] = u16::from(c) | (u16::from(d) << 8);
        Ok(())
    }

    /// Whether (C, D) differs from the cached bytes of a group.
    pub fn diff(&self, group: u8, c: u8, d: u8) -> Result<bool> {
        Ok(self.get(group)? != (c, d))
    }

    /// Turn every cached output off.
    pub fn reset_all(&mut self) {
        self.set_all_to(0x00);
    }

    /// Set the C and D bytes of every group to `value`.
    pub fn set_all_to(&mut self, value: u8) {
        let word = u16::from_le_bytes([value, value]);
        self.groups = [word; GROUP_COUNT as usize];
    }

    /// Raw 16-bit word of a group.
    pub fn word(&self, group: u8) -> Result<u16> {
        Ok(self.groups[Self::index(group)?])
    }

    /// Whether the output at `address` is cached as on.
    pub fn is_on(&self, address: Address) -> Result<bool> {
        address.is_set(self.get(address.group)?)
    }

    /// Words of all groups, group 1 first.
    pub fn words(&self) -> &[u16; GROUP_COUNT as usize] {
        &self.groups
    }

    fn index(group: u8) -> Result<usize> {
        Ok(usize::from(validate_group(group)? - 1))
    }
}

/// Board-wide state owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    /// B0 as last written.
    pub enabled: bool,
    /// Pending/latched values per group.
    pub groups: GroupStateCache,
}

impl BoardState {
    /// Port B value keeping the enable bit and clearing every latch bit.
    pub fn port_b_base(&self) -> u8 {
        if self.enabled {
            crate::protocol::PORT_B_ENABLED
        } else {
            crate::protocol::PORT_B_DISABLED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::to_address;

    #[test]
    fn test_new_cache_is_zero() {
        let cache = GroupStateCache::new();
        for group in 1..=GROUP_COUNT {
            assert_eq!(cache.get(group).unwrap(), (0, 0));
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = GroupStateCache::new();
        cache.set(2, 0x04, 0x0A).unwrap();
        assert_eq!(cache.get(2).unwrap(), (0x04, 0x0A));
        assert_eq!(cache.word(2).unwrap(), 0x0A04);
        assert_eq!(cache.get(1).unwrap(), (0, 0));
    }

    #[test]
    fn test_diff() {
        let mut cache = GroupStateCache::new();
        cache.set(1, 0x01, 0x80).unwrap();
        assert!(!cache.diff(1, 0x01, 0x80).unwrap());
        assert!(cache.diff(1, 0x00, 0x80).unwrap());
        assert!(cache.diff(1, 0x01, 0x00).unwrap());
    }

    #[test]
    fn test_set_all_and_reset() {
        let mut cache = GroupStateCache::new();
        cache.set_all_to(0xFF);
        assert!(cache.words().iter().all(|&w| w == 0xFFFF));
        cache.reset_all();
        assert!(cache.words().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_invalid_group() {
        let mut cache = GroupStateCache::new();
        assert!(cache.get(0).is_err());
        assert!(cache.set(7, 0, 0).is_err());
        assert!(cache.diff(7, 0, 0).is_err());
    }

    #[test]
    fn test_is_on() {
        let mut cache = GroupStateCache::new();
        // DO10 -> group 1, D1
        cache.set(1, 0x00, 0x02).unwrap();
        assert!(cache.is_on(to_address(10).unwrap()).unwrap());
        assert!(!cache.is_on(to_address(2).unwrap()).unwrap());
        assert!(!cache.is_on(to_address(26).unwrap()).unwrap());
    }

    #[test]
    fn test_from_words() {
        let cache = GroupStateCache::from_words([0x0A04, 0, 0, 0, 0, 0x8000]);
        assert_eq!(cache.get(1).unwrap(), (0x04, 0x0A));
        assert!(cache.is_on(to_address(96).unwrap()).unwrap());
        assert_eq!(cache.words()[5], 0x8000);
    }

    #[test]
    fn test_is_on_rejects_port_b() {
        let cache = GroupStateCache::from_words([0xFFFF; 6]);
        let address = Address {
            group: 1,
            port: crate::protocol::Port::B,
            bit: 0,
        };
        assert!(cache.is_on(address).is_err());
    }

    #[test]
    fn test_port_b_base() {
        let mut board = BoardState::default();
        assert_eq!(board.port_b_base(), 0x00);
        board.enabled = true;
        assert_eq!(board.port_b_base(), 0x01);
    }
}
