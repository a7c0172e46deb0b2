//! EasyDAQ USBDO96 device implementation.
//!
//! High-level interface turning channel on/off requests into the latch
//! sequences the card needs.
//!
//! Values are applied group by group: ports C and D carry the 16 output bits
//! of a group, and a 0 -> 1 edge on the group's port B bit (B1..B6) copies
//! them into that group. B0 enables the outputs; clearing it forces every
//! output to 0 while the groups keep their latched values.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::device::discovery::find_device;
use crate::device::state::BoardState;
use crate::device::transport::{SerialTransport, Transport};
use crate::error::{Result, Usbdo96Error};
use crate::protocol::{
    CONFIGURE_ALL_OUTPUTS, Command, PORT_B_DISABLED, PORT_B_ENABLED, PORT_B_LATCH_ALL,
    Port, decode, encode, latch_bit, to_address,
};

// =============================================================================
// Controller State
// =============================================================================

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, nothing sent yet.
    Uninitialized,
    /// `initialize()` in progress (or aborted by a transport error).
    Initializing,
    /// Ports configured, channel operations allowed.
    Ready,
    /// Transport released.
    Closed,
}

// =============================================================================
// Usbdo96
// =============================================================================

/// EasyDAQ USBDO96 device handle.
///
/// Owns the transport and the board state. Not synchronized: share it
/// between threads behind a `Mutex`.
///
/// Dropping an open handle runs `close(reset_on_exit)`.
///
/// # Example
///
/// ```no_run
/// use std::collections::BTreeSet;
/// use usbdo96::config::ControllerConfig;
/// use usbdo96::device::Usbdo96;
///
/// let mut card = Usbdo96::open(&ControllerConfig::default())?;
///
/// // DO03 and DO23 on (two groups, applied one after the other)
/// card.turn_on(&BTreeSet::from([3, 23]))?;
///
/// // DO01 and DO23 off, DO03 stays on
/// card.turn_off(&BTreeSet::from([1, 23]))?;
///
/// card.close(true)?;
/// # Ok::<(), usbdo96::error::Usbdo96Error>(())
/// ```
pub struct Usbdo96<T: Transport = SerialTransport> {
    transport: T,
    board: BoardState,
    state: ControllerState,
    settle_delay: Duration,
    reset_on_exit: bool,
}

impl Usbdo96<SerialTransport> {
    /// Open the configured (or the single connected) card and initialize it.
    ///
    /// # Errors
    /// Returns `DeviceNotFound`/`MultipleDevicesFound` when no device is
    /// configured and discovery is not conclusive, or any transport error
    /// raised during initialization.
    pub fn open(config: &ControllerConfig) -> Result<Self> {
        let mut card = Self::connect(config)?;
        card.initialize()?;
        Ok(card)
    }

    /// Open the configured (or the single connected) card and take it over
    /// with `attach()`, keeping the outputs described by `board`.
    pub fn resume(config: &ControllerConfig, board: BoardState) -> Result<Self> {
        let mut card = Self::connect(config)?;
        card.attach(board)?;
        Ok(card)
    }

    /// Device path of the serial link.
    pub fn device(&self) -> &str {
        self.transport.path()
    }

    fn connect(config: &ControllerConfig) -> Result<Self> {
        let path = match &config.device {
            Some(device) => device.clone(),
            None => find_device()?,
        };
        info!(device = %path, "opening USBDO96");

        let transport = SerialTransport::new(path, config.baud_rate, config.timeout());
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Usbdo96<T> {
    /// Wrap a transport. Nothing is sent until `initialize()`.
    pub fn new(transport: T, config: &ControllerConfig) -> Self {
        Self {
            transport,
            board: BoardState::default(),
            state: ControllerState::Uninitialized,
            settle_delay: config.settle_delay(),
            reset_on_exit: config.reset_on_exit,
        }
    }

    /// Configure the ports and set all 96 outputs to 0.
    ///
    /// Opens the transport if needed, so a closed controller can be
    /// initialized again.
    pub fn initialize(&mut self) -> Result<()> {
        self.state = ControllerState::Initializing;
        if !self.transport.is_open() {
            self.transport.open()?;
        }

        for port in [Port::B, Port::C, Port::D] {
            self.send(port, Command::Configure, CONFIGURE_ALL_OUTPUTS)?;
        }

        // Disable outputs and release every group latch.
        self.apply_enabled(false)?;

        // Latch an all-zero pattern into the six groups at once.
        self.write(Port::C, 0x00)?;
        self.write(Port::D, 0x00)?;
        self.write(Port::B, PORT_B_LATCH_ALL)?;

        // Enable, which also drops the latch bits.
        self.apply_enabled(true)?;

        self.board.groups.reset_all();
        self.state = ControllerState::Ready;
        info!("USBDO96 initialized, all outputs off");
        Ok(())
    }

    /// Take over a card that is already driving outputs, without changing them.
    ///
    /// Configures the ports and restores the enable bit of `board`, but no
    /// group is latched: the card keeps the values it holds. `board` must
    /// describe those values, e.g. the state left by a previous session
    /// closed without reset. Use `initialize()` when that is not known.
    pub fn attach(&mut self, board: BoardState) -> Result<()> {
        self.state = ControllerState::Initializing;
        if !self.transport.is_open() {
            self.transport.open()?;
        }

        for port in [Port::B, Port::C, Port::D] {
            self.send(port, Command::Configure, CONFIGURE_ALL_OUTPUTS)?;
        }

        self.board.groups = board.groups;
        self.apply_enabled(board.enabled)?;

        self.state = ControllerState::Ready;
        info!(enabled = board.enabled, "USBDO96 attached, outputs kept");
        Ok(())
    }

    /// Enable all outputs.
    ///
    /// Outputs follow the group values again, including any change made
    /// while the board was disabled.
    pub fn enable(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.apply_enabled(true)
    }

    /// Disable all outputs.
    ///
    /// Every output reads 0 but the group values are kept and can still be
    /// changed; `enable()` applies them.
    pub fn disable(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.apply_enabled(false)
    }

    /// Set all 96 outputs to 0 simultaneously.
    pub fn reset_all(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.latch_all(0x00)
    }

    /// Set all 96 outputs to 1 simultaneously.
    pub fn set_all(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.latch_all(0xFF)
    }

    /// Turn the channels in `on` on and the channels in `off` off.
    ///
    /// A channel in both sets is turned on. Every channel is validated
    /// before anything is sent. Groups are written one after the other and
    /// a group whose bytes do not change is not written at all.
    ///
    /// # Errors
    /// Returns `OutOfRange` for a channel outside 1-96 (nothing sent).
    pub fn set_channels(&mut self, on: &BTreeSet<u8>, off: &BTreeSet<u8>) -> Result<()> {
        self.ensure_ready()?;

        // Target bytes per group, computed before anything is sent.
        let mut targets: BTreeMap<u8, (u8, u8)> = BTreeMap::new();
        for &channel in on.union(off) {
            let address = to_address(channel)?;
            let bytes = match targets.entry(address.group) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.board.groups.get(address.group)?),
            };
            *bytes = address.switch(*bytes, on.contains(&channel))?;
        }

        if targets.is_empty() {
            return Ok(());
        }

        let base = self.board.port_b_base();
        self.write(Port::B, base)?;

        for (group, (c, d)) in targets {
            if !self.board.groups.diff(group, c, d)? {
                debug!(group, "group unchanged, skipped");
                continue;
            }

            // Both bytes are latched together, so both are always written.
            self.write(Port::C, c)?;
            self.write(Port::D, d)?;
            self.write(Port::B, base | latch_bit(group))?;
            self.board.groups.set(group, c, d)?;
        }

        Ok(())
    }

    /// Turn channels on, leaving the others untouched.
    pub fn turn_on(&mut self, channels: &BTreeSet<u8>) -> Result<()> {
        self.set_channels(channels, &BTreeSet::new())
    }

    /// Turn channels off, leaving the others untouched.
    pub fn turn_off(&mut self, channels: &BTreeSet<u8>) -> Result<()> {
        self.set_channels(&BTreeSet::new(), channels)
    }

    /// Read the current value of a port register.
    ///
    /// Only the port registers can be read back; the latched group values
    /// are only known through the cache.
    pub fn read_port(&mut self, port: Port) -> Result<u8> {
        self.ensure_ready()?;
        self.send(port, Command::Read, 0x00)?;
        let value = self.transport.read_byte()?;
        debug!("rx {} {:#04x}", port, value);
        Ok(value)
    }

    /// Reset the outputs (optionally) and release the transport.
    ///
    /// With `reset_first`, all outputs are set to 0 and the board is
    /// disabled before closing. The transport is released even if the reset
    /// fails; the first error is returned. Closing a closed controller does
    /// nothing.
    pub fn close(&mut self, reset_first: bool) -> Result<()> {
        if !self.transport.is_open() {
            self.state = ControllerState::Closed;
            return Ok(());
        }

        let reset = if reset_first && self.state == ControllerState::Ready {
            self.reset_all().and_then(|_| self.disable())
        } else {
            Ok(())
        };
        let closed = self.transport.close();

        self.state = ControllerState::Closed;
        self.board = BoardState::default();
        info!(reset = reset_first, "USBDO96 closed");

        reset.and(closed)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether the cached state of a channel is on.
    ///
    /// This is the intended value: a channel can be on while the board is
    /// disabled.
    pub fn is_on(&self, channel: u8) -> Result<bool> {
        self.board.groups.is_on(to_address(channel)?)
    }

    /// Cached (C, D) bytes of a group.
    pub fn group_state(&self, group: u8) -> Result<(u8, u8)> {
        self.board.groups.get(group)
    }

    /// Whether the outputs are enabled (B0).
    pub fn is_enabled(&self) -> bool {
        self.board.enabled
    }

    /// Channels currently cached as on, ascending.
    pub fn channels_on(&self) -> Vec<u8> {
        (1..=crate::protocol::CHANNEL_COUNT)
            .filter(|&channel| self.is_on(channel).unwrap_or(false))
            .collect()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Board state (enable bit and group cache).
    pub fn board(&self) -> &BoardState {
        &self.board
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_ready(&self) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Usbdo96Error::TransportClosed);
        }
        if self.state != ControllerState::Ready {
            return Err(Usbdo96Error::NotInitialized);
        }
        Ok(())
    }

    fn apply_enabled(&mut self, enabled: bool) -> Result<()> {
        let value = if enabled {
            PORT_B_ENABLED
        } else {
            PORT_B_DISABLED
        };
        self.write(Port::B, value)?;
        self.board.enabled = enabled;
        Ok(())
    }

    /// Latch the same value into all six groups in one B edge.
    ///
    /// Always B = base, base | latch-all, base: the first write guarantees
    /// the 0 -> 1 edge, the last one releases the latches.
    fn latch_all(&mut self, value: u8) -> Result<()> {
        let base = self.board.port_b_base();
        self.write(Port::C, value)?;
        self.write(Port::D, value)?;
        self.write(Port::B, base)?;
        self.write(Port::B, base | PORT_B_LATCH_ALL)?;
        self.write(Port::B, base)?;
        self.board.groups.set_all_to(value);
        Ok(())
    }

    fn write(&mut self, port: Port, value: u8) -> Result<()> {
        self.send(port, Command::Write, value)
    }

    fn send(&mut self, port: Port, command: Command, value: u8) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Usbdo96Error::TransportClosed);
        }

        let message = encode(port, command, value);
        match decode(message[0]) {
            Some((port, command)) => debug!("tx {} {} {:#04x}", port, command, message[1]),
            None => debug!("tx {:#04x} {:#04x}", message[0], message[1]),
        }
        self.transport.write_all(&message)?;

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        Ok(())
    }
}

impl<T: Transport> Drop for Usbdo96<T> {
    fn drop(&mut self) {
        let reset = self.reset_on_exit;
        if let Err(e) = self.close(reset) {
            warn!(error = %e, "failed to close USBDO96 cleanly");
        }
    }
}

impl<T: Transport> std::fmt::Debug for Usbdo96<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Usbdo96")
            .field("state", &self.state)
            .field("board", &self.board)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const B: u8 = 0x43;
    const C: u8 = 0x46;
    const D: u8 = 0x4A;

    #[derive(Debug, Default)]
    struct Log {
        writes: Vec<[u8; 2]>,
        opened: usize,
        closed: usize,
    }

    /// In-memory transport recording every message.
    #[derive(Debug, Default)]
    struct MockTransport {
        log: Rc<RefCell<Log>>,
        open: bool,
        fail_at: Option<usize>,
        read_value: u8,
    }

    impl Transport for MockTransport {
        fn is_open(&self) -> bool {
            self.open
        }

        fn open(&mut self) -> Result<()> {
            self.open = true;
            self.log.borrow_mut().opened += 1;
            Ok(())
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            let mut log = self.log.borrow_mut();
            if self.fail_at == Some(log.writes.len()) {
                return Err(Usbdo96Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write timed out",
                )));
            }
            log.writes.push([bytes[0], bytes[1]]);
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8> {
            Ok(self.read_value)
        }

        fn close(&mut self) -> Result<()> {
            self.open = false;
            self.log.borrow_mut().closed += 1;
            Ok(())
        }
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig::default().with_settle_delay_ms(0)
    }

    fn card() -> (Usbdo96<MockTransport>, Rc<RefCell<Log>>) {
        let transport = MockTransport::default();
        let log = Rc::clone(&transport.log);
        (Usbdo96::new(transport, &test_config()), log)
    }

    fn ready_card() -> (Usbdo96<MockTransport>, Rc<RefCell<Log>>) {
        let (mut card, log) = card();
        card.initialize().unwrap();
        log.borrow_mut().writes.clear();
        (card, log)
    }

    fn writes(log: &Rc<RefCell<Log>>) -> Vec<[u8; 2]> {
        log.borrow().writes.clone()
    }

    fn set(channels: &[u8]) -> BTreeSet<u8> {
        channels.iter().copied().collect()
    }

    #[test]
    fn test_initialize_sequence() {
        let (mut card, log) = card();
        assert_eq!(card.state(), ControllerState::Uninitialized);

        card.initialize().unwrap();

        assert_eq!(
            writes(&log),
            vec![
                [0x42, 0x00],
                [0x45, 0x00],
                [0x48, 0x00],
                [B, 0x00],
                [C, 0x00],
                [D, 0x00],
                [B, 0x7E],
                [B, 0x01],
            ]
        );
        assert_eq!(log.borrow().opened, 1);
        assert_eq!(card.state(), ControllerState::Ready);
        assert!(card.is_enabled());
        assert!(card.channels_on().is_empty());
        for channel in 1..=96 {
            assert!(!card.is_on(channel).unwrap());
        }
    }

    #[test]
    fn test_operations_require_initialize() {
        let (mut card, log) = card();
        log.borrow_mut().writes.clear();
        card.transport.open = true;

        assert!(matches!(
            card.turn_on(&set(&[1])),
            Err(Usbdo96Error::NotInitialized)
        ));
        assert!(matches!(card.enable(), Err(Usbdo96Error::NotInitialized)));
        assert!(writes(&log).is_empty());
    }

    #[test]
    fn test_single_group_update() {
        let (mut card, log) = ready_card();

        // DO03, DO10, DO12 -> group 1, C2, D1, D3
        card.turn_on(&set(&[3, 10, 12])).unwrap();

        assert_eq!(
            writes(&log),
            vec![[B, 0x01], [C, 0x04], [D, 0x0A], [B, 0x03]]
        );
        assert_eq!(card.group_state(1).unwrap(), (0x04, 0x0A));
    }

    #[test]
    fn test_groups_applied_sequentially() {
        let (mut card, log) = ready_card();

        // DO03 -> group 1 C2, DO23 -> group 2 C6
        card.turn_on(&set(&[3, 23])).unwrap();

        assert_eq!(
            writes(&log),
            vec![
                [B, 0x01],
                [C, 0x04],
                [D, 0x00],
                [B, 0x03],
                [C, 0x40],
                [D, 0x00],
                [B, 0x05],
            ]
        );
    }

    #[test]
    fn test_turn_off_keeps_other_channels() {
        let (mut card, _log) = ready_card();

        card.set_channels(&set(&[3, 23]), &set(&[])).unwrap();
        card.set_channels(&set(&[]), &set(&[1, 23])).unwrap();

        assert!(card.is_on(3).unwrap());
        assert!(!card.is_on(1).unwrap());
        assert!(!card.is_on(23).unwrap());
        assert_eq!(card.channels_on(), vec![3]);
    }

    #[test]
    fn test_on_wins_over_off() {
        let (mut card, _log) = ready_card();

        card.set_channels(&set(&[5]), &set(&[5])).unwrap();

        assert!(card.is_on(5).unwrap());
    }

    #[test]
    fn test_unchanged_group_is_not_written() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[3])).unwrap();
        log.borrow_mut().writes.clear();

        card.turn_on(&set(&[3])).unwrap();
        card.turn_off(&set(&[40])).unwrap();

        // Only the leading port B writes, no C/D/latch.
        assert_eq!(writes(&log), vec![[B, 0x01], [B, 0x01]]);
    }

    #[test]
    fn test_only_changed_groups_written() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[3])).unwrap();
        log.borrow_mut().writes.clear();

        // Group 1 unchanged, group 6 changes (DO96 -> D7).
        card.turn_on(&set(&[3, 96])).unwrap();

        assert_eq!(
            writes(&log),
            vec![[B, 0x01], [C, 0x00], [D, 0x80], [B, 0x41]]
        );
    }

    #[test]
    fn test_empty_request_sends_nothing() {
        let (mut card, log) = ready_card();

        card.set_channels(&BTreeSet::new(), &BTreeSet::new()).unwrap();

        assert!(writes(&log).is_empty());
    }

    #[test]
    fn test_out_of_range_sends_nothing() {
        let (mut card, log) = ready_card();

        let err = card.turn_on(&set(&[3, 97])).unwrap_err();

        assert!(err.is_out_of_range());
        assert!(writes(&log).is_empty());
        assert!(!card.is_on(3).unwrap());
        assert!(card.turn_off(&set(&[0])).is_err());
        assert!(card.is_on(0).is_err());
    }

    #[test]
    fn test_reset_all_sequence() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[1, 50, 96])).unwrap();
        log.borrow_mut().writes.clear();

        card.reset_all().unwrap();

        assert_eq!(
            writes(&log),
            vec![[C, 0x00], [D, 0x00], [B, 0x01], [B, 0x7F], [B, 0x01]]
        );
        for group in 1..=6 {
            assert_eq!(card.group_state(group).unwrap(), (0, 0));
        }
    }

    #[test]
    fn test_reset_all_while_disabled() {
        let (mut card, log) = ready_card();
        card.disable().unwrap();
        log.borrow_mut().writes.clear();

        card.reset_all().unwrap();

        let port_b: Vec<u8> = writes(&log)
            .iter()
            .filter(|w| w[0] == B)
            .map(|w| w[1])
            .collect();
        assert_eq!(port_b, vec![0x00, 0x7E, 0x00]);
        assert!(!card.is_enabled());
    }

    #[test]
    fn test_set_all() {
        let (mut card, log) = ready_card();

        card.set_all().unwrap();

        assert_eq!(
            writes(&log),
            vec![[C, 0xFF], [D, 0xFF], [B, 0x01], [B, 0x7F], [B, 0x01]]
        );
        assert!(card.board().groups.words().iter().all(|&w| w == 0xFFFF));
        assert_eq!(card.channels_on().len(), 96);
    }

    #[test]
    fn test_pending_state_survives_disable() {
        let (mut card, log) = ready_card();

        card.disable().unwrap();
        card.turn_on(&set(&[10])).unwrap();
        card.enable().unwrap();

        // DO10 -> group 1, D1. Latched with B0 cleared, then enabled.
        assert_eq!(
            writes(&log),
            vec![
                [B, 0x00],
                [B, 0x00],
                [C, 0x00],
                [D, 0x02],
                [B, 0x02],
                [B, 0x01],
            ]
        );
        assert!(card.is_enabled());
        assert!(card.is_on(10).unwrap());
    }

    #[test]
    fn test_disable_keeps_cache() {
        let (mut card, _log) = ready_card();
        card.turn_on(&set(&[7, 70])).unwrap();

        card.disable().unwrap();

        assert!(!card.is_enabled());
        assert_eq!(card.channels_on(), vec![7, 70]);
    }

    #[test]
    fn test_read_port() {
        let (mut card, log) = ready_card();
        card.transport.read_value = 0x5A;

        assert_eq!(card.read_port(Port::C).unwrap(), 0x5A);
        assert_eq!(writes(&log), vec![[0x44, 0x00]]);
    }

    #[test]
    fn test_close_resets_and_disables() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[2])).unwrap();
        log.borrow_mut().writes.clear();

        card.close(true).unwrap();

        assert_eq!(
            writes(&log),
            vec![
                [C, 0x00],
                [D, 0x00],
                [B, 0x01],
                [B, 0x7F],
                [B, 0x01],
                [B, 0x00],
            ]
        );
        assert_eq!(log.borrow().closed, 1);
        assert_eq!(card.state(), ControllerState::Closed);
    }

    #[test]
    fn test_close_without_reset() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[2])).unwrap();
        log.borrow_mut().writes.clear();

        card.close(false).unwrap();

        assert!(writes(&log).is_empty());
        assert_eq!(log.borrow().closed, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut card, log) = ready_card();

        card.close(true).unwrap();
        let count = writes(&log).len();
        card.close(true).unwrap();

        assert_eq!(writes(&log).len(), count);
        assert_eq!(log.borrow().closed, 1);
        assert!(matches!(
            card.turn_on(&set(&[1])),
            Err(Usbdo96Error::TransportClosed)
        ));
    }

    #[test]
    fn test_reinitialize_after_close() {
        let (mut card, log) = ready_card();
        card.close(true).unwrap();

        card.initialize().unwrap();
        card.turn_on(&set(&[1])).unwrap();

        assert_eq!(log.borrow().opened, 2);
        assert!(card.is_on(1).unwrap());
    }

    #[test]
    fn test_drop_resets_once() {
        let (mut card, log) = ready_card();
        card.turn_on(&set(&[12])).unwrap();
        log.borrow_mut().writes.clear();

        drop(card);

        let log = log.borrow();
        assert_eq!(log.closed, 1);
        assert_eq!(log.writes.len(), 6);
        assert_eq!(log.writes.last(), Some(&[B, 0x00]));
    }

    #[test]
    fn test_drop_after_close_is_noop() {
        let (mut card, log) = ready_card();
        card.close(false).unwrap();

        drop(card);

        assert!(writes(&log).is_empty());
        assert_eq!(log.borrow().closed, 1);
    }

    #[test]
    fn test_drop_without_reset_on_exit() {
        let transport = MockTransport::default();
        let log = Rc::clone(&transport.log);
        let mut card = Usbdo96::new(transport, &test_config().with_reset_on_exit(false));
        card.initialize().unwrap();
        log.borrow_mut().writes.clear();

        drop(card);

        assert!(writes(&log).is_empty());
        assert_eq!(log.borrow().closed, 1);
    }

    #[test]
    fn test_transport_error_aborts_sequence() {
        let (mut card, log) = ready_card();
        // Fail on the D write of the group update.
        card.transport.fail_at = Some(2);

        let err = card.turn_on(&set(&[3])).unwrap_err();

        assert!(matches!(err, Usbdo96Error::Io(_)));
        assert_eq!(writes(&log), vec![[B, 0x01], [C, 0x04]]);
        // Cache not updated for the aborted group.
        assert!(!card.is_on(3).unwrap());

        card.transport.fail_at = None;
        card.reset_all().unwrap();
    }

    #[test]
    fn test_attach_keeps_outputs_of_previous_session() {
        // First session: DO03 on, closed without reset.
        let (mut first, _log) = ready_card();
        first.turn_on(&set(&[3])).unwrap();
        let board = first.board().clone();
        first.close(false).unwrap();

        // Second session takes the card over instead of initializing it.
        let (mut second, log) = card();
        second.attach(board).unwrap();

        assert_eq!(
            writes(&log),
            vec![[0x42, 0x00], [0x45, 0x00], [0x48, 0x00], [B, 0x01]]
        );
        assert_eq!(second.state(), ControllerState::Ready);
        assert!(second.is_on(3).unwrap());

        log.borrow_mut().writes.clear();
        second.turn_on(&set(&[23])).unwrap();

        // Only group 2 is latched; group 1 keeps DO03.
        assert_eq!(
            writes(&log),
            vec![[B, 0x01], [C, 0x40], [D, 0x00], [B, 0x05]]
        );
        assert_eq!(second.channels_on(), vec![3, 23]);
    }

    #[test]
    fn test_attach_then_turn_off() {
        let (mut first, _log) = ready_card();
        first.turn_on(&set(&[3, 10])).unwrap();
        let board = first.board().clone();
        first.close(false).unwrap();

        let (mut second, log) = card();
        second.attach(board).unwrap();
        log.borrow_mut().writes.clear();
        second.turn_off(&set(&[3])).unwrap();

        assert_eq!(
            writes(&log),
            vec![[B, 0x01], [C, 0x00], [D, 0x02], [B, 0x03]]
        );
        assert_eq!(second.channels_on(), vec![10]);
    }

    #[test]
    fn test_attach_disabled_board() {
        let (mut first, _log) = ready_card();
        first.turn_on(&set(&[40])).unwrap();
        first.disable().unwrap();
        let board = first.board().clone();
        first.close(false).unwrap();

        let (mut second, log) = card();
        second.attach(board).unwrap();

        assert_eq!(writes(&log).last(), Some(&[B, 0x00]));
        assert!(!second.is_enabled());
        assert!(second.is_on(40).unwrap());

        second.enable().unwrap();
        assert!(second.is_enabled());
    }

    #[test]
    fn test_every_sent_message_decodes() {
        let (mut card, log) = card();
        card.initialize().unwrap();
        card.turn_on(&set(&[3, 23, 96])).unwrap();
        card.set_all().unwrap();
        card.read_port(Port::B).unwrap();
        card.close(true).unwrap();

        for message in writes(&log) {
            assert!(decode(message[0]).is_some(), "undecodable {:?}", message);
        }
    }
}
