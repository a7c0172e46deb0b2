//! Device abstraction layer for the USBDO96.
//!
//! Provides device discovery, the byte transport and the high-level
//! controller.

pub mod discovery;
pub mod state;
pub mod transport;
pub mod usbdo96;

pub use discovery::{find_device, list_devices};
pub use state::{BoardState, GroupStateCache};
pub use transport::{SerialTransport, Transport};
pub use usbdo96::{ControllerState, Usbdo96};
