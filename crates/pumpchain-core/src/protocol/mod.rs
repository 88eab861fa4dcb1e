//! Serial Protocol Communication
//!
//! Implements the ASCII command/response protocol spoken by daisy-chained
//! syringe pumps: CR-terminated, address-prefixed instructions and
//! multi-line replies ending in a status prompt.

pub mod commands;
pub mod engine;
mod error;
pub mod mock;
pub mod reply;
pub mod serial;
pub mod transport;

pub use commands::{Address, Instruction, Mnemonic};
pub use engine::CommandEngine;
pub use error::{PumpError, Result};
pub use mock::MockTransport;
pub use reply::{Fault, Prompt, Reply};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use transport::{Chain, SerialTransport, Transport};

/// Default baud rate of a pump chain
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Bytes read back for one reply
pub const DEFAULT_READ_BUDGET: usize = 80;

/// Terminator appended to every instruction
pub const LINE_TERMINATOR: u8 = b'\r';
