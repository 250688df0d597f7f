//! # mcareg-raw
//!
//! Register map definitions for multichannel analyzer (MCA) detector
//! controllers.
//!
//! Every readable or writable memory bank on a device is described by a
//! [`RegisterMap`] implementation. Each map knows how to turn a vector of
//! little-endian words into typed hardware fields, how to pack those fields
//! back into words, and how to derive physical ("user") quantities from the
//! fields. Maps that can be programmed from physical quantities additionally
//! implement [`Invertible`].
//!
//! The crate also defines the 32-bit command header and the 64-byte command
//! packet used on the wire, see [`wire`].
//!
//! ## Usage
//!
//! ```ignore
//! use mcareg_raw::{Bank, RegisterMapKind, RegisterWords};
//!
//! let kind = RegisterMapKind::from_name("fpga_results")?;
//! let words = RegisterWords::from_le_bytes(kind.encoding(), &bytes);
//! let bank = kind.decode(words, 40e6)?;
//!
//! println!("{}", serde_json::to_string_pretty(&bank)?);
//! ```

pub mod bank;
pub mod bits;
pub mod error;
pub mod family;
pub mod pulse;
pub mod register;
pub mod wire;

pub use bank::{Bank, BankState, RegisterMapKind};
pub use error::{RegisterError, Result};
pub use register::{
    BankAddress, Empty, Invertible, RegisterMap, RegisterWords, UserSync, Word, WordEncoding,
};
pub use wire::{Header, MemoryTarget, OpcodeSpace};

// Only one controller generation is described today
pub use family::mca3k as current_family;
