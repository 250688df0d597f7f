//! Command header and packet layout
//!
//! Every transaction starts with a 64-byte command packet on the command
//! endpoint. Its first four bytes hold a little-endian [`Header`] word; a
//! regular packet carries up to 30 auxiliary 16-bit control words after the
//! header, a short-write packet carries the register payload instead.

use serde::{Deserialize, Serialize};

use crate::error::{RegisterError, Result};
use crate::register::WordEncoding;

/// Size of every command packet
pub const COMMAND_PACKET_SIZE: usize = 64;

/// Size of the header word
pub const HEADER_SIZE: usize = 4;

/// Auxiliary control words carried after the header
pub const AUX_CONTROL_WORDS: usize = 30;

/// Payload bytes available in a short-write packet
pub const SHORT_WRITE_CAPACITY: usize = 60;

/// Short-write flag, bit 11 of the header
pub const SHORT_WRITE_FLAG: u32 = 0x800;

/// Header opcodes
pub mod opcode {
    pub const PING: u8 = 0;
    pub const FPGA_WRITE: u8 = 1;
    pub const FPGA_READ: u8 = 2;
    pub const ARM_WRITE: u8 = 3;
    pub const ARM_READ: u8 = 4;
}

/// Bank addresses carried in the header
pub mod address {
    pub const FPGA_CTRL: u8 = 0;
    pub const FPGA_STATISTICS: u8 = 1;
    pub const FPGA_RESULTS: u8 = 2;
    pub const FPGA_HISTOGRAM: u8 = 3;
    pub const FPGA_TRACE: u8 = 4;
    pub const FPGA_LIST_MODE: u8 = 5;
    pub const FPGA_WEIGHTS: u8 = 6;
    pub const FPGA_ACTION: u8 = 7;
    pub const FPGA_TIME_SLICE: u8 = 8;

    pub const ARM_PING: u8 = 0;
    pub const ARM_VERSION: u8 = 0;
    pub const ARM_STATUS: u8 = 1;
    pub const ARM_CTRL: u8 = 2;
    pub const ARM_CAL: u8 = 3;
}

/// Processor that serves a bank, selecting the opcode pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeSpace {
    /// Link test, opcode 0 in both directions
    Ping,
    Fpga,
    Arm,
}

impl OpcodeSpace {
    pub const fn read_opcode(self) -> u8 {
        match self {
            OpcodeSpace::Ping => opcode::PING,
            OpcodeSpace::Fpga => opcode::FPGA_READ,
            OpcodeSpace::Arm => opcode::ARM_READ,
        }
    }

    pub const fn write_opcode(self) -> u8 {
        match self {
            OpcodeSpace::Ping => opcode::PING,
            OpcodeSpace::Fpga => opcode::FPGA_WRITE,
            OpcodeSpace::Arm => opcode::ARM_WRITE,
        }
    }

    /// Classify a header opcode as `(space, is_write)`
    ///
    /// Opcode 0 is reported as a read.
    pub const fn from_opcode(code: u8) -> Option<(OpcodeSpace, bool)> {
        match code {
            opcode::PING => Some((OpcodeSpace::Ping, false)),
            opcode::FPGA_WRITE => Some((OpcodeSpace::Fpga, true)),
            opcode::FPGA_READ => Some((OpcodeSpace::Fpga, false)),
            opcode::ARM_WRITE => Some((OpcodeSpace::Arm, true)),
            opcode::ARM_READ => Some((OpcodeSpace::Arm, false)),
            _ => None,
        }
    }
}

/// Memory targeted by a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryTarget {
    #[default]
    #[serde(rename = "ram", alias = "volatile")]
    Volatile,
    #[serde(rename = "flash", alias = "non_volatile")]
    NonVolatile,
    #[serde(rename = "reset")]
    Reset,
}

impl MemoryTarget {
    pub const fn code(self) -> u8 {
        match self {
            MemoryTarget::Volatile => 0,
            MemoryTarget::NonVolatile => 1,
            MemoryTarget::Reset => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MemoryTarget::Volatile),
            1 => Ok(MemoryTarget::NonVolatile),
            2 => Ok(MemoryTarget::Reset),
            other => Err(RegisterError::InvalidMemoryTarget(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MemoryTarget::Volatile => "ram",
            MemoryTarget::NonVolatile => "flash",
            MemoryTarget::Reset => "reset",
        }
    }
}

/// Command header word
///
/// ## Word Format
///
/// | Bits   | Field       | Description                          |
/// |--------|-------------|--------------------------------------|
/// | 0-3    | opcode      | Operation code, see [`opcode`]       |
/// | 4-10   | address     | Bank address, see [`address`]        |
/// | 11     | short_write | Payload travels in the command packet|
/// | 12-15  | memory      | 0 ram, 1 flash, 2 reset              |
/// | 16-31  | byte_count  | Payload length in bytes              |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub address: u8,
    pub short_write: bool,
    pub memory: MemoryTarget,
    pub byte_count: u16,
}

impl Header {
    pub fn to_word(&self) -> u32 {
        ((self.opcode as u32) & 0xF)
            | (((self.address as u32) & 0x7F) << 4)
            | (if self.short_write { SHORT_WRITE_FLAG } else { 0 })
            | (((self.memory.code() as u32) & 0xF) << 12)
            | ((self.byte_count as u32) << 16)
    }

    pub fn from_word(word: u32) -> Result<Self> {
        Ok(Self {
            opcode: (word & 0xF) as u8,
            address: ((word >> 4) & 0x7F) as u8,
            short_write: word & SHORT_WRITE_FLAG != 0,
            memory: MemoryTarget::from_code(((word >> 12) & 0xF) as u8)?,
            byte_count: (word >> 16) as u16,
        })
    }

    /// Parse the header from the first four bytes of a packet
    pub fn from_packet(packet: &[u8]) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        let n = packet.len().min(HEADER_SIZE);
        raw[..n].copy_from_slice(&packet[..n]);
        Self::from_word(u32::from_le_bytes(raw))
    }
}

/// Byte count for `items` words, saturating at the header's 16-bit field
pub fn byte_count(items: usize, encoding: WordEncoding) -> u16 {
    u16::try_from(items * encoding.width()).unwrap_or(u16::MAX)
}

/// Words of `encoding` that fit in a short-write packet
pub const fn short_write_capacity(encoding: WordEncoding) -> usize {
    SHORT_WRITE_CAPACITY / encoding.width()
}

/// Build a regular command packet: header, then auxiliary control words
///
/// Control words beyond [`AUX_CONTROL_WORDS`] are dropped.
pub fn command_packet(header: &Header, aux: &[u16]) -> [u8; COMMAND_PACKET_SIZE] {
    let mut packet = [0u8; COMMAND_PACKET_SIZE];
    packet[..HEADER_SIZE].copy_from_slice(&header.to_word().to_le_bytes());
    for (i, word) in aux.iter().take(AUX_CONTROL_WORDS).enumerate() {
        let offset = HEADER_SIZE + 2 * i;
        packet[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
    }
    packet
}

/// Build a short-write packet: header with the short-write flag, then the
/// payload bytes
///
/// Payload beyond [`SHORT_WRITE_CAPACITY`] is dropped.
pub fn short_write_packet(header: &Header, payload: &[u8]) -> [u8; COMMAND_PACKET_SIZE] {
    let header = Header {
        short_write: true,
        ..*header
    };
    let mut packet = [0u8; COMMAND_PACKET_SIZE];
    packet[..HEADER_SIZE].copy_from_slice(&header.to_word().to_le_bytes());
    let n = payload.len().min(SHORT_WRITE_CAPACITY);
    packet[HEADER_SIZE..HEADER_SIZE + n].copy_from_slice(&payload[..n]);
    packet
}
