//! Simulated device
//!
//! Emulates the controller side of the command/data protocol: a command
//! packet selects a bank and direction, the following data transfer moves
//! the payload. Short-write packets update the bank directly.

use std::collections::HashMap;
use std::sync::Arc;

use mcareg_raw::wire::{Header, HEADER_SIZE};
use mcareg_raw::{BankAddress, MemoryTarget, OpcodeSpace, RegisterWords};
use parking_lot::Mutex;

use super::transport::{Endpoint, Transport, TransportError};

type BankKey = (OpcodeSpace, u8, MemoryTarget);

#[derive(Debug, Default)]
struct SimState {
    banks: HashMap<BankKey, Vec<u8>>,
    pending: Option<Header>,
    transcript: Vec<(Endpoint, Vec<u8>)>,
    disconnected: bool,
}

impl SimState {
    fn store(&mut self, header: &Header, payload: &[u8]) {
        let Some((space, _)) = OpcodeSpace::from_opcode(header.opcode) else {
            return;
        };
        let bank = self
            .banks
            .entry((space, header.address, header.memory))
            .or_default();
        if bank.len() < payload.len() {
            bank.resize(payload.len(), 0);
        }
        bank[..payload.len()].copy_from_slice(payload);
    }
}

/// In-memory device
///
/// Clones share state, so one handle can be given to the dispatcher while
/// another inspects what was written.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

fn key(address: BankAddress, memory: MemoryTarget) -> BankKey {
    (address.space, address.address, memory)
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store register words in a bank
    pub fn preload(&self, address: BankAddress, memory: MemoryTarget, words: &RegisterWords) {
        self.state
            .lock()
            .banks
            .insert(key(address, memory), words.to_le_bytes());
    }

    /// Raw bank contents, empty if the bank was never written
    pub fn stored(&self, address: BankAddress, memory: MemoryTarget) -> Vec<u8> {
        self.state
            .lock()
            .banks
            .get(&key(address, memory))
            .cloned()
            .unwrap_or_default()
    }

    /// Every buffer written to the device, in order
    pub fn transcript(&self) -> Vec<(Endpoint, Vec<u8>)> {
        self.state.lock().transcript.clone()
    }

    /// Headers of the packets written to the command endpoint
    pub fn headers(&self) -> Vec<Header> {
        self.state
            .lock()
            .transcript
            .iter()
            .filter(|(endpoint, _)| *endpoint == Endpoint::Command)
            .filter_map(|(_, packet)| Header::from_packet(packet).ok())
            .collect()
    }

    /// Fail every subsequent transfer
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }
}

impl Transport for SimDevice {
    fn write_bytes(&mut self, endpoint: Endpoint, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.transcript.push((endpoint, bytes.to_vec()));

        match endpoint {
            Endpoint::Command => {
                let header = Header::from_packet(bytes)
                    .map_err(|e| TransportError::Rejected(e.to_string()))?;
                if OpcodeSpace::from_opcode(header.opcode).is_none() {
                    return Err(TransportError::Rejected(format!(
                        "unknown opcode {}",
                        header.opcode
                    )));
                }

                tracing::debug!(
                    "Sim command: opcode {} address {} memory {} bytes {}",
                    header.opcode,
                    header.address,
                    header.memory.name(),
                    header.byte_count
                );

                if header.short_write {
                    let start = HEADER_SIZE.min(bytes.len());
                    let end = (HEADER_SIZE + header.byte_count as usize).min(bytes.len());
                    state.store(&header, &bytes[start..end]);
                    state.pending = None;
                } else {
                    state.pending = Some(header);
                }
                Ok(())
            }
            Endpoint::Data => {
                let header = state.pending.take().ok_or_else(|| {
                    TransportError::Rejected("data write without a pending command".to_string())
                })?;
                if let Some((space, false)) = OpcodeSpace::from_opcode(header.opcode) {
                    if space != OpcodeSpace::Ping {
                        return Err(TransportError::Rejected(
                            "data write after a read command".to_string(),
                        ));
                    }
                }
                let n = (header.byte_count as usize).min(bytes.len());
                state.store(&header, &bytes[..n]);
                Ok(())
            }
        }
    }

    fn read_bytes(&mut self, endpoint: Endpoint, count: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        if endpoint == Endpoint::Command {
            return Err(TransportError::Rejected(
                "command endpoint is write-only".to_string(),
            ));
        }

        let header = state.pending.take().ok_or_else(|| {
            TransportError::Rejected("data read without a pending command".to_string())
        })?;
        let space = match OpcodeSpace::from_opcode(header.opcode) {
            Some((space, false)) => space,
            _ => {
                return Err(TransportError::Rejected(
                    "data read after a write command".to_string(),
                ))
            }
        };

        let mut out = state
            .banks
            .get(&(space, header.address, header.memory))
            .map(|bank| bank.iter().copied().take(count).collect::<Vec<_>>())
            .unwrap_or_default();
        out.resize(count, 0);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcareg_raw::wire::{command_packet, short_write_packet, COMMAND_PACKET_SIZE};
    use mcareg_raw::WordEncoding;

    fn header(opcode: u8, byte_count: u16) -> Header {
        Header {
            opcode,
            address: 2,
            short_write: false,
            memory: MemoryTarget::Volatile,
            byte_count,
        }
    }

    #[test]
    fn test_read_preloaded_bank() {
        let mut sim = SimDevice::new();
        let words = RegisterWords::U16(vec![1, 2, 3]);
        sim.preload(
            BankAddress::new(2, OpcodeSpace::Fpga),
            MemoryTarget::Volatile,
            &words,
        );

        sim.write_bytes(Endpoint::Command, &command_packet(&header(2, 8), &[]))
            .unwrap();
        let bytes = sim.read_bytes(Endpoint::Data, 8).unwrap();
        assert_eq!(bytes, vec![1, 0, 2, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_data_write_stores_declared_bytes() {
        let mut sim = SimDevice::new();
        sim.write_bytes(Endpoint::Command, &command_packet(&header(1, 4), &[]))
            .unwrap();
        sim.write_bytes(Endpoint::Data, &[9, 0, 8, 0, 0xFF, 0xFF]).unwrap();

        let stored = sim.stored(BankAddress::new(2, OpcodeSpace::Fpga), MemoryTarget::Volatile);
        assert_eq!(stored, vec![9, 0, 8, 0]);
        assert_eq!(sim.transcript().len(), 2);
    }

    #[test]
    fn test_short_write_updates_bank() {
        let mut sim = SimDevice::new();
        let packet = short_write_packet(&header(1, 2), &[0x34, 0x12]);
        assert_eq!(packet.len(), COMMAND_PACKET_SIZE);
        sim.write_bytes(Endpoint::Command, &packet).unwrap();

        let stored = sim.stored(BankAddress::new(2, OpcodeSpace::Fpga), MemoryTarget::Volatile);
        let words = RegisterWords::from_le_bytes(WordEncoding::U16, &stored);
        assert_eq!(words, RegisterWords::U16(vec![0x1234]));
        assert!(sim.headers()[0].short_write);
    }

    #[test]
    fn test_out_of_order_transfers_rejected() {
        let mut sim = SimDevice::new();
        assert!(matches!(
            sim.write_bytes(Endpoint::Data, &[0; 4]),
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            sim.read_bytes(Endpoint::Data, 4),
            Err(TransportError::Rejected(_))
        ));

        sim.write_bytes(Endpoint::Command, &command_packet(&header(2, 4), &[]))
            .unwrap();
        assert!(matches!(
            sim.write_bytes(Endpoint::Data, &[0; 4]),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn test_disconnect() {
        let mut sim = SimDevice::new();
        let observer = sim.clone();
        observer.disconnect();
        assert!(matches!(
            sim.write_bytes(Endpoint::Command, &[0; 64]),
            Err(TransportError::Disconnected)
        ));
    }
}
