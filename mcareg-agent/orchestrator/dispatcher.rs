// Runs commands against devices, one transaction at a time
//
// Every command resolves the device family and bank, then performs the
// read, write, short-write or read-modify-write sequence on the device's
// transport. A failure is reported for that device only.

use std::sync::Arc;

use mcareg_raw::wire::{self, Header, COMMAND_PACKET_SIZE};
use mcareg_raw::{Bank, MemoryTarget, RegisterError, RegisterMapKind, RegisterWords};

use crate::common::device::DeviceHandle;
use crate::common::transport::{Endpoint, Transport, TransportError};
use crate::config::DispatchConfig;
use crate::error::{McaError, Result};
use crate::orchestrator::command::{Command, Direction};
use crate::prom::dispatch::{DispatchMetrics, Flow};

/// Smallest buffer sent to the data endpoint
const MIN_DATA_TRANSFER: usize = COMMAND_PACKET_SIZE;

enum Selection {
    Device(usize),
    Missing(String),
}

fn select(command: &Command, devices: &[DeviceHandle]) -> Vec<Selection> {
    match command.sn.as_ref().and_then(|targets| targets.serials()) {
        None => (0..devices.len()).map(Selection::Device).collect(),
        Some(serials) => serials
            .iter()
            .map(|serial| {
                devices
                    .iter()
                    .position(|device| &device.serial == serial)
                    .map(Selection::Device)
                    .unwrap_or_else(|| Selection::Missing(serial.clone()))
            })
            .collect(),
    }
}

/// The first `items` words of the command's register data
///
/// Fewer values than words to send is an error; nothing is zero-filled.
fn register_data(command: &Command, kind: RegisterMapKind, items: usize) -> Result<RegisterWords> {
    if command.data.registers.len() < items {
        return Err(RegisterError::MissingField {
            field: format!("registers[{}]", command.data.registers.len()),
            command: kind.name(),
        }
        .into());
    }
    Ok(RegisterWords::from_values(kind.encoding(), &command.data.registers[..items]))
}

pub struct Dispatcher {
    config: DispatchConfig,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Apply `command` to each selected device in order
    ///
    /// Returns one result per selected serial. An unknown serial yields
    /// [`McaError::UnknownSerial`] for that entry only.
    pub fn process(
        &self,
        command: &Command,
        devices: &mut [DeviceHandle],
    ) -> Vec<(String, Result<Bank>)> {
        let mut results = Vec::new();

        for selection in select(command, devices) {
            let (serial, result) = match selection {
                Selection::Device(index) => {
                    let device = &mut devices[index];
                    (device.serial.clone(), self.perform(command, device))
                }
                Selection::Missing(serial) => {
                    let err = McaError::UnknownSerial(serial.clone());
                    (serial, Err(err))
                }
            };

            if let Some(ref metrics) = self.metrics {
                metrics.transaction(command.dir.name(), &command.name);
                if let Err(ref e) = result {
                    metrics.error(e.kind());
                }
            }
            if let Err(ref e) = result {
                tracing::warn!(
                    "{} {} failed for {}: {}",
                    command.dir.name(),
                    command.name,
                    serial,
                    e
                );
            }

            results.push((serial, result));
        }

        results
    }

    /// Perform `command` on one device
    pub fn perform(&self, command: &Command, device: &mut DeviceHandle) -> Result<Bank> {
        let family = device.family()?;
        let kind = family.resolve(&command.name)?;
        let items = self.item_count(command, kind);

        tracing::info!(
            "{} {} ({} words, {}) on {} [{}]",
            command.dir.name(),
            kind.name(),
            items,
            command.memory.name(),
            device.serial,
            family.name()
        );

        match command.dir {
            Direction::Read => self.read(command, device, kind, items),
            Direction::Write => {
                let registers = register_data(command, kind, items)?;
                self.write(command, device, kind, &registers)?;
                Ok(kind.decode(registers, device.sampling_rate)?)
            }
            Direction::ShortWrite => {
                let capacity = wire::short_write_capacity(kind.encoding());
                if items > capacity {
                    tracing::warn!(
                        "Short write of {} holds {} words, clamping from {}",
                        kind.name(),
                        capacity,
                        items
                    );
                }
                let registers = register_data(command, kind, items.min(capacity))?;
                self.short_write(command, device, kind, &registers)?;
                Ok(kind.decode(registers, device.sampling_rate)?)
            }
            Direction::Rmw => {
                let mut bank = self.read(command, device, kind, items)?;
                if !command.data.fields.is_empty() {
                    bank.apply_fields(&command.data.fields)?;
                }
                if !command.data.user.is_empty() {
                    bank.apply_user(&command.data.user)?;
                }
                self.write(command, device, kind, &bank.registers().resized(items))?;
                Ok(bank)
            }
            Direction::FieldsToUser => {
                let mut bank = self.read(command, device, kind, items)?;
                if !command.data.fields.is_empty() {
                    bank.apply_fields(&command.data.fields)?;
                }
                Ok(bank)
            }
            Direction::UserToFields => {
                let mut bank = self.read(command, device, kind, items)?;
                if !command.data.user.is_empty() {
                    bank.apply_user(&command.data.user)?;
                }
                Ok(bank)
            }
        }
    }

    /// Requested word count, defaulting to and capped at the bank size
    fn item_count(&self, command: &Command, kind: RegisterMapKind) -> usize {
        let count = kind.register_count();
        match command.num_items {
            0 => count,
            n if n > count => {
                tracing::warn!(
                    "{} has {} registers, clamping num_items {}",
                    kind.name(),
                    count,
                    n
                );
                count
            }
            n => n,
        }
    }

    fn header(&self, command: &Command, kind: RegisterMapKind, opcode: u8, items: usize) -> Header {
        Header {
            opcode,
            address: kind.address().address,
            short_write: false,
            memory: command.memory,
            byte_count: wire::byte_count(items, kind.encoding()),
        }
    }

    fn send(&self, device: &mut DeviceHandle, endpoint: Endpoint, bytes: &[u8]) -> Result<()> {
        device.transport.write_bytes(endpoint, bytes)?;
        if let Some(ref metrics) = self.metrics {
            metrics.transfer(endpoint, Flow::Out, bytes.len());
        }
        Ok(())
    }

    fn send_command(&self, command: &Command, device: &mut DeviceHandle, header: &Header) -> Result<()> {
        let packet = wire::command_packet(header, &command.aux_words(self.config.aux_words));
        tracing::debug!(
            "Command to {}: header 0x{:08x}, {} payload bytes",
            device.serial,
            header.to_word(),
            header.byte_count
        );
        self.send(device, Endpoint::Command, &packet)
    }

    fn read(
        &self,
        command: &Command,
        device: &mut DeviceHandle,
        kind: RegisterMapKind,
        items: usize,
    ) -> Result<Bank> {
        let encoding = kind.encoding();
        let header = self.header(command, kind, kind.address().space.read_opcode(), items);
        self.send_command(command, device, &header)?;

        let expected = items * encoding.width();
        let bytes = device.transport.read_bytes(Endpoint::Data, expected)?;
        if bytes.len() < expected {
            return Err(TransportError::ShortRead {
                endpoint: Endpoint::Data,
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        if let Some(ref metrics) = self.metrics {
            metrics.transfer(Endpoint::Data, Flow::In, bytes.len());
        }
        tracing::debug!("Read {} bytes of {} from {}", bytes.len(), kind.name(), device.serial);

        let words = RegisterWords::from_le_bytes(encoding, &bytes[..expected]);
        Ok(kind.decode(words, device.sampling_rate)?)
    }

    fn write(
        &self,
        command: &Command,
        device: &mut DeviceHandle,
        kind: RegisterMapKind,
        registers: &RegisterWords,
    ) -> Result<()> {
        let header = self.header(
            command,
            kind,
            kind.address().space.write_opcode(),
            registers.len(),
        );
        self.send_command(command, device, &header)?;

        let mut payload = registers.to_le_bytes();
        payload.resize(payload.len().max(MIN_DATA_TRANSFER), 0);
        self.send(device, Endpoint::Data, &payload)?;
        tracing::debug!(
            "Wrote {} bytes of {} to {}",
            header.byte_count,
            kind.name(),
            device.serial
        );

        if command.memory == MemoryTarget::NonVolatile {
            tracing::debug!(
                "Waiting {:?} for {} to commit flash",
                self.config.flash_settle,
                device.serial
            );
            if let Some(ref metrics) = self.metrics {
                metrics.flash_settle();
            }
            std::thread::sleep(self.config.flash_settle);
        }
        Ok(())
    }

    fn short_write(
        &self,
        command: &Command,
        device: &mut DeviceHandle,
        kind: RegisterMapKind,
        registers: &RegisterWords,
    ) -> Result<()> {
        let header = Header {
            short_write: true,
            ..self.header(
                command,
                kind,
                kind.address().space.write_opcode(),
                registers.len(),
            )
        };
        let packet = wire::short_write_packet(&header, &registers.to_le_bytes());
        tracing::debug!(
            "Short write to {}: header 0x{:08x}, {} payload bytes",
            device.serial,
            header.to_word(),
            header.byte_count
        );
        self.send(device, Endpoint::Command, &packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimDevice;
    use mcareg_raw::wire::opcode;
    use mcareg_raw::WordEncoding;
    use serde_json::{json, Map, Value};
    use std::time::{Duration, Instant};

    const MCA3K: u16 = 0x103;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatchConfig::new().with_flash_settle(Duration::ZERO))
    }

    fn device(serial: &str, device_type: u16) -> (DeviceHandle, SimDevice) {
        let sim = SimDevice::new();
        let handle = DeviceHandle::new(serial, device_type, Box::new(sim.clone()));
        (handle, sim)
    }

    fn stored_words(sim: &SimDevice, kind: RegisterMapKind, memory: MemoryTarget) -> RegisterWords {
        RegisterWords::from_le_bytes(kind.encoding(), &sim.stored(kind.address(), memory))
    }

    #[test]
    fn test_read() {
        let (mut handle, sim) = device("a", MCA3K);
        let kind = RegisterMapKind::FpgaCtrl;
        let mut words = vec![0u16; 16];
        words[4] = 80;
        sim.preload(kind.address(), MemoryTarget::Volatile, &RegisterWords::U16(words.clone()));

        let command = Command::read("fpga_ctrl").with_ctrl(vec![0x1_0005]);
        let bank = dispatcher().perform(&command, &mut handle).unwrap();
        assert_eq!(bank.registers(), RegisterWords::U16(words));
        assert_eq!(bank.fields_json().unwrap()["integration_time"], json!(80));

        let transcript = sim.transcript();
        assert_eq!(transcript.len(), 1);
        let (endpoint, packet) = &transcript[0];
        assert_eq!(*endpoint, Endpoint::Command);
        assert_eq!(packet.len(), COMMAND_PACKET_SIZE);
        assert_eq!(&packet[4..6], &[5, 0]);

        let header = sim.headers()[0];
        assert_eq!(header.opcode, opcode::FPGA_READ);
        assert_eq!(header.address, 0);
        assert_eq!(header.byte_count, 32);
    }

    #[test]
    fn test_num_items_clamped() {
        let (mut handle, sim) = device("a", MCA3K);
        let command = Command::read("fpga_action").with_num_items(100);
        dispatcher().perform(&command, &mut handle).unwrap();
        assert_eq!(sim.headers()[0].byte_count, 8);
    }

    #[test]
    fn test_write_decodes_written_registers() {
        let (mut handle, sim) = device("a", MCA3K);
        let kind = RegisterMapKind::FpgaAction;
        let command = Command::write("fpga_action", vec![3.0, 0.0, 5.0, 0.0]);
        let bank = dispatcher().perform(&command, &mut handle).unwrap();

        assert_eq!(bank.registers(), RegisterWords::U16(vec![3, 0, 5, 0]));
        let fields = bank.fields_json().unwrap();
        assert_eq!(fields["clear_histogram"], json!(1));
        assert_eq!(fields["histo_run"], json!(1));

        let transcript = sim.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].0, Endpoint::Data);
        assert_eq!(transcript[1].1.len(), MIN_DATA_TRANSFER);
        assert_eq!(
            stored_words(&sim, kind, MemoryTarget::Volatile),
            RegisterWords::U16(vec![3, 0, 5, 0])
        );
    }

    fn preloaded_ctrl() -> (DeviceHandle, SimDevice, RegisterWords) {
        let (handle, sim) = device("a", MCA3K);
        let mut words = vec![0u16; 16];
        words[0] = 20000;
        words[4] = 80;
        let words = RegisterWords::U16(words);
        sim.preload(RegisterMapKind::FpgaCtrl.address(), MemoryTarget::Volatile, &words);
        (handle, sim, words)
    }

    #[test]
    fn test_write_requires_register_data() {
        let (mut handle, sim, words) = preloaded_ctrl();

        let result = dispatcher().perform(&Command::write("fpga_ctrl", vec![]), &mut handle);
        match result {
            Err(McaError::RegisterError(RegisterError::MissingField { field, command })) => {
                assert_eq!(field, "registers[0]");
                assert_eq!(command, "fpga_ctrl");
            }
            other => panic!("expected missing register data: {other:?}"),
        }

        let command = Command::write("fpga_ctrl", vec![1.0; 15]);
        assert!(matches!(
            dispatcher().perform(&command, &mut handle),
            Err(McaError::RegisterError(RegisterError::MissingField { .. }))
        ));

        assert!(sim.transcript().is_empty());
        assert_eq!(
            stored_words(&sim, RegisterMapKind::FpgaCtrl, MemoryTarget::Volatile),
            words
        );
    }

    #[test]
    fn test_write_sends_requested_items_only() {
        let (mut handle, sim, _) = preloaded_ctrl();
        let command = Command::write("fpga_ctrl", vec![7.0, 9.0]).with_num_items(2);
        dispatcher().perform(&command, &mut handle).unwrap();
        assert_eq!(sim.headers()[0].byte_count, 4);
    }

    #[test]
    fn test_short_write_requires_register_data() {
        let (mut handle, sim, words) = preloaded_ctrl();

        let command = Command::short_write("fpga_ctrl", vec![1.0, 2.0]);
        match dispatcher().perform(&command, &mut handle) {
            Err(McaError::RegisterError(RegisterError::MissingField { field, .. })) => {
                assert_eq!(field, "registers[2]");
            }
            other => panic!("expected missing register data: {other:?}"),
        }

        assert!(sim.transcript().is_empty());
        assert_eq!(
            stored_words(&sim, RegisterMapKind::FpgaCtrl, MemoryTarget::Volatile),
            words
        );
    }

    #[test]
    fn test_flash_write_waits() {
        let (mut handle, sim) = device("a", MCA3K);
        let dispatcher =
            Dispatcher::new(DispatchConfig::new().with_flash_settle(Duration::from_millis(20)));
        let command = Command::write("arm_ctrl", vec![1.0; 12]).with_memory(MemoryTarget::NonVolatile);

        let start = Instant::now();
        dispatcher.perform(&command, &mut handle).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));

        let kind = RegisterMapKind::ArmCtrl;
        assert_eq!(
            stored_words(&sim, kind, MemoryTarget::NonVolatile),
            RegisterWords::F32(vec![1.0; 12])
        );
        assert!(sim.stored(kind.address(), MemoryTarget::Volatile).is_empty());
        assert_eq!(sim.headers()[0].memory, MemoryTarget::NonVolatile);
    }

    #[test]
    fn test_short_write_clamps_to_packet() {
        let (mut handle, sim) = device("a", MCA3K);
        let registers = (0..32).map(f64::from).collect::<Vec<_>>();
        let command = Command::short_write("fpga_results", registers);
        let bank = dispatcher().perform(&command, &mut handle).unwrap();

        let header = sim.headers()[0];
        assert!(header.short_write);
        assert_eq!(header.opcode, opcode::FPGA_WRITE);
        assert_eq!(header.byte_count, 60);
        assert_eq!(sim.transcript().len(), 1);

        let stored = stored_words(&sim, RegisterMapKind::FpgaResults, MemoryTarget::Volatile);
        assert_eq!(stored.len(), 30);
        assert_eq!(stored.to_values()[29], 29.0);

        // Decoded bank is zero-padded to the full size
        assert_eq!(bank.registers().len(), 32);
        assert_eq!(bank.registers().to_values()[30], 0.0);
    }

    #[test]
    fn test_rmw_applies_fields_then_user() {
        let (mut handle, sim) = device("a", MCA3K);
        let kind = RegisterMapKind::FpgaCtrl;
        sim.preload(kind.address(), MemoryTarget::Volatile, &RegisterWords::zeroed(WordEncoding::U16, 16));

        let command = Command::rmw("fpga_ctrl")
            .with_fields(object(json!({"integration_time": 100, "led_on": 1})))
            .with_user(object(json!({"integration_time": 5e-6})));
        let bank = dispatcher().perform(&command, &mut handle).unwrap();

        let stored = stored_words(&sim, kind, MemoryTarget::Volatile);
        assert_eq!(stored, bank.registers());
        let RegisterWords::U16(words) = stored else {
            panic!("fpga_ctrl is a 16-bit bank");
        };
        // User update wins where both touch the same field
        assert_eq!(words[4], 200);
        // Field-only changes survive the user update
        assert_eq!(words[15] & 0x8, 0x8);

        let headers = sim.headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].opcode, opcode::FPGA_READ);
        assert_eq!(headers[1].opcode, opcode::FPGA_WRITE);
    }

    #[test]
    fn test_rmw_rejects_unknown_field() {
        let (mut handle, sim) = device("a", MCA3K);
        let command = Command::rmw("fpga_ctrl").with_fields(object(json!({"bogus": 1})));
        let result = dispatcher().perform(&command, &mut handle);
        assert!(matches!(
            result,
            Err(McaError::RegisterError(RegisterError::UnknownField { .. }))
        ));
        // Nothing written back
        assert_eq!(sim.headers().len(), 1);
    }

    #[test]
    fn test_sync_directions_never_write() {
        let (mut handle, sim) = device("a", MCA3K);

        let command = Command::new(Direction::FieldsToUser, "fpga_ctrl")
            .with_fields(object(json!({"integration_time": 40})));
        let bank = dispatcher().perform(&command, &mut handle).unwrap();
        let user = bank.user_json().unwrap();
        assert!((user["integration_time"].as_f64().unwrap() - 1e-6).abs() < 1e-15);

        let command = Command::new(Direction::UserToFields, "arm_ctrl")
            .with_user(object(json!({"gs_mode": 3})));
        let bank = dispatcher().perform(&command, &mut handle).unwrap();
        assert_eq!(bank.fields_json().unwrap()["gain_stabilization"], json!(3.0));

        assert!(sim
            .headers()
            .iter()
            .all(|h| h.opcode == opcode::FPGA_READ || h.opcode == opcode::ARM_READ));
    }

    #[test]
    fn test_user_update_on_decode_only_bank() {
        let (mut handle, _sim) = device("a", MCA3K);
        let command = Command::new(Direction::UserToFields, "fpga_statistics")
            .with_user(object(json!({"run_time": 1.0})));
        assert!(matches!(
            dispatcher().perform(&command, &mut handle),
            Err(McaError::RegisterError(RegisterError::NotInvertible { .. }))
        ));
    }

    #[test]
    fn test_failure_does_not_abort_other_devices() {
        let (unknown, _) = device("ftdi", 0x6001);
        let (counter, _) = device("counter", 0x005);
        let (mca, _) = device("mca", MCA3K);
        let mut devices = vec![unknown, counter, mca];

        let results = dispatcher().process(&Command::read("fpga_histogram"), &mut devices);
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].1, Err(McaError::UnknownDeviceType(0x6001))));
        assert!(matches!(results[1].1, Err(McaError::UnknownCommand { .. })));
        assert_eq!(results[2].0, "mca");
        assert!(results[2].1.is_ok());
    }

    #[test]
    fn test_serial_selection() {
        let (a, sim_a) = device("a", MCA3K);
        let (b, sim_b) = device("b", MCA3K);
        let mut devices = vec![a, b];

        let command = Command::read("fpga_ctrl").with_serials(["b", "missing"]);
        let results = dispatcher().process(&command, &mut devices);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "b");
        assert!(results[0].1.is_ok());
        assert!(matches!(&results[1].1, Err(McaError::UnknownSerial(s)) if s == "missing"));
        assert!(sim_a.transcript().is_empty());
        assert_eq!(sim_b.transcript().len(), 1);

        let results = dispatcher().process(&Command::read("fpga_ctrl"), &mut devices);
        let serials = results.iter().map(|(s, _)| s.as_str()).collect::<Vec<_>>();
        assert_eq!(serials, vec!["a", "b"]);
    }

    #[test]
    fn test_transport_error_propagates() {
        let (mut handle, sim) = device("a", MCA3K);
        sim.disconnect();
        assert!(matches!(
            dispatcher().perform(&Command::read("fpga_ctrl"), &mut handle),
            Err(McaError::TransportError(TransportError::Disconnected))
        ));
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(DispatchMetrics::new().unwrap());
        let dispatcher = dispatcher().with_metrics(Arc::clone(&metrics));
        let (a, _) = device("a", MCA3K);
        let mut devices = vec![a];

        dispatcher.process(&Command::read("fpga_action"), &mut devices);
        dispatcher.process(&Command::read("bogus"), &mut devices);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("mcareg_transactions_total{command=\"fpga_action\",direction=\"read\"} 1"));
        assert!(text.contains("mcareg_errors_total{kind=\"unknown_command\"} 1"));
        assert!(text.contains("mcareg_transfer_bytes_total{direction=\"in\",endpoint=\"data\"} 8"));
    }
}
