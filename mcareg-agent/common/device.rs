use std::collections::HashMap;

use mcareg_raw::{RegisterError, RegisterMapKind};
use once_cell::sync::Lazy;

use crate::common::transport::Transport;
use crate::error::{McaError, Result};

/// ADC sampling rate assumed when a device does not report one (Hz)
pub const DEFAULT_SAMPLING_RATE: f64 = 40.0e6;

enum_with_data! {
    /// Controller families, keyed by the device-type identifiers they report
    pub enum DeviceFamily: &'static [u16] {
        Counter => ("counter", &[0x100, 0x200]),
        Mca1k => ("mca1k", &[0x101, 0x201]),
        Mca3k => ("mca3k", &[0x103, 0x203]),
        Neutron3k => ("neutron3k", &[0x104, 0x204]),
        Counter3k => ("counter3k", &[0x005]),
    }
    impl device_types -> &'static [u16]
}

static FAMILY_BY_DEVICE_TYPE: Lazy<HashMap<u16, DeviceFamily>> = Lazy::new(|| {
    DeviceFamily::all()
        .into_iter()
        .flat_map(|family| {
            family
                .device_types()
                .iter()
                .map(move |&device_type| (device_type, family))
        })
        .collect()
});

impl DeviceFamily {
    pub fn from_device_type(device_type: u16) -> Result<Self> {
        FAMILY_BY_DEVICE_TYPE
            .get(&device_type)
            .copied()
            .ok_or(McaError::UnknownDeviceType(device_type))
    }

    /// Banks served by this family
    pub fn kinds(&self) -> &'static [RegisterMapKind] {
        use RegisterMapKind::*;

        match self {
            DeviceFamily::Counter | DeviceFamily::Mca1k => {
                &[ArmPing, ArmVersion, ArmStatus, ArmCtrl, ArmCal]
            }
            DeviceFamily::Mca3k => &[
                ArmPing,
                FpgaCtrl,
                FpgaAction,
                FpgaStatistics,
                FpgaResults,
                FpgaHistogram,
                FpgaListMode,
                FpgaLmNrl1,
                FpgaTrace,
                FpgaWeights,
                FpgaTimeSlice,
                ArmVersion,
                ArmStatus,
                ArmCtrl,
                ArmCal,
            ],
            DeviceFamily::Neutron3k => &[
                ArmPing,
                FpgaCtrl,
                FpgaAction,
                FpgaStatistics,
                FpgaResults,
                FpgaHistogram,
                FpgaTrace,
                FpgaWeights,
                ArmVersion,
                ArmStatus,
                ArmCtrl,
                ArmCal,
            ],
            DeviceFamily::Counter3k => &[
                ArmPing,
                FpgaCtrl,
                FpgaAction,
                FpgaStatistics,
                FpgaResults,
                ArmVersion,
                ArmStatus,
                ArmCtrl,
            ],
        }
    }

    /// Resolve a command name to one of this family's banks
    pub fn resolve(&self, command: &str) -> Result<RegisterMapKind> {
        let unknown = || McaError::UnknownCommand {
            command: command.to_string(),
            family: self.name(),
        };
        let kind = RegisterMapKind::from_name(command).map_err(|e| match e {
            RegisterError::UnknownCommand(_) => unknown(),
            other => McaError::from(other),
        })?;
        if self.kinds().contains(&kind) {
            Ok(kind)
        } else {
            Err(unknown())
        }
    }
}

/// One attached controller
pub struct DeviceHandle {
    pub serial: String,
    pub device_type: u16,
    /// ADC sampling rate in Hz, used for every time conversion
    pub sampling_rate: f64,
    pub transport: Box<dyn Transport + Send>,
}

impl DeviceHandle {
    pub fn new(
        serial: impl Into<String>,
        device_type: u16,
        transport: Box<dyn Transport + Send>,
    ) -> Self {
        Self {
            serial: serial.into(),
            device_type,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            transport,
        }
    }

    pub fn with_sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    pub fn family(&self) -> Result<DeviceFamily> {
        DeviceFamily::from_device_type(self.device_type)
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("serial", &self.serial)
            .field("device_type", &format_args!("0x{:04X}", self.device_type))
            .field("sampling_rate", &self.sampling_rate)
            .finish_non_exhaustive()
    }
}
