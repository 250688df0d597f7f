//! Banks served by the ARM slow-control processor
//!
//! These banks hold 32-bit words; status, control and calibration words are
//! IEEE floats.

use serde::{Deserialize, Serialize};

use crate::bits::bcd_version;
use crate::register::{padded, BankAddress, Empty, Invertible, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const PING_REGISTERS: usize = 16;
pub const VERSION_REGISTERS: usize = 16;
pub const STATUS_REGISTERS: usize = 16;
pub const ARM_CTRL_REGISTERS: usize = 12;
pub const CAL_REGISTERS: usize = 64;

/// Entries per calibration lookup table
pub const LUT_ENTRIES: usize = 20;

/// Link test bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmPing;

impl RegisterMap for ArmPing {
    type Word = u32;
    type Fields = Empty;
    type User = Empty;

    const NAME: &'static str = "arm_ping";
    const REGISTER_COUNT: usize = PING_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::ARM_PING, OpcodeSpace::Ping);

    fn decode(_words: &[u32]) -> Empty {
        Empty {}
    }

    fn encode(_fields: &Empty) -> Vec<u32> {
        vec![0; PING_REGISTERS]
    }

    fn fields_to_user(_fields: &Empty, _sampling_rate: f64) -> Empty {
        Empty {}
    }
}

/// Hardware, software and firmware identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmVersion;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFields {
    /// Byte 0: MCA type, byte 1: 1 PMT, 2 SiPM
    pub mca_id: u32,
    pub short_sn: u32,
    pub unique_sn_0: u32,
    pub unique_sn_1: u32,
    pub unique_sn_2: u32,
    pub unique_sn_3: u32,
    /// BCD, 0x0100 is 1.0
    pub arm_hw: u32,
    /// BCD, 0x0100 is 1.0
    pub arm_sw: u32,
    pub arm_build: u32,
    pub arm_custom_0: u32,
    pub arm_custom_1: u32,
    pub fpga_version: u32,
    pub fpga_build: u32,
    pub fpga_custom_0: u32,
    pub fpga_custom_1: u32,
    /// MHz
    pub fpga_speed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionUser {
    pub unique_sn: String,
    pub fpga_speed: f64,
    pub arm_hw: String,
    pub arm_sw: String,
}

impl RegisterMap for ArmVersion {
    type Word = u32;
    type Fields = VersionFields;
    type User = VersionUser;

    const NAME: &'static str = "arm_version";
    const REGISTER_COUNT: usize = VERSION_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::ARM_VERSION, OpcodeSpace::Arm);

    fn decode(words: &[u32]) -> VersionFields {
        let r = padded(words, VERSION_REGISTERS);
        VersionFields {
            mca_id: r[0],
            short_sn: r[1],
            unique_sn_0: r[2],
            unique_sn_1: r[3],
            unique_sn_2: r[4],
            unique_sn_3: r[5],
            arm_hw: r[6],
            arm_sw: r[7],
            arm_build: r[8],
            arm_custom_0: r[9],
            arm_custom_1: r[10],
            fpga_version: r[11],
            fpga_build: r[12],
            fpga_custom_0: r[13],
            fpga_custom_1: r[14],
            fpga_speed: r[15],
        }
    }

    fn encode(f: &VersionFields) -> Vec<u32> {
        vec![
            f.mca_id,
            f.short_sn,
            f.unique_sn_0,
            f.unique_sn_1,
            f.unique_sn_2,
            f.unique_sn_3,
            f.arm_hw,
            f.arm_sw,
            f.arm_build,
            f.arm_custom_0,
            f.arm_custom_1,
            f.fpga_version,
            f.fpga_build,
            f.fpga_custom_0,
            f.fpga_custom_1,
            f.fpga_speed,
        ]
    }

    fn fields_to_user(f: &VersionFields, _sampling_rate: f64) -> VersionUser {
        VersionUser {
            unique_sn: format!(
                "{:X}{:X}{:X}{:X}",
                f.unique_sn_0, f.unique_sn_1, f.unique_sn_2, f.unique_sn_3
            ),
            fpga_speed: f.fpga_speed as f64 * 1.0e6,
            arm_hw: bcd_version(f.arm_hw),
            arm_sw: bcd_version(f.arm_sw),
        }
    }
}

/// Slow-control telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusFields {
    /// SiPM operating voltage
    pub op_voltage: f32,
    pub voltage_target: f32,
    /// Voltage set by the DAC
    pub set_voltage: f32,
    pub cpu_temperature: f32,
    pub x_temperature: f32,
    pub avg_temperature: f32,
    pub dg_target: f32,
    pub led_target: f32,
    pub wall_clock_time: f32,
    pub op_status: f32,
    pub supply_voltage: f32,
    /// FPGA reboots since power on
    pub fpga_count: f32,
    pub led_value: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUser {
    pub fpga_status: u8,
}

impl RegisterMap for ArmStatus {
    type Word = f32;
    type Fields = StatusFields;
    type User = StatusUser;

    const NAME: &'static str = "arm_status";
    const REGISTER_COUNT: usize = STATUS_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::ARM_STATUS, OpcodeSpace::Arm);

    fn decode(words: &[f32]) -> StatusFields {
        let r = padded(words, STATUS_REGISTERS);
        StatusFields {
            op_voltage: r[0],
            voltage_target: r[1],
            set_voltage: r[2],
            cpu_temperature: r[3],
            x_temperature: r[4],
            avg_temperature: r[5],
            dg_target: r[6],
            led_target: r[7],
            wall_clock_time: r[8],
            op_status: r[9],
            supply_voltage: r[10],
            fpga_count: r[11],
            led_value: r[12],
        }
    }

    fn encode(f: &StatusFields) -> Vec<f32> {
        let mut r = vec![
            f.op_voltage,
            f.voltage_target,
            f.set_voltage,
            f.cpu_temperature,
            f.x_temperature,
            f.avg_temperature,
            f.dg_target,
            f.led_target,
            f.wall_clock_time,
            f.op_status,
            f.supply_voltage,
            f.fpga_count,
            f.led_value,
        ];
        r.resize(STATUS_REGISTERS, 0.0);
        r
    }

    fn fields_to_user(f: &StatusFields, _sampling_rate: f64) -> StatusUser {
        StatusUser {
            fpga_status: (f.op_status as i64 & 1) as u8,
        }
    }
}

/// Slow-control settings: gain stabilization, cooling, calibration point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmCtrl;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmCtrlFields {
    /// 0 off, 1 LUT, 2 LED, 3 ROI
    pub gain_stabilization: f32,
    /// Peltier power limit, percent
    pub peltier: f32,
    pub temp_ctrl: f32,
    pub temp_target: f32,
    pub temp_period: f32,
    pub temp_weight: f32,
    pub cal_temp: f32,
    pub cal_ov: f32,
    pub cal_dg: f32,
    pub cal_target: f32,
    pub cal_scint: f32,
    pub cal_par_0: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCtrlUser {
    pub gs_mode: u8,
}

impl RegisterMap for ArmCtrl {
    type Word = f32;
    type Fields = ArmCtrlFields;
    type User = ArmCtrlUser;

    const NAME: &'static str = "arm_ctrl";
    const REGISTER_COUNT: usize = ARM_CTRL_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::ARM_CTRL, OpcodeSpace::Arm);

    fn decode(words: &[f32]) -> ArmCtrlFields {
        let r = padded(words, ARM_CTRL_REGISTERS);
        ArmCtrlFields {
            gain_stabilization: r[0].trunc(),
            peltier: r[1],
            temp_ctrl: r[2],
            temp_target: r[3],
            temp_period: r[4],
            temp_weight: r[5],
            cal_temp: r[6],
            cal_ov: r[7],
            cal_dg: r[8],
            cal_target: r[9],
            cal_scint: r[10],
            cal_par_0: r[11],
        }
    }

    fn encode(f: &ArmCtrlFields) -> Vec<f32> {
        vec![
            f.gain_stabilization,
            f.peltier,
            f.temp_ctrl,
            f.temp_target,
            f.temp_period,
            f.temp_weight,
            f.cal_temp,
            f.cal_ov,
            f.cal_dg,
            f.cal_target,
            f.cal_scint,
            f.cal_par_0,
        ]
    }

    fn fields_to_user(f: &ArmCtrlFields, _sampling_rate: f64) -> ArmCtrlUser {
        ArmCtrlUser {
            gs_mode: (f.gain_stabilization as i64 & 0xF) as u8,
        }
    }
}

impl Invertible for ArmCtrl {
    fn user_to_fields(user: &ArmCtrlUser, prior: &ArmCtrlFields, _sampling_rate: f64) -> ArmCtrlFields {
        ArmCtrlFields {
            gain_stabilization: (user.gs_mode & 0xF) as f32,
            ..*prior
        }
    }
}

/// Temperature calibration lookup tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmCal;

/// | Word  | Field    |
/// |-------|----------|
/// | 0     | lut_len  |
/// | 1     | lut_tmin |
/// | 2     | lut_dt   |
/// | 3-22  | lut_ov   |
/// | 23-42 | lut_dg   |
/// | 43-62 | lut_led  |
/// | 63    | lut_mode |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalFields {
    pub lut_len: f32,
    /// Lowest table temperature, °C
    pub lut_tmin: f32,
    /// Temperature step, °C
    pub lut_dt: f32,
    /// Operating voltage change per step
    pub lut_ov: Vec<f32>,
    /// Digital gain change per step
    pub lut_dg: Vec<f32>,
    /// LED target change per step
    pub lut_led: Vec<f32>,
    /// Bit 0 locks the table
    pub lut_mode: f32,
}

const LUT_OV: usize = 3;
const LUT_DG: usize = LUT_OV + LUT_ENTRIES;
const LUT_LED: usize = LUT_DG + LUT_ENTRIES;
const LUT_MODE: usize = LUT_LED + LUT_ENTRIES;

impl RegisterMap for ArmCal {
    type Word = f32;
    type Fields = CalFields;
    type User = Empty;

    const NAME: &'static str = "arm_cal";
    const REGISTER_COUNT: usize = CAL_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::ARM_CAL, OpcodeSpace::Arm);

    fn decode(words: &[f32]) -> CalFields {
        let r = padded(words, CAL_REGISTERS);
        CalFields {
            lut_len: r[0],
            lut_tmin: r[1],
            lut_dt: r[2],
            lut_ov: r[LUT_OV..LUT_DG].to_vec(),
            lut_dg: r[LUT_DG..LUT_LED].to_vec(),
            lut_led: r[LUT_LED..LUT_MODE].to_vec(),
            lut_mode: r[LUT_MODE],
        }
    }

    fn encode(f: &CalFields) -> Vec<f32> {
        let mut r = vec![0.0f32; CAL_REGISTERS];
        r[0] = f.lut_len;
        r[1] = f.lut_tmin;
        r[2] = f.lut_dt;
        r[LUT_OV..LUT_DG].copy_from_slice(&padded(&f.lut_ov, LUT_ENTRIES));
        r[LUT_DG..LUT_LED].copy_from_slice(&padded(&f.lut_dg, LUT_ENTRIES));
        r[LUT_LED..LUT_MODE].copy_from_slice(&padded(&f.lut_led, LUT_ENTRIES));
        r[LUT_MODE] = f.lut_mode;
        r
    }

    fn fields_to_user(_fields: &CalFields, _sampling_rate: f64) -> Empty {
        Empty {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_carries_no_fields() {
        assert_eq!(ArmPing::decode(&[0xFFFF_FFFF; PING_REGISTERS]), Empty {});
        assert_eq!(ArmPing::encode(&Empty {}), vec![0; PING_REGISTERS]);
        assert_eq!(ArmPing::ADDRESS.space, OpcodeSpace::Ping);
    }

    #[test]
    fn test_version_user() {
        let mut words = vec![0u32; VERSION_REGISTERS];
        words[2..6].copy_from_slice(&[0xDEADBEEF, 0x1, 0xABC, 0x12345678]);
        words[6] = 0x0100;
        words[7] = 0x0212;
        words[15] = 40;

        let fields = ArmVersion::decode(&words);
        assert_eq!(ArmVersion::encode(&fields), words);

        let user = ArmVersion::fields_to_user(&fields, 40e6);
        assert_eq!(user.unique_sn, "DEADBEEF1ABC12345678");
        assert_eq!(user.arm_hw, "1.0");
        assert_eq!(user.arm_sw, "2.12");
        assert_eq!(user.fpga_speed, 40e6);
    }

    #[test]
    fn test_status_fpga_bit() {
        let mut words = vec![0.0f32; STATUS_REGISTERS];
        words[9] = 3.0;
        let fields = ArmStatus::decode(&words);
        assert_eq!(ArmStatus::fields_to_user(&fields, 40e6).fpga_status, 1);
        assert_eq!(ArmStatus::encode(&fields), words);
    }

    #[test]
    fn test_arm_ctrl_gs_mode() {
        let mut words = vec![0.0f32; ARM_CTRL_REGISTERS];
        words[0] = 2.7;
        words[1] = 50.0;
        let fields = ArmCtrl::decode(&words);
        assert_eq!(fields.gain_stabilization, 2.0);

        let user = ArmCtrl::fields_to_user(&fields, 40e6);
        assert_eq!(user.gs_mode, 2);

        let updated = ArmCtrl::user_to_fields(&ArmCtrlUser { gs_mode: 0x11 }, &fields, 40e6);
        assert_eq!(updated.gain_stabilization, 1.0);
        assert_eq!(updated.peltier, 50.0);
    }

    #[test]
    fn test_cal_tables() {
        let words: Vec<f32> = (0..CAL_REGISTERS).map(|i| i as f32).collect();
        let fields = ArmCal::decode(&words);
        assert_eq!(fields.lut_ov.len(), LUT_ENTRIES);
        assert_eq!(fields.lut_ov[0], 3.0);
        assert_eq!(fields.lut_dg[0], 23.0);
        assert_eq!(fields.lut_led[19], 62.0);
        assert_eq!(fields.lut_mode, 63.0);
        assert_eq!(ArmCal::encode(&fields), words);
    }
}
