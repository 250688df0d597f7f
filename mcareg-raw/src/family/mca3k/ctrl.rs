//! FPGA control registers
//!
//! Sixteen 16-bit words configuring gain, thresholds, timing and the data
//! acquisition modes. This is the bank most often programmed from physical
//! units, so it implements [`Invertible`].

use serde::{Deserialize, Serialize};

use crate::bits::{seconds_to_ticks, ticks_to_seconds};
use crate::register::{padded, BankAddress, Invertible, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const CTRL_REGISTERS: usize = 16;

/// Reference clock for the digital gain scale
pub const GAIN_REFERENCE_RATE: f64 = 40.0e6;

/// Smallest normalized fine gain
pub const FINE_GAIN_MIN: f64 = 16384.0;

/// Control register bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaCtrl;

/// Control register fields
///
/// ## Register Format
///
/// | Reg  | Bits   | Field              |
/// |------|--------|--------------------|
/// | CR0  | 0-15   | fine_gain          |
/// | CR1  | 0-9    | baseline_threshold |
/// | CR1  | 10-15  | cr1_upper          |
/// | CR2  | 0-9    | pulse_threshold    |
/// | CR2  | 10-15  | cr2_upper          |
/// | CR3  | 0-15   | hold_off_time      |
/// | CR4  | 0-15   | integration_time   |
/// | CR5  | 0-15   | roi_bounds         |
/// | CR6  | 0-9    | trigger_delay      |
/// | CR6  | 10-15  | cr6_upper          |
/// | CR7  | 0-15   | ctrl_7             |
/// | CR8  | 0-15   | run_time_0         |
/// | CR9  | 0-15   | run_time_1         |
/// | CR10 | 0-15   | short_it           |
/// | CR11 | 0-15   | put                |
/// | CR12 | 0-3    | ecomp              |
/// | CR12 | 4-7    | pcomp              |
/// | CR12 | 8-11   | gain_select        |
/// | CR12 | 12-15  | cr12_upper         |
/// | CR13 | 0-15   | ctrl_13            |
/// | CR14 | 0-7    | led_repeat_time    |
/// | CR14 | 8-15   | led_pulse_width    |
/// | CR15 | 0      | ha_mode            |
/// | CR15 | 1      | trace_mode         |
/// | CR15 | 2      | lm_mode            |
/// | CR15 | 3      | led_on             |
/// | CR15 | 4-5    | rtlt               |
/// | CR15 | 6      | sel_led            |
/// | CR15 | 7      | daq_mode           |
/// | CR15 | 8      | nai_mode           |
/// | CR15 | 9      | psd_on             |
/// | CR15 | 10     | psd_select         |
/// | CR15 | 11-15  | cr15_upper         |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtrlFields {
    pub fine_gain: u16,
    pub baseline_threshold: u16,
    pub cr1_upper: u8,
    pub pulse_threshold: u16,
    pub cr2_upper: u8,
    pub hold_off_time: u16,
    pub integration_time: u16,
    pub roi_bounds: u16,
    pub trigger_delay: u16,
    pub cr6_upper: u8,
    pub ctrl_7: u16,
    pub run_time_0: u16,
    pub run_time_1: u16,
    pub short_it: u16,
    pub put: u16,
    pub ecomp: u8,
    pub pcomp: u8,
    pub gain_select: u8,
    pub cr12_upper: u8,
    pub ctrl_13: u16,
    pub led_repeat_time: u8,
    pub led_pulse_width: u8,
    /// 0 energy, 1 amplitude histogram
    pub ha_mode: u8,
    /// 0 triggered, 1 validated trace
    pub trace_mode: u8,
    /// 0 energy + 32-bit time, 1 energy + short sum + 16-bit time
    pub lm_mode: u8,
    pub led_on: u8,
    pub rtlt: u8,
    pub sel_led: u8,
    pub daq_mode: u8,
    pub nai_mode: u8,
    pub psd_on: u8,
    pub psd_select: u8,
    pub cr15_upper: u8,
}

/// Control settings in SI units: seconds, volts, MCA bins
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CtrlUser {
    pub digital_gain: f64,
    pub integration_time: f64,
    pub hold_off_time: f64,
    pub short_it: f64,
    pub baseline_threshold: f64,
    pub pulse_threshold: f64,
    pub trigger_delay: f64,
    pub roi_low: u32,
    pub roi_high: u32,
    pub run_time: f64,
}

impl RegisterMap for FpgaCtrl {
    type Word = u16;
    type Fields = CtrlFields;
    type User = CtrlUser;

    const NAME: &'static str = "fpga_ctrl";
    const REGISTER_COUNT: usize = CTRL_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_CTRL, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> CtrlFields {
        let r = padded(words, CTRL_REGISTERS);
        CtrlFields {
            fine_gain: r[0],
            baseline_threshold: r[1] & 0x3FF,
            cr1_upper: ((r[1] >> 10) & 0x3F) as u8,
            pulse_threshold: r[2] & 0x3FF,
            cr2_upper: ((r[2] >> 10) & 0x3F) as u8,
            hold_off_time: r[3],
            integration_time: r[4],
            roi_bounds: r[5],
            trigger_delay: r[6] & 0x3FF,
            cr6_upper: ((r[6] >> 10) & 0x3F) as u8,
            ctrl_7: r[7],
            run_time_0: r[8],
            run_time_1: r[9],
            short_it: r[10],
            put: r[11],
            ecomp: (r[12] & 0xF) as u8,
            pcomp: ((r[12] >> 4) & 0xF) as u8,
            gain_select: ((r[12] >> 8) & 0xF) as u8,
            cr12_upper: ((r[12] >> 12) & 0xF) as u8,
            ctrl_13: r[13],
            led_repeat_time: (r[14] & 0xFF) as u8,
            led_pulse_width: (r[14] >> 8) as u8,
            ha_mode: (r[15] & 1) as u8,
            trace_mode: ((r[15] >> 1) & 1) as u8,
            lm_mode: ((r[15] >> 2) & 1) as u8,
            led_on: ((r[15] >> 3) & 1) as u8,
            rtlt: ((r[15] >> 4) & 3) as u8,
            sel_led: ((r[15] >> 6) & 1) as u8,
            daq_mode: ((r[15] >> 7) & 1) as u8,
            nai_mode: ((r[15] >> 8) & 1) as u8,
            psd_on: ((r[15] >> 9) & 1) as u8,
            psd_select: ((r[15] >> 10) & 1) as u8,
            cr15_upper: ((r[15] >> 11) & 0x1F) as u8,
        }
    }

    fn encode(f: &CtrlFields) -> Vec<u16> {
        let mut r = vec![0u16; CTRL_REGISTERS];
        r[0] = f.fine_gain;
        r[1] = (f.baseline_threshold & 0x3FF) | (((f.cr1_upper & 0x3F) as u16) << 10);
        r[2] = (f.pulse_threshold & 0x3FF) | (((f.cr2_upper & 0x3F) as u16) << 10);
        r[3] = f.hold_off_time;
        r[4] = f.integration_time;
        r[5] = f.roi_bounds;
        r[6] = (f.trigger_delay & 0x3FF) | (((f.cr6_upper & 0x3F) as u16) << 10);
        r[7] = f.ctrl_7;
        r[8] = f.run_time_0;
        r[9] = f.run_time_1;
        r[10] = f.short_it;
        r[11] = f.put;
        r[12] = ((f.ecomp & 0xF) as u16)
            | (((f.pcomp & 0xF) as u16) << 4)
            | (((f.gain_select & 0xF) as u16) << 8)
            | (((f.cr12_upper & 0xF) as u16) << 12);
        r[13] = f.ctrl_13;
        r[14] = (f.led_repeat_time as u16) | ((f.led_pulse_width as u16) << 8);
        r[15] = ((f.ha_mode & 1) as u16)
            | (((f.trace_mode & 1) as u16) << 1)
            | (((f.lm_mode & 1) as u16) << 2)
            | (((f.led_on & 1) as u16) << 3)
            | (((f.rtlt & 3) as u16) << 4)
            | (((f.sel_led & 1) as u16) << 6)
            | (((f.daq_mode & 1) as u16) << 7)
            | (((f.nai_mode & 1) as u16) << 8)
            | (((f.psd_on & 1) as u16) << 9)
            | (((f.psd_select & 1) as u16) << 10)
            | (((f.cr15_upper & 0x1F) as u16) << 11);
        r
    }

    fn fields_to_user(f: &CtrlFields, sampling_rate: f64) -> CtrlUser {
        let run_ticks = ((f.run_time_1 as u64) << 16 | f.run_time_0 as u64) as f64 * 65536.0;
        CtrlUser {
            digital_gain: f.fine_gain as f64 / 2f64.powi(f.ecomp as i32) * sampling_rate
                / GAIN_REFERENCE_RATE,
            integration_time: ticks_to_seconds(f.integration_time as f64, sampling_rate),
            hold_off_time: ticks_to_seconds(f.hold_off_time as f64, sampling_rate),
            short_it: ticks_to_seconds(f.short_it as f64, sampling_rate),
            baseline_threshold: f.baseline_threshold as f64 / 1000.0,
            pulse_threshold: f.pulse_threshold as f64 / 1000.0,
            trigger_delay: ticks_to_seconds(f.trigger_delay as f64, sampling_rate),
            roi_low: (f.roi_bounds as u32 & 0xFF) * 16,
            roi_high: (f.roi_bounds as u32 & 0xFF00) / 16,
            run_time: ticks_to_seconds(run_ticks, sampling_rate),
        }
    }
}

/// Normalize a gain so the fine gain lands in `[16384, 65535]`
///
/// Returns `(fine_gain, ecomp)`. A non-positive gain maps to 16384 / 2.
fn normalize_gain(gain: f64) -> (u16, u8) {
    if gain.is_nan() || gain <= 0.0 {
        return (16384, 2);
    }
    let mut scaled = gain;
    let mut ecomp = 0u8;
    while scaled < FINE_GAIN_MIN && ecomp < 15 {
        scaled *= 2.0;
        ecomp += 1;
    }
    (scaled.round().min(u16::MAX as f64) as u16, ecomp)
}

impl Invertible for FpgaCtrl {
    fn user_to_fields(user: &CtrlUser, prior: &CtrlFields, sampling_rate: f64) -> CtrlFields {
        let gain = if sampling_rate > 0.0 {
            user.digital_gain * GAIN_REFERENCE_RATE / sampling_rate
        } else {
            0.0
        };
        let (fine_gain, ecomp) = normalize_gain(gain);
        let run_ticks = (user.run_time * sampling_rate / 65536.0 + 0.5) as u32;

        CtrlFields {
            fine_gain,
            ecomp,
            integration_time: seconds_to_ticks(user.integration_time, sampling_rate) as u16,
            hold_off_time: seconds_to_ticks(user.hold_off_time, sampling_rate) as u16,
            short_it: seconds_to_ticks(user.short_it, sampling_rate) as u16,
            trigger_delay: (seconds_to_ticks(user.trigger_delay, sampling_rate) & 0x3FF) as u16,
            baseline_threshold: ((user.baseline_threshold * 1000.0 + 0.5) as u32 & 0x3FF) as u16,
            pulse_threshold: ((user.pulse_threshold * 1000.0 + 0.5) as u32 & 0x3FF) as u16,
            roi_bounds: (user.roi_low / 16).saturating_add(user.roi_high.saturating_mul(16)) as u16,
            run_time_0: run_ticks as u16,
            run_time_1: (run_ticks >> 16) as u16,
            ..*prior
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> CtrlFields {
        CtrlFields {
            fine_gain: 20000,
            baseline_threshold: 20,
            cr1_upper: 0x15,
            pulse_threshold: 40,
            hold_off_time: 200,
            integration_time: 80,
            roi_bounds: 0x4010,
            trigger_delay: 12,
            run_time_0: 0x1234,
            run_time_1: 2,
            ecomp: 3,
            gain_select: 5,
            led_repeat_time: 7,
            led_pulse_width: 9,
            lm_mode: 1,
            rtlt: 2,
            psd_select: 1,
            cr15_upper: 0x1F,
            ..Default::default()
        }
    }

    #[test]
    fn test_ctrl_round_trip() {
        let fields = sample_fields();
        let words = FpgaCtrl::encode(&fields);
        assert_eq!(words.len(), CTRL_REGISTERS);
        assert_eq!(FpgaCtrl::decode(&words), fields);
        assert_eq!(words[1], 20 | (0x15 << 10));
        assert_eq!(words[12], 0x0503);
        assert_eq!(words[15], 0x4 | 0x20 | 0x400 | 0xF800);
    }

    #[test]
    fn test_ctrl_encode_truncates() {
        let fields = CtrlFields {
            baseline_threshold: 0xFFFF,
            ha_mode: 3,
            ..Default::default()
        };
        let words = FpgaCtrl::encode(&fields);
        assert_eq!(words[1], 0x3FF);
        assert_eq!(words[15], 1);
    }

    #[test]
    fn test_ctrl_user_values() {
        let user = FpgaCtrl::fields_to_user(&sample_fields(), 40e6);
        assert!((user.digital_gain - 2500.0).abs() < 1e-9);
        assert!((user.integration_time - 2e-6).abs() < 1e-15);
        assert!((user.baseline_threshold - 0.02).abs() < 1e-12);
        assert_eq!(user.roi_low, 0x10 * 16);
        assert_eq!(user.roi_high, 0x4000 / 16);
    }

    #[test]
    fn test_ctrl_user_round_trip() {
        let fields = sample_fields();
        let user = FpgaCtrl::fields_to_user(&fields, 40e6);
        assert_eq!(FpgaCtrl::user_to_fields(&user, &fields, 40e6), fields);
    }

    #[test]
    fn test_gain_normalization() {
        assert_eq!(normalize_gain(1.0), (16384, 14));
        assert_eq!(normalize_gain(0.0), (16384, 2));
        assert_eq!(normalize_gain(20000.0), (20000, 0));
    }
}
