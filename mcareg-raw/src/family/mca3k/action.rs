//! FPGA action registers
//!
//! Writing a 1 to a `clear_*` bit starts the clear; the FPGA resets the bit
//! when done, so read-back usually shows 0.

use serde::{Deserialize, Serialize};

use crate::register::{padded, BankAddress, Empty, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const ACTION_REGISTERS: usize = 4;

/// Fields the FPGA clears by itself after the action completes
pub const SELF_CLEARING_FIELDS: [&str; 6] = [
    "clear_histogram",
    "clear_statistics",
    "clear_trace",
    "clear_list_mode",
    "clear_led",
    "clear_roi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaAction;

/// Action register fields
///
/// ## Register Format
///
/// | Reg | Bits  | Field            |
/// |-----|-------|------------------|
/// | AR0 | 0     | clear_histogram  |
/// | AR0 | 1     | clear_statistics |
/// | AR0 | 2     | clear_trace      |
/// | AR0 | 3     | clear_list_mode  |
/// | AR0 | 4     | clear_led        |
/// | AR0 | 5     | ut_run           |
/// | AR0 | 6     | clear_roi        |
/// | AR0 | 7-15  | ar0_upper        |
/// | AR1 | 0-15  | ar1              |
/// | AR2 | 0     | histo_run        |
/// | AR2 | 1     | trace_run        |
/// | AR2 | 2     | lm_run           |
/// | AR2 | 3     | suspend          |
/// | AR2 | 4     | segment_enable   |
/// | AR2 | 5     | segment          |
/// | AR2 | 6     | x_alarm          |
/// | AR2 | 7     | x_alarm_enable   |
/// | AR2 | 8-15  | ar2_upper        |
/// | AR3 | 0-15  | ar3              |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFields {
    pub clear_histogram: u8,
    pub clear_statistics: u8,
    pub clear_trace: u8,
    pub clear_list_mode: u8,
    pub clear_led: u8,
    pub ut_run: u8,
    pub clear_roi: u8,
    pub ar0_upper: u16,
    pub ar1: u16,
    pub histo_run: u8,
    pub trace_run: u8,
    pub lm_run: u8,
    pub suspend: u8,
    pub segment_enable: u8,
    pub segment: u8,
    pub x_alarm: u8,
    pub x_alarm_enable: u8,
    pub ar2_upper: u8,
    pub ar3: u16,
}

fn bit(word: u16, n: u32) -> u8 {
    ((word >> n) & 1) as u8
}

fn flag(value: u8, n: u32) -> u16 {
    ((value & 1) as u16) << n
}

impl RegisterMap for FpgaAction {
    type Word = u16;
    type Fields = ActionFields;
    type User = Empty;

    const NAME: &'static str = "fpga_action";
    const REGISTER_COUNT: usize = ACTION_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_ACTION, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> ActionFields {
        let r = padded(words, ACTION_REGISTERS);
        ActionFields {
            clear_histogram: bit(r[0], 0),
            clear_statistics: bit(r[0], 1),
            clear_trace: bit(r[0], 2),
            clear_list_mode: bit(r[0], 3),
            clear_led: bit(r[0], 4),
            ut_run: bit(r[0], 5),
            clear_roi: bit(r[0], 6),
            ar0_upper: r[0] >> 7,
            ar1: r[1],
            histo_run: bit(r[2], 0),
            trace_run: bit(r[2], 1),
            lm_run: bit(r[2], 2),
            suspend: bit(r[2], 3),
            segment_enable: bit(r[2], 4),
            segment: bit(r[2], 5),
            x_alarm: bit(r[2], 6),
            x_alarm_enable: bit(r[2], 7),
            ar2_upper: (r[2] >> 8) as u8,
            ar3: r[3],
        }
    }

    fn encode(f: &ActionFields) -> Vec<u16> {
        vec![
            flag(f.clear_histogram, 0)
                | flag(f.clear_statistics, 1)
                | flag(f.clear_trace, 2)
                | flag(f.clear_list_mode, 3)
                | flag(f.clear_led, 4)
                | flag(f.ut_run, 5)
                | flag(f.clear_roi, 6)
                | ((f.ar0_upper & 0x1FF) << 7),
            f.ar1,
            flag(f.histo_run, 0)
                | flag(f.trace_run, 1)
                | flag(f.lm_run, 2)
                | flag(f.suspend, 3)
                | flag(f.segment_enable, 4)
                | flag(f.segment, 5)
                | flag(f.x_alarm, 6)
                | flag(f.x_alarm_enable, 7)
                | ((f.ar2_upper as u16) << 8),
            f.ar3,
        ]
    }

    fn fields_to_user(_fields: &ActionFields, _sampling_rate: f64) -> Empty {
        Empty {}
    }
}
