//! List mode buffers
//!
//! Two layouts share bank address 5. The simple buffer carries 3-word
//! records after a 4-word header; the extended buffer used by neutron
//! detectors carries 6-word records with a wall-clock time stamp.

use serde::{Deserialize, Serialize};

use crate::bits::{join_words, split_words, ticks_to_seconds};
use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const LIST_MODE_WORDS: usize = 1024;
pub const LIST_MODE_HEADER: usize = 4;
pub const LIST_MODE_STRIDE: usize = 3;

pub const EXTENDED_LIST_MODE_WORDS: usize = 6 * 2048;
pub const EXTENDED_LIST_MODE_HEADER: usize = 6;
pub const EXTENDED_LIST_MODE_STRIDE: usize = 6;

/// Time unit of the short (16-bit) time stamps, in ADC clock cycles
pub const SHORT_TIME_TICK: f64 = 512.0;

const fn record_capacity(words: usize, header: usize, stride: usize) -> usize {
    (words - header) / stride
}

/// Simple list mode buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaListMode;

/// Simple list mode records
///
/// Word 0 holds the mode in bit 15 and the event count in bits 11-0.
/// Record `i` starts at word `4 + 3i`:
///
/// | Mode | Word 0 | Word 1    | Word 2    |
/// |------|--------|-----------|-----------|
/// | 0    | energy | time 15-0 | time 31-16|
/// | 1    | energy | short_sum | time      |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListModeFields {
    pub mode: u8,
    pub num_events: u16,
    pub energies: Vec<u16>,
    pub times: Vec<u32>,
    pub short_sums: Vec<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListModeUser {
    /// MCA bins
    pub energies: Vec<f64>,
    /// Seconds
    pub times: Vec<f64>,
    pub short_sums: Vec<f64>,
}

impl RegisterMap for FpgaListMode {
    type Word = u16;
    type Fields = ListModeFields;
    type User = ListModeUser;

    const NAME: &'static str = "fpga_list_mode";
    const REGISTER_COUNT: usize = LIST_MODE_WORDS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_LIST_MODE, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> ListModeFields {
        let r = padded(words, LIST_MODE_WORDS);
        let mode = ((r[0] >> 15) & 1) as u8;
        let num_events = r[0] & 0xFFF;
        let records = (num_events as usize)
            .min(record_capacity(LIST_MODE_WORDS, LIST_MODE_HEADER, LIST_MODE_STRIDE));

        let mut fields = ListModeFields {
            mode,
            num_events,
            ..Default::default()
        };
        for record in r[LIST_MODE_HEADER..].chunks_exact(LIST_MODE_STRIDE).take(records) {
            fields.energies.push(record[0]);
            if mode == 0 {
                fields.times.push(join_words(record[1], record[2]));
            } else {
                fields.short_sums.push(record[1]);
                fields.times.push(record[2] as u32);
            }
        }
        fields
    }

    fn encode(f: &ListModeFields) -> Vec<u16> {
        let mut r = vec![0u16; LIST_MODE_WORDS];
        r[0] = (((f.mode & 1) as u16) << 15) | (f.num_events & 0xFFF);
        let records = r[LIST_MODE_HEADER..].chunks_exact_mut(LIST_MODE_STRIDE);
        for (i, (record, &energy)) in records.zip(&f.energies).enumerate() {
            let time = f.times.get(i).copied().unwrap_or_default();
            record[0] = energy;
            if f.mode & 1 == 0 {
                let (lo, hi) = split_words(time);
                record[1] = lo;
                record[2] = hi;
            } else {
                record[1] = f.short_sums.get(i).copied().unwrap_or_default();
                record[2] = time as u16;
            }
        }
        r
    }

    fn fields_to_user(f: &ListModeFields, sampling_rate: f64) -> ListModeUser {
        let tick = if f.mode == 0 { 1.0 } else { SHORT_TIME_TICK };
        ListModeUser {
            energies: f.energies.iter().map(|&e| e as f64 / 16.0).collect(),
            times: f
                .times
                .iter()
                .map(|&t| ticks_to_seconds(t as f64 * tick, sampling_rate))
                .collect(),
            short_sums: f.short_sums.iter().map(|&s| s as f64 / 16.0).collect(),
        }
    }
}

/// Extended list mode buffer with wall-clock time stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaLmNrl1;

/// Extended list mode records
///
/// Word 0 bits 11-0 hold the event count. Record `i` starts at word
/// `6 + 6i`:
///
/// | Word | Bits  | Field                  |
/// |------|-------|------------------------|
/// | 0    | 0-15  | psd                    |
/// | 1    | 0-15  | energy                 |
/// | 2-4  | 0-15  | wall clock bits 0-47   |
/// | 5    | 0-2   | wall clock bits 48-50  |
/// | 5    | 3     | xt                     |
/// | 5    | 4     | pu (pile-up)           |
/// | 5    | 5     | ov (overflow)          |
/// | 5    | 6     | or (out of range)      |
/// | 5    | 7     | pps                    |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedListModeFields {
    pub num_events: u16,
    pub psd: Vec<u16>,
    pub energies: Vec<u16>,
    pub wc: Vec<u64>,
    pub xt: Vec<u8>,
    pub pu: Vec<u8>,
    pub ov: Vec<u8>,
    pub or: Vec<u8>,
    pub pps: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedListModeUser {
    pub energies: Vec<f64>,
    /// Wall clock in seconds
    pub wc: Vec<f64>,
}

impl RegisterMap for FpgaLmNrl1 {
    type Word = u16;
    type Fields = ExtendedListModeFields;
    type User = ExtendedListModeUser;

    const NAME: &'static str = "fpga_lm_nrl1";
    const REGISTER_COUNT: usize = EXTENDED_LIST_MODE_WORDS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_LIST_MODE, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> ExtendedListModeFields {
        let r = padded(words, EXTENDED_LIST_MODE_WORDS);
        let num_events = r[0] & 0xFFF;
        let records = (num_events as usize).min(record_capacity(
            EXTENDED_LIST_MODE_WORDS,
            EXTENDED_LIST_MODE_HEADER,
            EXTENDED_LIST_MODE_STRIDE,
        ));

        let mut fields = ExtendedListModeFields {
            num_events,
            ..Default::default()
        };
        for record in r[EXTENDED_LIST_MODE_HEADER..]
            .chunks_exact(EXTENDED_LIST_MODE_STRIDE)
            .take(records)
        {
            let flags = record[5];
            fields.psd.push(record[0]);
            fields.energies.push(record[1]);
            fields.wc.push(
                record[2] as u64
                    | (record[3] as u64) << 16
                    | (record[4] as u64) << 32
                    | ((flags & 0x7) as u64) << 48,
            );
            fields.xt.push(((flags >> 3) & 1) as u8);
            fields.pu.push(((flags >> 4) & 1) as u8);
            fields.ov.push(((flags >> 5) & 1) as u8);
            fields.or.push(((flags >> 6) & 1) as u8);
            fields.pps.push(((flags >> 7) & 1) as u8);
        }
        fields
    }

    fn encode(f: &ExtendedListModeFields) -> Vec<u16> {
        let mut r = vec![0u16; EXTENDED_LIST_MODE_WORDS];
        r[0] = f.num_events & 0xFFF;
        let flag = |values: &[u8], i: usize, n: u32| ((values.get(i).copied().unwrap_or(0) & 1) as u16) << n;
        let records = r[EXTENDED_LIST_MODE_HEADER..].chunks_exact_mut(EXTENDED_LIST_MODE_STRIDE);
        for (i, (record, &energy)) in records.zip(&f.energies).enumerate() {
            let wc = f.wc.get(i).copied().unwrap_or_default();
            record[0] = f.psd.get(i).copied().unwrap_or_default();
            record[1] = energy;
            record[2] = wc as u16;
            record[3] = (wc >> 16) as u16;
            record[4] = (wc >> 32) as u16;
            record[5] = ((wc >> 48) & 0x7) as u16
                | flag(&f.xt, i, 3)
                | flag(&f.pu, i, 4)
                | flag(&f.ov, i, 5)
                | flag(&f.or, i, 6)
                | flag(&f.pps, i, 7);
        }
        r
    }

    fn fields_to_user(f: &ExtendedListModeFields, sampling_rate: f64) -> ExtendedListModeUser {
        ExtendedListModeUser {
            energies: f.energies.iter().map(|&e| e as f64 / 16.0).collect(),
            wc: f
                .wc
                .iter()
                .map(|&w| ticks_to_seconds(w as f64, sampling_rate))
                .collect(),
        }
    }
}
