//! Time slice buffers
//!
//! Each buffer covers a fixed dwell of 64 run-time ticks and carries counter
//! snapshots plus a short histogram.

use serde::{Deserialize, Serialize};

use crate::bits::{join_words, split_words, temperature_celsius, ticks_to_seconds};
use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const TIME_SLICE_WORDS: usize = 1024;

/// First word of the embedded histogram
pub const TIME_SLICE_HISTOGRAM_OFFSET: usize = 18;

/// ADC clock cycles per time slice
pub const DWELL_TICKS: f64 = 64.0 * 65536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaTimeSlice;

/// | Word   | Field          |
/// |--------|----------------|
/// | 0      | buffer_number  |
/// | 1      | temperature    |
/// | 8      | gamma_events   |
/// | 10     | gamma_triggers |
/// | 12-13  | dead_time      |
/// | 14     | neutron_counts |
/// | 16     | gm_counts      |
/// | 18-    | histogram      |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSliceFields {
    pub buffer_number: u16,
    pub temperature: u16,
    pub gamma_events: u16,
    pub gamma_triggers: u16,
    /// ADC clock cycles
    pub dead_time: u32,
    pub neutron_counts: u16,
    /// Geiger-Mueller dosimeter counts
    pub gm_counts: u16,
    pub histogram: Vec<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSliceUser {
    pub dwell_time: f64,
    pub buffer_number: u16,
    pub temperature: f64,
    pub gamma_events: u16,
    pub gamma_triggers: u16,
    pub dead_time: f64,
    pub neutron_counts: u16,
    pub gm_counts: u16,
}

impl RegisterMap for FpgaTimeSlice {
    type Word = u16;
    type Fields = TimeSliceFields;
    type User = TimeSliceUser;

    const NAME: &'static str = "fpga_time_slice";
    const REGISTER_COUNT: usize = TIME_SLICE_WORDS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_TIME_SLICE, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> TimeSliceFields {
        let r = padded(words, TIME_SLICE_WORDS);
        TimeSliceFields {
            buffer_number: r[0],
            temperature: r[1],
            gamma_events: r[8],
            gamma_triggers: r[10],
            dead_time: join_words(r[12], r[13]),
            neutron_counts: r[14],
            gm_counts: r[16],
            histogram: r[TIME_SLICE_HISTOGRAM_OFFSET..].to_vec(),
        }
    }

    fn encode(f: &TimeSliceFields) -> Vec<u16> {
        let mut r = vec![0u16; TIME_SLICE_WORDS];
        let (dead_lo, dead_hi) = split_words(f.dead_time);
        r[0] = f.buffer_number;
        r[1] = f.temperature;
        r[8] = f.gamma_events;
        r[10] = f.gamma_triggers;
        r[12] = dead_lo;
        r[13] = dead_hi;
        r[14] = f.neutron_counts;
        r[16] = f.gm_counts;
        for (slot, &bin) in r[TIME_SLICE_HISTOGRAM_OFFSET..].iter_mut().zip(&f.histogram) {
            *slot = bin;
        }
        r
    }

    fn fields_to_user(f: &TimeSliceFields, sampling_rate: f64) -> TimeSliceUser {
        TimeSliceUser {
            dwell_time: ticks_to_seconds(DWELL_TICKS, sampling_rate),
            buffer_number: f.buffer_number,
            temperature: temperature_celsius(f.temperature),
            gamma_events: f.gamma_events,
            gamma_triggers: f.gamma_triggers,
            dead_time: ticks_to_seconds(f.dead_time as f64, sampling_rate),
            neutron_counts: f.neutron_counts,
            gm_counts: f.gm_counts,
        }
    }
}
