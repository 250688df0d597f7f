//! ADC trace memory
//!
//! 1024 signed 16-bit samples in units of 1/32 ADC LSB. The user view is a
//! [`PulseSummary`] of the trace.

use serde::{Deserialize, Serialize};

use crate::bits::{sample_from_word, word_from_sample};
use crate::pulse::{analyze, PulseSummary};
use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const TRACE_SAMPLES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaTrace;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceFields {
    pub trace: Vec<f64>,
}

impl RegisterMap for FpgaTrace {
    type Word = u16;
    type Fields = TraceFields;
    type User = PulseSummary;

    const NAME: &'static str = "fpga_trace";
    const REGISTER_COUNT: usize = TRACE_SAMPLES;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_TRACE, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> TraceFields {
        TraceFields {
            trace: padded(words, TRACE_SAMPLES).into_iter().map(sample_from_word).collect(),
        }
    }

    fn encode(fields: &TraceFields) -> Vec<u16> {
        let words: Vec<u16> = fields.trace.iter().map(|&s| word_from_sample(s)).collect();
        padded(&words, TRACE_SAMPLES)
    }

    fn fields_to_user(fields: &TraceFields, sampling_rate: f64) -> PulseSummary {
        analyze(&fields.trace, sampling_rate)
    }
}
