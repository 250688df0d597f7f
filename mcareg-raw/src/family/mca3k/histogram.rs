//! Histogram memory: 4096 32-bit bins

use serde::{Deserialize, Serialize};

use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const HISTOGRAM_BINS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaHistogram;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramFields {
    pub bins: Vec<u32>,
}

impl HistogramFields {
    /// Bins narrowed to 16 bits for legacy spectrum consumers
    ///
    /// Counts above `u16::MAX` saturate.
    pub fn legacy_bins(&self) -> Vec<u16> {
        self.bins
            .iter()
            .map(|&count| u16::try_from(count).unwrap_or(u16::MAX))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramUser {
    pub total_counts: u64,
}

impl RegisterMap for FpgaHistogram {
    type Word = u32;
    type Fields = HistogramFields;
    type User = HistogramUser;

    const NAME: &'static str = "fpga_histogram";
    const REGISTER_COUNT: usize = HISTOGRAM_BINS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_HISTOGRAM, OpcodeSpace::Fpga);

    fn decode(words: &[u32]) -> HistogramFields {
        HistogramFields {
            bins: padded(words, HISTOGRAM_BINS),
        }
    }

    fn encode(fields: &HistogramFields) -> Vec<u32> {
        padded(&fields.bins, HISTOGRAM_BINS)
    }

    fn fields_to_user(fields: &HistogramFields, _sampling_rate: f64) -> HistogramUser {
        HistogramUser {
            total_counts: fields.bins.iter().map(|&b| b as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read_is_padded() {
        let fields = FpgaHistogram::decode(&[5, 6, u32::MAX]);
        assert_eq!(fields.bins.len(), HISTOGRAM_BINS);
        assert_eq!(fields.bins[3], 0);
        let user = FpgaHistogram::fields_to_user(&fields, 40e6);
        assert_eq!(user.total_counts, 11 + u32::MAX as u64);
    }

    #[test]
    fn test_legacy_bins_saturate() {
        let fields = FpgaHistogram::decode(&[7, 0x1_0000, u32::MAX, 65535]);
        let legacy = fields.legacy_bins();
        assert_eq!(legacy.len(), HISTOGRAM_BINS);
        assert_eq!(&legacy[..5], &[7, u16::MAX, u16::MAX, 65535, 0]);
    }
}
