//! Weights memory, used by the pulse-shape filters

use serde::{Deserialize, Serialize};

use crate::register::{padded, BankAddress, Empty, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const WEIGHT_WORDS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaWeights;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsFields {
    pub weights: Vec<u16>,
}

impl RegisterMap for FpgaWeights {
    type Word = u16;
    type Fields = WeightsFields;
    type User = Empty;

    const NAME: &'static str = "fpga_weights";
    const REGISTER_COUNT: usize = WEIGHT_WORDS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_WEIGHTS, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> WeightsFields {
        WeightsFields {
            weights: padded(words, WEIGHT_WORDS),
        }
    }

    fn encode(fields: &WeightsFields) -> Vec<u16> {
        padded(&fields.weights, WEIGHT_WORDS)
    }

    fn fields_to_user(_fields: &WeightsFields, _sampling_rate: f64) -> Empty {
        Empty {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_round_trip() {
        let words: Vec<u16> = (0..WEIGHT_WORDS as u16).map(|i| i.wrapping_mul(613)).collect();
        let fields = FpgaWeights::decode(&words);
        assert_eq!(fields.weights, words);
        assert_eq!(FpgaWeights::encode(&fields), words);
    }

    #[test]
    fn test_short_weights_are_padded() {
        let fields = WeightsFields { weights: vec![1, 2, 3] };
        let words = FpgaWeights::encode(&fields);
        assert_eq!(words.len(), WEIGHT_WORDS);
        assert_eq!(&words[..4], &[1, 2, 3, 0]);
        assert_eq!(FpgaWeights::decode(&words[..3]).weights, words);
    }
}
