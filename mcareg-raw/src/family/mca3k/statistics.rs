//! FPGA statistics counters
//!
//! Two banks of eight 32-bit counters. Times count in units of 65536 ADC
//! clock cycles.

use serde::{Deserialize, Serialize};

use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const STATISTICS_REGISTERS: usize = 16;

/// ADC clock cycles per run-time tick
pub const CLOCK_TICK: f64 = 65536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaStatistics;

/// Counters of one statistics bank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterBank {
    /// Run time in clock ticks
    pub ct: u32,
    /// Accepted events
    pub ev: u32,
    /// Recognized triggers
    pub ts: u32,
    /// Dead time in clock ticks
    pub dt: u32,
    pub xev0: u32,
    pub xev1: u32,
    pub xev2: u32,
    pub xev3: u32,
}

/// Statistics fields
///
/// | Regs       | Field           |
/// |------------|-----------------|
/// | 0-3        | bank_0 ct ev ts dt |
/// | 4-7        | bank_1 ct ev ts dt |
/// | 8-11       | bank_0 xev0-3   |
/// | 12-15      | bank_1 xev0-3   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsFields {
    pub bank_0: CounterBank,
    pub bank_1: CounterBank,
}

/// Rates of one bank in counts per second, with 2-sigma errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BankRates {
    pub run_time: f64,
    pub dead_time: f64,
    pub event_rate: f64,
    pub trigger_rate: f64,
    pub pulse_rate: f64,
    pub xev0_rate: f64,
    pub xev1_rate: f64,
    pub xev2_rate: f64,
    pub xev3_rate: f64,
    pub event_rate_err: f64,
    pub trigger_rate_err: f64,
    pub pulse_rate_err: f64,
    pub xev0_rate_err: f64,
    pub xev1_rate_err: f64,
    pub xev2_rate_err: f64,
    pub xev3_rate_err: f64,
}

impl BankRates {
    /// Compute rates, all zero when no time has elapsed
    pub fn from_counters(bank: &CounterBank, sampling_rate: f64) -> Self {
        if bank.ct == 0 || sampling_rate <= 0.0 {
            return Self::default();
        }

        let rt = bank.ct as f64 * CLOCK_TICK / sampling_rate;
        let dt = bank.dt as f64 * CLOCK_TICK / sampling_rate;
        let rate = |n: u32| n as f64 / rt;
        let err = |n: u32| 2.0 * (n as f64).sqrt() / rt;
        let live = rt - dt;

        Self {
            run_time: rt,
            dead_time: dt,
            event_rate: rate(bank.ev),
            trigger_rate: rate(bank.ts),
            pulse_rate: if rt > dt { bank.ts as f64 / live } else { 0.0 },
            xev0_rate: rate(bank.xev0),
            xev1_rate: rate(bank.xev1),
            xev2_rate: rate(bank.xev2),
            xev3_rate: rate(bank.xev3),
            event_rate_err: err(bank.ev),
            trigger_rate_err: err(bank.ts),
            pulse_rate_err: if rt > dt { 2.0 * (bank.ts as f64).sqrt() / live } else { 0.0 },
            xev0_rate_err: err(bank.xev0),
            xev1_rate_err: err(bank.xev1),
            xev2_rate_err: err(bank.xev2),
            xev3_rate_err: err(bank.xev3),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsUser {
    pub bank_0: BankRates,
    pub bank_1: BankRates,
}

fn counter_bank(r: &[u32], base: usize, extra: usize) -> CounterBank {
    CounterBank {
        ct: r[base],
        ev: r[base + 1],
        ts: r[base + 2],
        dt: r[base + 3],
        xev0: r[extra],
        xev1: r[extra + 1],
        xev2: r[extra + 2],
        xev3: r[extra + 3],
    }
}

fn store_bank(r: &mut [u32], bank: &CounterBank, base: usize, extra: usize) {
    r[base..base + 4].copy_from_slice(&[bank.ct, bank.ev, bank.ts, bank.dt]);
    r[extra..extra + 4].copy_from_slice(&[bank.xev0, bank.xev1, bank.xev2, bank.xev3]);
}

impl RegisterMap for FpgaStatistics {
    type Word = u32;
    type Fields = StatisticsFields;
    type User = StatisticsUser;

    const NAME: &'static str = "fpga_statistics";
    const REGISTER_COUNT: usize = STATISTICS_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_STATISTICS, OpcodeSpace::Fpga);

    fn decode(words: &[u32]) -> StatisticsFields {
        let r = padded(words, STATISTICS_REGISTERS);
        StatisticsFields {
            bank_0: counter_bank(&r, 0, 8),
            bank_1: counter_bank(&r, 4, 12),
        }
    }

    fn encode(fields: &StatisticsFields) -> Vec<u32> {
        let mut r = vec![0u32; STATISTICS_REGISTERS];
        store_bank(&mut r, &fields.bank_0, 0, 8);
        store_bank(&mut r, &fields.bank_1, 4, 12);
        r
    }

    fn fields_to_user(fields: &StatisticsFields, sampling_rate: f64) -> StatisticsUser {
        StatisticsUser {
            bank_0: BankRates::from_counters(&fields.bank_0, sampling_rate),
            bank_1: BankRates::from_counters(&fields.bank_1, sampling_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_layout() {
        let words: Vec<u32> = (1..=16).collect();
        let fields = FpgaStatistics::decode(&words);
        assert_eq!(fields.bank_0.ct, 1);
        assert_eq!(fields.bank_0.dt, 4);
        assert_eq!(fields.bank_0.xev0, 9);
        assert_eq!(fields.bank_1.ct, 5);
        assert_eq!(fields.bank_1.xev3, 16);
        assert_eq!(FpgaStatistics::encode(&fields), words);
    }

    #[test]
    fn test_zero_run_time() {
        let fields = StatisticsFields {
            bank_0: CounterBank {
                ct: 0,
                ev: 500,
                ts: 600,
                ..Default::default()
            },
            ..Default::default()
        };
        let user = FpgaStatistics::fields_to_user(&fields, 40e6);
        assert_eq!(user.bank_0, BankRates::default());
        assert_eq!(user.bank_1, BankRates::default());
    }

    #[test]
    fn test_rates() {
        // 625 ticks of 65536 cycles at 40 MHz is 1.024 s
        let bank = CounterBank {
            ct: 625,
            ev: 1024,
            ts: 2048,
            dt: 0,
            xev1: 4096,
            ..Default::default()
        };
        let rates = BankRates::from_counters(&bank, 40e6);
        assert!((rates.run_time - 1.024).abs() < 1e-9);
        assert!((rates.event_rate - 1000.0).abs() < 1e-9);
        assert!((rates.trigger_rate - 2000.0).abs() < 1e-9);
        assert!((rates.pulse_rate - 2000.0).abs() < 1e-9);
        assert!((rates.xev1_rate - 4000.0).abs() < 1e-9);
        assert!((rates.event_rate_err - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_dead_time_exceeds_run_time() {
        let bank = CounterBank {
            ct: 10,
            ts: 100,
            dt: 10,
            ..Default::default()
        };
        let rates = BankRates::from_counters(&bank, 40e6);
        assert_eq!(rates.pulse_rate, 0.0);
        assert_eq!(rates.pulse_rate_err, 0.0);
        assert!(rates.trigger_rate > 0.0);
    }
}
