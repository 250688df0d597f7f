//! FPGA results registers: telemetry, status and firmware identification

use serde::{Deserialize, Serialize};

use crate::bits::{join_words, split_words, temperature_celsius};
use crate::register::{padded, BankAddress, RegisterMap};
use crate::wire::{address, OpcodeSpace};

pub const RESULTS_REGISTERS: usize = 32;

/// Full-scale ADC input range in volts
pub const ADC_VOLTAGE_RANGE: f64 = 1.0;

/// Sensor codes reported in RR6
pub mod sensor {
    pub const PMT: u8 = 1;
    pub const SIPM: u8 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaResults;

/// Results register fields
///
/// | Reg    | Bits   | Field         |
/// |--------|--------|---------------|
/// | RR0    | 0-15   | temperature   |
/// | RR1    | 0-15   | dc_offset     |
/// | RR2    | 0-15   | status        |
/// | RR3-4  | 0-31   | anode_current |
/// | RR5    | 0-15   | roi_avg       |
/// | RR6    | 0-7    | adc_sr        |
/// | RR6    | 8-11   | sensor        |
/// | RR6    | 12-15  | sys_clk       |
/// | RR7    | 0-7    | version       |
/// | RR7    | 8-11   | adc_bits      |
/// | RR8    | 0-15   | custom        |
/// | RR9    | 0-15   | build         |
/// | RR10-12| 0-15   | rr_10..rr_12  |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsFields {
    /// 13-bit two's complement, 1/16 °C
    pub temperature: u16,
    /// 1/64 mV
    pub dc_offset: u16,
    pub status: u16,
    pub anode_current: u32,
    pub roi_avg: u16,
    pub version: u8,
    pub adc_bits: u8,
    /// MHz
    pub adc_sr: u8,
    pub sensor: u8,
    pub sys_clk: u8,
    pub custom: u16,
    pub build: u16,
    pub rr_10: u16,
    pub rr_11: u16,
    pub rr_12: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsUser {
    pub temperature: f64,
    pub dc_offset: f64,
    pub histo_done: u8,
    pub lm_done: u8,
    pub trace_done: u8,
    pub led_valid: u8,
    pub roi_valid: u8,
    pub num_buffers: u8,
    /// Gain code from status bits 7-4
    pub gain_select: u8,
    /// Input amplifier transimpedance in ohms
    pub impedance: f64,
    pub max_volt: f64,
    pub max_current: f64,
    pub anode_current: f64,
    pub adc_sr: f64,
}

/// Transimpedance for a sensor type and 4-bit gain code
pub fn impedance(sensor_code: u8, gain_code: u8) -> f64 {
    let ladder = |base: f64, steps: [f64; 4]| {
        base + steps
            .iter()
            .enumerate()
            .filter(|(i, _)| gain_code >> i & 1 == 1)
            .map(|(_, ohms)| ohms)
            .sum::<f64>()
    };
    match sensor_code {
        sensor::PMT => ladder(100.0, [330.0, 1000.0, 3300.0, 10000.0]),
        sensor::SIPM => ladder(10.0, [15.0, 49.9, 150.0, 499.9]),
        _ => 1000.0,
    }
}

impl RegisterMap for FpgaResults {
    type Word = u16;
    type Fields = ResultsFields;
    type User = ResultsUser;

    const NAME: &'static str = "fpga_results";
    const REGISTER_COUNT: usize = RESULTS_REGISTERS;
    const ADDRESS: BankAddress = BankAddress::new(address::FPGA_RESULTS, OpcodeSpace::Fpga);

    fn decode(words: &[u16]) -> ResultsFields {
        let r = padded(words, RESULTS_REGISTERS);
        ResultsFields {
            temperature: r[0],
            dc_offset: r[1],
            status: r[2],
            anode_current: join_words(r[3], r[4]),
            roi_avg: r[5],
            adc_sr: (r[6] & 0xFF) as u8,
            sensor: ((r[6] >> 8) & 0xF) as u8,
            sys_clk: ((r[6] >> 12) & 0xF) as u8,
            version: (r[7] & 0xFF) as u8,
            adc_bits: ((r[7] >> 8) & 0xF) as u8,
            custom: r[8],
            build: r[9],
            rr_10: r[10],
            rr_11: r[11],
            rr_12: r[12],
        }
    }

    fn encode(f: &ResultsFields) -> Vec<u16> {
        let mut r = vec![0u16; RESULTS_REGISTERS];
        let (current_lo, current_hi) = split_words(f.anode_current);
        r[0] = f.temperature;
        r[1] = f.dc_offset;
        r[2] = f.status;
        r[3] = current_lo;
        r[4] = current_hi;
        r[5] = f.roi_avg;
        r[6] = (f.adc_sr as u16) | (((f.sensor & 0xF) as u16) << 8) | (((f.sys_clk & 0xF) as u16) << 12);
        r[7] = (f.version as u16) | (((f.adc_bits & 0xF) as u16) << 8);
        r[8] = f.custom;
        r[9] = f.build;
        r[10] = f.rr_10;
        r[11] = f.rr_11;
        r[12] = f.rr_12;
        r
    }

    fn fields_to_user(f: &ResultsFields, _sampling_rate: f64) -> ResultsUser {
        let gain_select = ((f.status & 0xF0) >> 4) as u8;
        let impedance = impedance(f.sensor, gain_select);
        let dc_offset = f.dc_offset as f64 / 64000.0;
        // A set sign bit means the current is below the noise floor
        let anode_current = if f.anode_current & 0x8000_0000 == 0 {
            f.anode_current as f64 * ADC_VOLTAGE_RANGE / impedance * 2f64.powi(-25)
        } else {
            0.0
        };

        ResultsUser {
            temperature: temperature_celsius(f.temperature),
            dc_offset,
            histo_done: (f.status & 1) as u8,
            lm_done: ((f.status >> 1) & 1) as u8,
            trace_done: ((f.status >> 2) & 1) as u8,
            led_valid: ((f.status >> 3) & 1) as u8,
            roi_valid: ((f.status >> 4) & 1) as u8,
            num_buffers: ((f.status & 0x7C00) >> 10) as u8,
            gain_select,
            impedance,
            max_volt: ADC_VOLTAGE_RANGE - dc_offset,
            max_current: (ADC_VOLTAGE_RANGE - dc_offset) / impedance,
            anode_current,
            adc_sr: f.adc_sr as f64 * 1.0e6,
        }
    }
}
