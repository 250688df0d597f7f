//! Pulse detection and shape analysis on ADC traces
//!
//! The baseline follows the trace with an exponential average while samples
//! stay inside [`BASELINE_BAND`]. The first sample more than
//! [`PULSE_THRESHOLD`] above the baseline starts a pulse, which ends at the
//! first later sample back inside the band. All amplitudes are measured
//! above the baseline.

use serde::{Deserialize, Serialize};

use crate::bits::ticks_to_seconds;

/// Half-width of the band in which a sample updates the baseline
pub const BASELINE_BAND: f64 = 3.0;

/// Rise above baseline that starts a pulse
pub const PULSE_THRESHOLD: f64 = 10.0;

/// Pre-pulse samples required for a noise estimate
pub const MIN_NOISE_SAMPLES: usize = 4;

/// Result of analyzing one trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pulse", rename_all = "snake_case")]
pub enum PulseSummary {
    /// No pulse crossed the threshold; whole-trace statistics instead
    NotFound {
        min: f64,
        max: f64,
        mean: f64,
        std_dev: f64,
    },
    Found {
        /// Baseline-subtracted sum over the pulse
        bin_estimate: f64,
        peak_amplitude: f64,
        /// Index of the first pulse sample in the trace
        onset: usize,
        rise_time: f64,
        fall_time: f64,
        peaking_time: f64,
        fwhm: f64,
        baseline: f64,
        noise_std_dev: f64,
    },
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample standard deviation, 0 for fewer than two samples
fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let sum_sq: f64 = samples.iter().map(|s| (s - m) * (s - m)).sum();
    (sum_sq / (samples.len() - 1) as f64).sqrt()
}

fn whole_trace(trace: &[f64]) -> PulseSummary {
    if trace.is_empty() {
        return PulseSummary::NotFound {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            std_dev: 0.0,
        };
    }
    PulseSummary::NotFound {
        min: trace.iter().copied().fold(f64::INFINITY, f64::min),
        max: trace.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: mean(trace),
        std_dev: std_dev(trace),
    }
}

/// Analyze a decoded trace sampled at `sampling_rate` samples per second
pub fn analyze(trace: &[f64], sampling_rate: f64) -> PulseSummary {
    let Some(&first) = trace.first() else {
        return whole_trace(trace);
    };

    let mut baseline = first;
    let mut onset = None;
    for (index, &sample) in trace.iter().enumerate().skip(1) {
        let deviation = sample - baseline;
        if deviation.abs() < BASELINE_BAND {
            baseline = 0.875 * baseline + 0.125 * sample;
        } else if deviation > PULSE_THRESHOLD {
            onset = Some(index);
            break;
        }
    }

    let Some(onset) = onset else {
        return whole_trace(trace);
    };

    let noise_std_dev = if onset >= MIN_NOISE_SAMPLES {
        std_dev(&trace[..onset])
    } else {
        0.0
    };

    let end = trace[onset..]
        .iter()
        .position(|&s| s - baseline < BASELINE_BAND)
        .map_or(trace.len(), |offset| onset + offset);
    let pulse: Vec<f64> = trace[onset..end].iter().map(|&s| s - baseline).collect();

    let (peak_index, peak_amplitude) = pulse
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

    // Every level below 1.0 is crossed at least at the peak
    let first_above = |fraction: f64| {
        let level = fraction * peak_amplitude;
        pulse.iter().position(|&v| v > level).unwrap_or(peak_index) as f64
    };
    let last_above = |fraction: f64| {
        let level = fraction * peak_amplitude;
        pulse.iter().rposition(|&v| v > level).unwrap_or(peak_index) as f64
    };

    PulseSummary::Found {
        bin_estimate: pulse.iter().sum(),
        peak_amplitude,
        onset,
        rise_time: ticks_to_seconds(first_above(0.9) - first_above(0.1), sampling_rate),
        fall_time: ticks_to_seconds(last_above(0.1) - last_above(0.9), sampling_rate),
        peaking_time: ticks_to_seconds(peak_index as f64, sampling_rate),
        fwhm: ticks_to_seconds(last_above(0.5) - first_above(0.5), sampling_rate),
        baseline,
        noise_std_dev,
    }
}
