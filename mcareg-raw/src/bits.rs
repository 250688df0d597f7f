//! Shared bit-level conversions

/// Join two 16-bit words into a 32-bit value, low word first
pub const fn join_words(low: u16, high: u16) -> u32 {
    (low as u32) | ((high as u32) << 16)
}

/// Split a 32-bit value into `(low, high)` 16-bit words
pub const fn split_words(value: u32) -> (u16, u16) {
    (value as u16, (value >> 16) as u16)
}

/// Convert a 13-bit sensor temperature word to degrees Celsius
///
/// Bit 12 is the sign. Negative readings are two's complement over 13 bits,
/// positive readings use the low 11 bits. One LSB is 1/16 °C.
pub fn temperature_celsius(raw: u16) -> f64 {
    if raw & 0x1000 != 0 {
        ((raw & 0x1FFF) as f64 - 8192.0) / 16.0
    } else {
        (raw & 0x07FF) as f64 / 16.0
    }
}

/// Decode one ADC trace word: signed 16-bit, 1/32 LSB
pub fn sample_from_word(word: u16) -> f64 {
    word as i16 as f64 / 32.0
}

/// Encode one ADC trace sample, saturating at the signed 16-bit range
pub fn word_from_sample(sample: f64) -> u16 {
    (sample * 32.0).round() as i16 as u16
}

fn bcd_byte(byte: u8) -> u32 {
    (byte >> 4) as u32 * 10 + (byte & 0x0F) as u32
}

/// Format a BCD version word as `major.minor`
///
/// The low 16 bits hold the version: `0x0100` is `1.0`, `0x0212` is `2.12`.
pub fn bcd_version(word: u32) -> String {
    let major = bcd_byte((word >> 8) as u8);
    let minor = bcd_byte(word as u8);
    format!("{major}.{minor}")
}

/// Convert a tick count to seconds, returning 0 for a non-positive rate
pub fn ticks_to_seconds(ticks: f64, sampling_rate: f64) -> f64 {
    if sampling_rate > 0.0 {
        ticks / sampling_rate
    } else {
        0.0
    }
}

/// Convert seconds to the nearest tick count, saturating at `u32::MAX`
pub fn seconds_to_ticks(seconds: f64, sampling_rate: f64) -> u32 {
    (seconds * sampling_rate + 0.5) as u32
}
