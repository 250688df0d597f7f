//! Generic register map abstractions
//!
//! A register map is a zero-sized marker type describing one memory bank:
//! its word type, how many words it holds, where it lives on the device, and
//! the typed field and user records derived from the words.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::wire::OpcodeSpace;

/// Width and interpretation of a single register word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordEncoding {
    U16,
    U32,
    F32,
}

impl WordEncoding {
    /// Bytes per word on the wire
    pub const fn width(self) -> usize {
        match self {
            WordEncoding::U16 => 2,
            WordEncoding::U32 | WordEncoding::F32 => 4,
        }
    }
}

/// A register word type
///
/// Implemented for `u16`, `u32` and `f32`, the three word types used by
/// device memory banks. All words travel little-endian.
pub trait Word: Copy + Default + PartialEq + Debug + Serialize + DeserializeOwned + 'static {
    const ENCODING: WordEncoding;

    /// Parse one word from exactly `ENCODING.width()` bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian bytes of this word
    fn extend_le(self, out: &mut Vec<u8>);

    /// Convert a caller-supplied number, saturating at the word's range
    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    fn wrap(words: Vec<Self>) -> RegisterWords;

    fn unwrap_words(words: RegisterWords) -> Option<Vec<Self>>;
}

macro_rules! impl_word {
    ($ty:ty, $variant:ident) => {
        impl Word for $ty {
            const ENCODING: WordEncoding = WordEncoding::$variant;

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }

            fn extend_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn wrap(words: Vec<Self>) -> RegisterWords {
                RegisterWords::$variant(words)
            }

            fn unwrap_words(words: RegisterWords) -> Option<Vec<Self>> {
                match words {
                    RegisterWords::$variant(words) => Some(words),
                    _ => None,
                }
            }
        }
    };
}

impl_word!(u16, U16);
impl_word!(u32, U32);
impl_word!(f32, F32);

/// Register words of any encoding
///
/// This is the untyped form that crosses the transport boundary; a
/// [`RegisterMap`] turns it into typed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegisterWords {
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl RegisterWords {
    /// Zero-filled words
    pub fn zeroed(encoding: WordEncoding, count: usize) -> Self {
        match encoding {
            WordEncoding::U16 => RegisterWords::U16(vec![0; count]),
            WordEncoding::U32 => RegisterWords::U32(vec![0; count]),
            WordEncoding::F32 => RegisterWords::F32(vec![0.0; count]),
        }
    }

    /// Parse little-endian bytes, ignoring a trailing partial word
    pub fn from_le_bytes(encoding: WordEncoding, bytes: &[u8]) -> Self {
        match encoding {
            WordEncoding::U16 => RegisterWords::U16(words_from_le(bytes)),
            WordEncoding::U32 => RegisterWords::U32(words_from_le(bytes)),
            WordEncoding::F32 => RegisterWords::F32(words_from_le(bytes)),
        }
    }

    /// Build words from caller-supplied numbers, e.g. the `registers` of a
    /// write command
    pub fn from_values(encoding: WordEncoding, values: &[f64]) -> Self {
        match encoding {
            WordEncoding::U16 => RegisterWords::U16(values.iter().map(|&v| u16::from_f64(v)).collect()),
            WordEncoding::U32 => RegisterWords::U32(values.iter().map(|&v| u32::from_f64(v)).collect()),
            WordEncoding::F32 => RegisterWords::F32(values.iter().map(|&v| f32::from_f64(v)).collect()),
        }
    }

    pub fn encoding(&self) -> WordEncoding {
        match self {
            RegisterWords::U16(_) => WordEncoding::U16,
            RegisterWords::U32(_) => WordEncoding::U32,
            RegisterWords::F32(_) => WordEncoding::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RegisterWords::U16(words) => words.len(),
            RegisterWords::U32(words) => words.len(),
            RegisterWords::F32(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Truncate or zero-pad to `count` words
    pub fn resized(self, count: usize) -> Self {
        match self {
            RegisterWords::U16(mut words) => {
                words.resize(count, 0);
                RegisterWords::U16(words)
            }
            RegisterWords::U32(mut words) => {
                words.resize(count, 0);
                RegisterWords::U32(words)
            }
            RegisterWords::F32(mut words) => {
                words.resize(count, 0.0);
                RegisterWords::F32(words)
            }
        }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            RegisterWords::U16(words) => words_to_le(words),
            RegisterWords::U32(words) => words_to_le(words),
            RegisterWords::F32(words) => words_to_le(words),
        }
    }

    pub fn to_values(&self) -> Vec<f64> {
        match self {
            RegisterWords::U16(words) => words.iter().map(|w| w.to_f64()).collect(),
            RegisterWords::U32(words) => words.iter().map(|w| w.to_f64()).collect(),
            RegisterWords::F32(words) => words.iter().map(|w| w.to_f64()).collect(),
        }
    }
}

fn words_from_le<W: Word>(bytes: &[u8]) -> Vec<W> {
    bytes
        .chunks_exact(W::ENCODING.width())
        .map(W::from_le_slice)
        .collect()
}

fn words_to_le<W: Word>(words: &[W]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * W::ENCODING.width());
    for word in words {
        word.extend_le(&mut out);
    }
    out
}

/// Copy `words` into a buffer of exactly `count` words, zero-padding short
/// input
pub fn padded<W: Word>(words: &[W], count: usize) -> Vec<W> {
    let mut out = words.iter().copied().take(count).collect::<Vec<_>>();
    out.resize(count, W::default());
    out
}

/// Location of a bank on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BankAddress {
    /// Bank address carried in the command header (7 bits)
    pub address: u8,
    /// Which processor serves the bank
    pub space: OpcodeSpace,
}

impl BankAddress {
    pub const fn new(address: u8, space: OpcodeSpace) -> Self {
        Self { address, space }
    }
}

/// Record with no members, used by banks that expose no fields or no user
/// values
///
/// Serializes as `{}` and accepts both `{}` and `[]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// A memory bank layout
///
/// # Example
///
/// ```ignore
/// use mcareg_raw::current_family::FpgaCtrl;
/// use mcareg_raw::RegisterMap;
///
/// let fields = FpgaCtrl::decode(&words);
/// let user = FpgaCtrl::fields_to_user(&fields, 40e6);
/// assert_eq!(FpgaCtrl::encode(&fields), words);
/// ```
pub trait RegisterMap {
    type Word: Word;
    type Fields: Clone + Debug + PartialEq + Serialize + DeserializeOwned;
    type User: Clone + Debug + PartialEq + Serialize + DeserializeOwned;

    /// Command name used to select this bank
    const NAME: &'static str;

    /// Number of words in the bank
    const REGISTER_COUNT: usize;

    const ADDRESS: BankAddress;

    /// Decode fields from register words
    ///
    /// Short input is treated as zero-padded, so `decode(&[])` yields the
    /// all-zero record.
    fn decode(words: &[Self::Word]) -> Self::Fields;

    /// Pack fields into exactly `REGISTER_COUNT` words
    ///
    /// Values wider than their bit field are truncated.
    fn encode(fields: &Self::Fields) -> Vec<Self::Word>;

    /// Derive physical quantities from fields
    fn fields_to_user(fields: &Self::Fields, sampling_rate: f64) -> Self::User;
}

/// A register map whose fields can be recomputed from user values
pub trait Invertible: RegisterMap {
    /// Recompute fields from user values
    ///
    /// Fields that have no user counterpart are carried over from `prior`.
    fn user_to_fields(user: &Self::User, prior: &Self::Fields, sampling_rate: f64) -> Self::Fields;
}

/// Uniform user-to-fields entry point over invertible and decode-only maps
pub trait UserSync: RegisterMap {
    const INVERTIBLE: bool;

    fn sync_fields(user: &Self::User, prior: &Self::Fields, sampling_rate: f64) -> Result<Self::Fields>;
}

/// Implement [`UserSync`] for maps that implement [`Invertible`]
#[macro_export]
macro_rules! invertible_maps {
    ($($map:ty),* $(,)?) => {
        $(
            impl $crate::register::UserSync for $map {
                const INVERTIBLE: bool = true;

                fn sync_fields(
                    user: &<$map as $crate::register::RegisterMap>::User,
                    prior: &<$map as $crate::register::RegisterMap>::Fields,
                    sampling_rate: f64,
                ) -> $crate::error::Result<<$map as $crate::register::RegisterMap>::Fields> {
                    Ok(<$map as $crate::register::Invertible>::user_to_fields(user, prior, sampling_rate))
                }
            }
        )*
    };
}

/// Implement [`UserSync`] for maps that only decode
#[macro_export]
macro_rules! decode_only_maps {
    ($($map:ty),* $(,)?) => {
        $(
            impl $crate::register::UserSync for $map {
                const INVERTIBLE: bool = false;

                fn sync_fields(
                    _user: &<$map as $crate::register::RegisterMap>::User,
                    _prior: &<$map as $crate::register::RegisterMap>::Fields,
                    _sampling_rate: f64,
                ) -> $crate::error::Result<<$map as $crate::register::RegisterMap>::Fields> {
                    Err($crate::error::RegisterError::NotInvertible {
                        command: <$map as $crate::register::RegisterMap>::NAME,
                    })
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_bytes_round_trip() {
        let words = RegisterWords::U16(vec![0x1234, 0xABCD]);
        let bytes = words.to_le_bytes();
        assert_eq!(bytes, vec![0x34, 0x12, 0xCD, 0xAB]);
        assert_eq!(RegisterWords::from_le_bytes(WordEncoding::U16, &bytes), words);
    }

    #[test]
    fn test_trailing_partial_word_ignored() {
        let words = RegisterWords::from_le_bytes(WordEncoding::U32, &[1, 0, 0, 0, 9, 9]);
        assert_eq!(words, RegisterWords::U32(vec![1]));
    }

    #[test]
    fn test_from_values_saturates() {
        let words = RegisterWords::from_values(WordEncoding::U16, &[1.0, 70000.0, -3.0]);
        assert_eq!(words, RegisterWords::U16(vec![1, 0xFFFF, 0]));
    }

    #[test]
    fn test_float_words() {
        let words = RegisterWords::F32(vec![1.5, -2.0]);
        let bytes = words.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(RegisterWords::from_le_bytes(WordEncoding::F32, &bytes), words);
    }

    #[test]
    fn test_padded() {
        assert_eq!(padded(&[1u16, 2], 4), vec![1, 2, 0, 0]);
        assert_eq!(padded(&[1u16, 2, 3], 2), vec![1, 2]);
    }

    #[test]
    fn test_empty_accepts_list() {
        let empty: Empty = serde_json::from_str("[]").unwrap();
        assert_eq!(empty, Empty {});
        assert_eq!(serde_json::to_string(&Empty {}).unwrap(), "{}");
    }
}
