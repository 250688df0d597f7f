//! Type-erased register banks
//!
//! [`Bank`] holds the three consistent views of one bank (register words,
//! fields, user values) for any known [`RegisterMapKind`]. Updates always go
//! through fields and re-encode the registers, so the views never drift.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::current_family::*;
use crate::error::{RegisterError, Result};
use crate::register::{padded, BankAddress, RegisterMap, RegisterWords, UserSync, Word, WordEncoding};

/// Registers, fields and user values of one bank
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = ""))]
pub struct BankState<M: RegisterMap> {
    pub registers: Vec<M::Word>,
    pub fields: M::Fields,
    pub user: M::User,
    #[serde(skip)]
    pub sampling_rate: f64,
}

impl<M: UserSync> BankState<M> {
    /// Build from register words, zero-padding or truncating to the bank size
    pub fn from_words(words: &[M::Word], sampling_rate: f64) -> Self {
        let registers = padded(words, M::REGISTER_COUNT);
        let fields = M::decode(&registers);
        let user = M::fields_to_user(&fields, sampling_rate);
        Self {
            registers,
            fields,
            user,
            sampling_rate,
        }
    }

    /// Build from fields; values wider than their bit field are truncated
    pub fn from_fields(fields: &M::Fields, sampling_rate: f64) -> Self {
        Self::from_words(&M::encode(fields), sampling_rate)
    }

    /// Build from a complete field map
    ///
    /// Every field of the bank must be present, nested records included.
    pub fn from_fields_map(fields: &Map<String, Value>, sampling_rate: f64) -> Result<Self> {
        let fields = record_from_map(&M::decode(&[]), fields, M::NAME)?;
        Ok(Self::from_fields(&fields, sampling_rate))
    }

    /// Merge a partial field update, then recompute user values and registers
    pub fn apply_fields(&mut self, patch: &Map<String, Value>) -> Result<()> {
        let fields = merge_record(&self.fields, patch, M::NAME)?;
        *self = Self::from_fields(&fields, self.sampling_rate);
        Ok(())
    }

    /// Merge a partial user update, then recompute fields and registers
    pub fn apply_user(&mut self, patch: &Map<String, Value>) -> Result<()> {
        if !M::INVERTIBLE {
            return Err(RegisterError::NotInvertible { command: M::NAME });
        }
        let user = merge_record(&self.user, patch, M::NAME)?;
        let fields = M::sync_fields(&user, &self.fields, self.sampling_rate)?;
        *self = Self::from_fields(&fields, self.sampling_rate);
        Ok(())
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn require_keys(
    template: &Value,
    map: &Map<String, Value>,
    prefix: &str,
    command: &'static str,
) -> Result<()> {
    let Value::Object(expected) = template else {
        return Ok(());
    };
    for (key, expected_value) in expected {
        let path = join_path(prefix, key);
        match map.get(key) {
            None => return Err(RegisterError::MissingField { field: path, command }),
            Some(Value::Object(inner)) => require_keys(expected_value, inner, &path, command)?,
            Some(_) => {}
        }
    }
    Ok(())
}

fn record_from_map<T: Serialize + DeserializeOwned>(
    template: &T,
    map: &Map<String, Value>,
    command: &'static str,
) -> Result<T> {
    let template =
        serde_json::to_value(template).map_err(|source| RegisterError::InvalidValue { command, source })?;
    require_keys(&template, map, "", command)?;
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|source| RegisterError::InvalidValue { command, source })
}

fn merge_into(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    prefix: &str,
    command: &'static str,
) -> Result<()> {
    for (key, value) in patch {
        let path = join_path(prefix, key);
        let Some(slot) = target.get_mut(key) else {
            return Err(RegisterError::UnknownField { field: path, command });
        };
        match (slot, value) {
            (Value::Object(nested), Value::Object(inner)) => merge_into(nested, inner, &path, command)?,
            (slot, value) => *slot = value.clone(),
        }
    }
    Ok(())
}

fn merge_record<T: Serialize + DeserializeOwned>(
    current: &T,
    patch: &Map<String, Value>,
    command: &'static str,
) -> Result<T> {
    let value =
        serde_json::to_value(current).map_err(|source| RegisterError::InvalidValue { command, source })?;
    let mut record = match value {
        Value::Object(record) => record,
        _ => Map::new(),
    };
    merge_into(&mut record, patch, "", command)?;
    serde_json::from_value(Value::Object(record))
        .map_err(|source| RegisterError::InvalidValue { command, source })
}

macro_rules! register_maps {
    ($($variant:ident => $map:ty),* $(,)?) => {
        /// Every bank layout, selected by command name
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RegisterMapKind {
            $($variant),*
        }

        impl RegisterMapKind {
            /// Command name
            pub fn name(&self) -> &'static str {
                match self {
                    $(RegisterMapKind::$variant => <$map as RegisterMap>::NAME),*
                }
            }

            pub fn all() -> Vec<RegisterMapKind> {
                vec![$(RegisterMapKind::$variant),*]
            }

            pub fn register_count(&self) -> usize {
                match self {
                    $(RegisterMapKind::$variant => <$map as RegisterMap>::REGISTER_COUNT),*
                }
            }

            pub fn encoding(&self) -> WordEncoding {
                match self {
                    $(RegisterMapKind::$variant => <<$map as RegisterMap>::Word as Word>::ENCODING),*
                }
            }

            pub fn address(&self) -> BankAddress {
                match self {
                    $(RegisterMapKind::$variant => <$map as RegisterMap>::ADDRESS),*
                }
            }

            /// Whether user values can be written back as fields
            pub fn is_invertible(&self) -> bool {
                match self {
                    $(RegisterMapKind::$variant => <$map as UserSync>::INVERTIBLE),*
                }
            }

            /// Decode register words read from a device
            pub fn decode(&self, words: RegisterWords, sampling_rate: f64) -> Result<Bank> {
                let actual = words.encoding();
                match self {
                    $(RegisterMapKind::$variant => {
                        let words = <<$map as RegisterMap>::Word as Word>::unwrap_words(words)
                            .ok_or(RegisterError::EncodingMismatch {
                                command: self.name(),
                                expected: self.encoding(),
                                actual,
                            })?;
                        Ok(Bank::$variant(BankState::from_words(&words, sampling_rate)))
                    })*
                }
            }

            /// Build a bank from a complete field map
            pub fn load_fields(&self, fields: &Map<String, Value>, sampling_rate: f64) -> Result<Bank> {
                match self {
                    $(RegisterMapKind::$variant => {
                        Ok(Bank::$variant(BankState::from_fields_map(fields, sampling_rate)?))
                    })*
                }
            }
        }

        /// A bank of any kind
        ///
        /// Serializes as `{"registers": [...], "fields": {...}, "user": {...}}`.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum Bank {
            $($variant(BankState<$map>)),*
        }

        impl Bank {
            pub fn kind(&self) -> RegisterMapKind {
                match self {
                    $(Bank::$variant(_) => RegisterMapKind::$variant),*
                }
            }

            pub fn registers(&self) -> RegisterWords {
                match self {
                    $(Bank::$variant(state) => {
                        <<$map as RegisterMap>::Word as Word>::wrap(state.registers.clone())
                    })*
                }
            }

            pub fn fields_json(&self) -> Result<Value> {
                let command = self.kind().name();
                let value = match self {
                    $(Bank::$variant(state) => serde_json::to_value(&state.fields)),*
                };
                value.map_err(|source| RegisterError::InvalidValue { command, source })
            }

            pub fn user_json(&self) -> Result<Value> {
                let command = self.kind().name();
                let value = match self {
                    $(Bank::$variant(state) => serde_json::to_value(&state.user)),*
                };
                value.map_err(|source| RegisterError::InvalidValue { command, source })
            }

            /// See [`BankState::apply_fields`]
            pub fn apply_fields(&mut self, patch: &Map<String, Value>) -> Result<()> {
                match self {
                    $(Bank::$variant(state) => state.apply_fields(patch)),*
                }
            }

            /// See [`BankState::apply_user`]
            pub fn apply_user(&mut self, patch: &Map<String, Value>) -> Result<()> {
                match self {
                    $(Bank::$variant(state) => state.apply_user(patch)),*
                }
            }
        }
    };
}

register_maps! {
    ArmPing => ArmPing,
    FpgaCtrl => FpgaCtrl,
    FpgaAction => FpgaAction,
    FpgaStatistics => FpgaStatistics,
    FpgaResults => FpgaResults,
    FpgaHistogram => FpgaHistogram,
    FpgaListMode => FpgaListMode,
    FpgaLmNrl1 => FpgaLmNrl1,
    FpgaTrace => FpgaTrace,
    FpgaWeights => FpgaWeights,
    FpgaTimeSlice => FpgaTimeSlice,
    ArmVersion => ArmVersion,
    ArmStatus => ArmStatus,
    ArmCtrl => ArmCtrl,
    ArmCal => ArmCal,
}

static KINDS_BY_NAME: Lazy<HashMap<&'static str, RegisterMapKind>> = Lazy::new(|| {
    RegisterMapKind::all()
        .into_iter()
        .map(|kind| (kind.name(), kind))
        .collect()
});

impl RegisterMapKind {
    /// Look up a bank by command name
    pub fn from_name(name: &str) -> Result<Self> {
        KINDS_BY_NAME
            .get(name)
            .copied()
            .ok_or_else(|| RegisterError::UnknownCommand(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_names_are_unique() {
        assert_eq!(KINDS_BY_NAME.len(), RegisterMapKind::all().len());
        for kind in RegisterMapKind::all() {
            assert_eq!(RegisterMapKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_every_kind_decodes_short_input() {
        for kind in RegisterMapKind::all() {
            let bank = kind
                .decode(RegisterWords::zeroed(kind.encoding(), 1), 40e6)
                .unwrap();
            assert_eq!(bank.kind(), kind);
            assert_eq!(bank.registers().len(), kind.register_count(), "{}", kind.name());
        }
    }

    fn patterned_words(kind: RegisterMapKind) -> RegisterWords {
        let modulus: u64 = match kind.encoding() {
            WordEncoding::U32 => 1 << 32,
            WordEncoding::U16 | WordEncoding::F32 => 1 << 16,
        };
        let values: Vec<f64> = (0..kind.register_count() as u64)
            .map(|i| ((i * 2_654_435_761 + 0x9E37) % modulus) as f64)
            .collect();
        RegisterWords::from_values(kind.encoding(), &values)
    }

    #[test]
    fn test_every_kind_round_trips_through_fields() {
        for kind in RegisterMapKind::all() {
            let mut bank = kind.decode(patterned_words(kind), 40e6).unwrap();
            let decoded = bank.fields_json().unwrap();

            bank.apply_fields(&Map::new()).unwrap();
            assert_eq!(bank.fields_json().unwrap(), decoded, "{}", kind.name());

            let encoded = bank.registers();
            bank.apply_fields(&Map::new()).unwrap();
            assert_eq!(bank.registers(), encoded, "{}", kind.name());
            assert_eq!(bank.fields_json().unwrap(), decoded, "{}", kind.name());
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            RegisterMapKind::from_name("fpga_bogus"),
            Err(RegisterError::UnknownCommand(name)) if name == "fpga_bogus"
        ));
    }

    #[test]
    fn test_geometry() {
        assert_eq!(RegisterMapKind::FpgaLmNrl1.register_count(), 12288);
        assert_eq!(RegisterMapKind::ArmStatus.encoding(), WordEncoding::F32);
        assert_eq!(RegisterMapKind::FpgaAction.address().address, 7);
        assert!(RegisterMapKind::FpgaCtrl.is_invertible());
        assert!(!RegisterMapKind::FpgaResults.is_invertible());
    }

    #[test]
    fn test_encoding_mismatch() {
        let words = RegisterWords::U32(vec![0; 16]);
        assert!(matches!(
            RegisterMapKind::FpgaCtrl.decode(words, 40e6),
            Err(RegisterError::EncodingMismatch { .. })
        ));
    }

    #[test]
    fn test_load_fields_names_missing_key() {
        let mut fields = object(serde_json::to_value(FpgaCtrl::decode(&[])).unwrap());
        fields.remove("led_on");
        match RegisterMapKind::FpgaCtrl.load_fields(&fields, 40e6) {
            Err(RegisterError::MissingField { field, command }) => {
                assert_eq!(field, "led_on");
                assert_eq!(command, "fpga_ctrl");
            }
            other => panic!("expected missing field: {other:?}"),
        }
    }

    #[test]
    fn test_load_fields_nested_path() {
        let fields = object(json!({
            "bank_0": {"ct": 1, "ev": 0, "ts": 0, "dt": 0, "xev0": 0, "xev1": 0, "xev2": 0, "xev3": 0},
            "bank_1": {"ct": 1, "ev": 0, "ts": 0, "dt": 0, "xev0": 0, "xev1": 0, "xev2": 0}
        }));
        match RegisterMapKind::FpgaStatistics.load_fields(&fields, 40e6) {
            Err(RegisterError::MissingField { field, .. }) => assert_eq!(field, "bank_1.xev3"),
            other => panic!("expected missing field: {other:?}"),
        }
    }

    #[test]
    fn test_apply_fields_reencodes() {
        let mut bank = RegisterMapKind::FpgaCtrl
            .decode(RegisterWords::U16(vec![0; 16]), 40e6)
            .unwrap();
        bank.apply_fields(&object(json!({"integration_time": 100, "lm_mode": 1})))
            .unwrap();

        let RegisterWords::U16(words) = bank.registers() else {
            panic!("fpga_ctrl words are u16");
        };
        assert_eq!(words[4], 100);
        assert_eq!(words[15], 0x4);
        let user = bank.user_json().unwrap();
        assert!((user["integration_time"].as_f64().unwrap() - 2.5e-6).abs() < 1e-15);
    }

    #[test]
    fn test_apply_fields_masks_within_storage_type() {
        let mut bank = RegisterMapKind::FpgaCtrl
            .decode(RegisterWords::U16(vec![0; 16]), 40e6)
            .unwrap();
        bank.apply_fields(&object(json!({"baseline_threshold": 5000})))
            .unwrap();
        assert_eq!(bank.fields_json().unwrap()["baseline_threshold"], json!(904));

        let before = bank.registers();
        assert!(matches!(
            bank.apply_fields(&object(json!({"baseline_threshold": 70000}))),
            Err(RegisterError::InvalidValue { command: "fpga_ctrl", .. })
        ));
        assert_eq!(bank.registers(), before);
    }

    #[test]
    fn test_apply_fields_rejects_unknown_key() {
        let mut bank = RegisterMapKind::FpgaAction
            .decode(RegisterWords::U16(vec![0; 4]), 40e6)
            .unwrap();
        match bank.apply_fields(&object(json!({"clear_everything": 1}))) {
            Err(RegisterError::UnknownField { field, command }) => {
                assert_eq!(field, "clear_everything");
                assert_eq!(command, "fpga_action");
            }
            other => panic!("expected unknown field: {other:?}"),
        }
    }

    #[test]
    fn test_apply_user_requires_inverse() {
        let mut bank = RegisterMapKind::FpgaResults
            .decode(RegisterWords::U16(vec![0; 32]), 40e6)
            .unwrap();
        assert!(matches!(
            bank.apply_user(&object(json!({"temperature": 20.0}))),
            Err(RegisterError::NotInvertible { command: "fpga_results" })
        ));
    }

    #[test]
    fn test_apply_user_recomputes_fields() {
        let mut bank = RegisterMapKind::ArmCtrl
            .decode(RegisterWords::F32(vec![0.0; 12]), 40e6)
            .unwrap();
        bank.apply_user(&object(json!({"gs_mode": 2}))).unwrap();
        assert_eq!(bank.registers(), {
            let mut words = vec![0.0f32; 12];
            words[0] = 2.0;
            RegisterWords::F32(words)
        });
        assert_eq!(bank.fields_json().unwrap()["gain_stabilization"], json!(2.0));
    }

    #[test]
    fn test_bank_serializes_three_views() {
        let bank = RegisterMapKind::FpgaAction
            .decode(RegisterWords::U16(vec![0x1, 0, 0, 0]), 40e6)
            .unwrap();
        let value = serde_json::to_value(&bank).unwrap();
        assert_eq!(value["registers"], json!([1, 0, 0, 0]));
        assert_eq!(value["fields"]["clear_histogram"], json!(1));
        assert_eq!(value["user"], json!({}));
    }
}
