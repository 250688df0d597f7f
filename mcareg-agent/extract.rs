//! Replay of saved settings
//!
//! A settings file maps command names to previously captured fields:
//!
//! ```json
//! {"fpga_ctrl": {"fields": {"fine_gain": 20000, ...}},
//!  "fpga_action": {"fields": {...}}}
//! ```
//!
//! Each entry is pushed through fields -> user -> registers so the register
//! image a device would receive can be inspected.

use mcareg_raw::current_family::action::SELF_CLEARING_FIELDS;
use mcareg_raw::{Bank, RegisterMapKind};
use serde_json::{Map, Value};

use crate::error::{McaError, Result};

/// Fill self-clearing action flags that were not saved
///
/// The FPGA resets these bits after acting on them, so a capture taken at
/// the wrong moment may lack them; 0 is their resting value.
fn default_self_clearing(command: &str, fields: &mut Map<String, Value>) {
    if command != RegisterMapKind::FpgaAction.name() {
        return;
    }
    for field in SELF_CLEARING_FIELDS {
        if !fields.contains_key(field) {
            tracing::warn!(
                "Missing self-clearing field '{}' in {}, using 0",
                field,
                command
            );
            fields.insert(field.to_string(), Value::from(0));
        }
    }
}

fn extract_one(command: &str, entry: &Value, sampling_rate: f64) -> Result<Bank> {
    let kind = RegisterMapKind::from_name(command)?;
    let mut fields = match entry.get("fields") {
        Some(Value::Object(fields)) => fields.clone(),
        _ => {
            return Err(McaError::ConfigError(format!(
                "{command}: expected a \"fields\" object"
            )))
        }
    };
    default_self_clearing(command, &mut fields);
    Ok(kind.load_fields(&fields, sampling_rate)?)
}

/// Rebuild user values and registers for every command in a settings document
///
/// A command that cannot be rebuilt is reported and skipped; the rest are
/// still processed.
pub fn extract_registers(
    settings: &Value,
    sampling_rate: f64,
) -> Result<Vec<(String, Result<Bank>)>> {
    let Value::Object(commands) = settings else {
        return Err(McaError::ConfigError(
            "settings must map command names to saved fields".to_string(),
        ));
    };

    let mut results = Vec::with_capacity(commands.len());
    for (command, entry) in commands {
        let result = extract_one(command, entry, sampling_rate);
        match &result {
            Ok(_) => tracing::info!("Computed registers for {}", command),
            Err(McaError::RegisterError(mcareg_raw::RegisterError::MissingField {
                field, ..
            })) => tracing::error!(
                "Skipping {}: field '{}' is missing from the settings file; add a reasonable value for it",
                command,
                field
            ),
            Err(e) => tracing::error!("Skipping {}: {}", command, e),
        }
        results.push((command.clone(), result));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcareg_raw::current_family::action::ActionFields;
    use mcareg_raw::current_family::ctrl::CtrlFields;
    use mcareg_raw::RegisterWords;
    use serde_json::json;

    fn fields_of<T: serde::Serialize>(value: T) -> Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn test_complete_settings() {
        let ctrl = CtrlFields {
            integration_time: 80,
            ..Default::default()
        };
        let settings = json!({"fpga_ctrl": {"fields": fields_of(ctrl)}});
        let results = extract_registers(&settings, 40e6).unwrap();
        assert_eq!(results.len(), 1);

        let bank = results[0].1.as_ref().unwrap();
        let RegisterWords::U16(words) = bank.registers() else {
            panic!("fpga_ctrl is a 16-bit bank");
        };
        assert_eq!(words[4], 80);
        let user = bank.user_json().unwrap();
        assert!((user["integration_time"].as_f64().unwrap() - 2e-6).abs() < 1e-15);
    }

    #[test]
    fn test_self_clearing_fields_default_to_zero() {
        let mut fields = fields_of(ActionFields {
            histo_run: 1,
            ..Default::default()
        });
        let map = fields.as_object_mut().unwrap();
        map.remove("clear_histogram");
        map.remove("clear_roi");

        let settings = json!({"fpga_action": {"fields": fields}});
        let results = extract_registers(&settings, 40e6).unwrap();
        let bank = results[0].1.as_ref().unwrap();
        assert_eq!(bank.registers(), RegisterWords::U16(vec![0, 0, 1, 0]));
    }

    #[test]
    fn test_missing_field_skips_only_that_command() {
        let mut ctrl = fields_of(CtrlFields::default());
        ctrl.as_object_mut().unwrap().remove("led_on");
        let mut action = fields_of(ActionFields::default());
        action.as_object_mut().unwrap().remove("ut_run");

        let settings = json!({
            "fpga_action": {"fields": action},
            "fpga_ctrl": {"fields": ctrl},
            "arm_ping": {"fields": {}},
        });
        let results = extract_registers(&settings, 40e6).unwrap();
        assert_eq!(results.len(), 3);

        for (command, result) in &results {
            match command.as_str() {
                "arm_ping" => assert!(result.is_ok()),
                "fpga_ctrl" => assert!(matches!(
                    result,
                    Err(McaError::RegisterError(mcareg_raw::RegisterError::MissingField { field, command }))
                        if field == "led_on" && *command == "fpga_ctrl"
                )),
                // ut_run is not self-clearing, so it is never defaulted
                "fpga_action" => assert!(matches!(
                    result,
                    Err(McaError::RegisterError(mcareg_raw::RegisterError::MissingField { field, .. }))
                        if field == "ut_run"
                )),
                other => panic!("unexpected command {other}"),
            }
        }
    }

    #[test]
    fn test_bad_entries() {
        let settings = json!({"fpga_bogus": {"fields": {}}, "fpga_ctrl": {"registers": []}});
        let results = extract_registers(&settings, 40e6).unwrap();
        assert!(matches!(
            results[0].1,
            Err(McaError::RegisterError(mcareg_raw::RegisterError::UnknownCommand(_)))
        ));
        assert!(matches!(results[1].1, Err(McaError::ConfigError(_))));

        assert!(extract_registers(&json!([1, 2]), 40e6).is_err());
    }
}
