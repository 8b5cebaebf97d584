//! Dotted-path partial updates (`"control.auto_mode" = false`).
//!
//! Updates are applied to the serialized form of a [`Config`], the result is
//! deserialized back into the typed struct and validated. Nothing is written
//! unless the merged configuration is valid as a whole.

use super::Config;
use crate::error::{HeliosError, Result};
use serde_json::Value;

/// A single dotted-path assignment
pub type FieldUpdate = (String, Value);

/// Flatten a JSON object of `{"a.b": value}` pairs into field updates
pub fn updates_from_map(map: &serde_json::Map<String, Value>) -> Vec<FieldUpdate> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Apply updates to a copy of `base`, returning the validated result
pub fn apply_updates(base: &Config, updates: &[FieldUpdate]) -> Result<Config> {
    if updates.is_empty() {
        return Err(HeliosError::config("No updates given"));
    }

    let mut doc = serde_json::to_value(base)?;
    for (path, value) in updates {
        set_path(&mut doc, path, value.clone())?;
    }

    let merged: Config = serde_json::from_value(doc).map_err(|e| HeliosError::Validation {
        field: updates
            .iter()
            .map(|(p, _)| p.as_str())
            .collect::<Vec<_>>()
            .join(","),
        message: e.to_string(),
    })?;
    merged.validate()?;
    Ok(merged)
}

/// Assign `value` at `path` inside `doc`; every segment must already exist
fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(HeliosError::Validation {
            field: path.to_string(),
            message: "Malformed key path".to_string(),
        });
    }

    let unknown = || HeliosError::Validation {
        field: path.to_string(),
        message: "Unknown configuration key".to_string(),
    };

    let (leaf, parents) = segments.split_last().ok_or_else(unknown)?;
    let mut cursor = doc;
    for seg in parents {
        cursor = cursor
            .as_object_mut()
            .and_then(|obj| obj.get_mut(*seg))
            .ok_or_else(unknown)?;
    }

    let obj = cursor.as_object_mut().ok_or_else(unknown)?;
    match obj.get_mut(*leaf) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_nested_update() {
        let base = Config::default();
        let merged = apply_updates(
            &base,
            &[
                ("control.auto_mode".to_string(), json!(false)),
                ("control.manual_socket_state".to_string(), json!(true)),
            ],
        )
        .unwrap();
        assert!(!merged.control.auto_mode);
        assert_eq!(merged.control.manual_socket_state, Some(true));
        // untouched sections survive
        assert_eq!(merged.electrical, base.electrical);
    }

    #[test]
    fn top_level_scalar_update() {
        let merged = apply_updates(
            &Config::default(),
            &[("timezone".to_string(), json!("Europe/Amsterdam"))],
        )
        .unwrap();
        assert_eq!(merged.timezone, "Europe/Amsterdam");
    }

    #[test]
    fn unknown_path_rejected() {
        let err = apply_updates(
            &Config::default(),
            &[("control.turbo".to_string(), json!(true))],
        )
        .unwrap_err();
        assert!(matches!(err, HeliosError::Validation { .. }));

        assert!(
            apply_updates(&Config::default(), &[("nope.x".to_string(), json!(1))]).is_err()
        );
        assert!(
            apply_updates(&Config::default(), &[("control..auto_mode".to_string(), json!(1))])
                .is_err()
        );
    }

    #[test]
    fn wrong_type_rejected() {
        let err = apply_updates(
            &Config::default(),
            &[("sampling.window_s".to_string(), json!("long"))],
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_result_rejected() {
        let err = apply_updates(
            &Config::default(),
            &[("electrical.safety_margin".to_string(), json!(1.5))],
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn clearing_optional_value() {
        let mut base = Config::default();
        base.control.manual_socket_state = Some(true);
        let merged = apply_updates(
            &base,
            &[("control.manual_socket_state".to_string(), Value::Null)],
        )
        .unwrap();
        assert_eq!(merged.control.manual_socket_state, None);
    }
}
