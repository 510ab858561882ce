//! Deep-merge for layered JSON5 configuration values.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// Objects merge recursively; any other value in `overlay` replaces the
/// corresponding value in `base` wholesale, including arrays.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_json_values(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}
