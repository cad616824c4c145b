//! Field-by-field merging of configuration tiers.
//!
//! Objects merge recursively; every other value from a higher tier replaces
//! the lower one. Arrays are replaced, never concatenated.

use serde_json::Value;

/// Merge `overlay` onto `base`, with `overlay` taking precedence.
///
/// A `null` in the overlay means "not specified" and keeps the base value.
///
/// # Example
/// ```
/// use serde_json::json;
/// use task_tracker::config::deep_merge;
///
/// let defaults = json!({"server": {"host": "127.0.0.1", "port": 8000}});
/// let project = json!({"server": {"port": 9000}});
/// assert_eq!(
///     deep_merge(defaults, project),
///     json!({"server": {"host": "127.0.0.1", "port": 9000}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers in order, later tiers winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
