//! Partial-patch merging for records whose patches travel as JSON objects.
//!
//! A patch may only name fields the record already has; nested objects merge
//! recursively and every other value (arrays included) replaces the old one.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::ApplyError;

/// Merges `patch` into the serialized form of `base` and decodes the result.
///
/// Top-level keys listed in `frozen` may appear in the patch only with their
/// current value.
pub fn merge_patch<T>(base: &T, patch: &Map<String, Value>, frozen: &[&str]) -> Result<T, ApplyError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = encode(base)?;
    let Value::Object(target) = &mut value else {
        return Err(ApplyError::validation("patch target is not a record"));
    };
    for key in frozen {
        if let Some(requested) = patch.get(*key) {
            if target.get(*key) != Some(requested) {
                return Err(ApplyError::validation(format!("field `{key}` cannot be changed")));
            }
        }
    }
    merge_object(target, patch, "")?;
    decode(value)
}

/// Like [`merge_patch`] but merges into the object found at `pointer`
/// (an RFC 6901 JSON pointer such as `/data`).
pub fn merge_patch_at<T>(base: &T, pointer: &str, patch: &Map<String, Value>) -> Result<T, ApplyError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = encode(base)?;
    match value.pointer_mut(pointer) {
        Some(Value::Object(target)) => merge_object(target, patch, pointer)?,
        _ => {
            return Err(ApplyError::validation(format!(
                "patch target `{pointer}` is not a record"
            )))
        }
    }
    decode(value)
}

fn merge_object(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    path: &str,
) -> Result<(), ApplyError> {
    for (key, incoming) in patch {
        let field_path = format!("{path}/{key}");
        let Some(current) = target.get_mut(key) else {
            return Err(ApplyError::validation(format!("unknown field `{field_path}`")));
        };
        match (current, incoming) {
            (Value::Object(current), Value::Object(incoming)) => {
                merge_object(current, incoming, &field_path)?
            }
            (current, incoming) => *current = incoming.clone(),
        }
    }
    Ok(())
}

fn encode<T: Serialize>(base: &T) -> Result<Value, ApplyError> {
    serde_json::to_value(base)
        .map_err(|error| ApplyError::validation(format!("record is not serializable: {error}")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApplyError> {
    serde_json::from_value(value)
        .map_err(|error| ApplyError::validation(format!("patched record is malformed: {error}")))
}
