use kiln_types::ObjectId;

use crate::error::{CodecError, CodecResult};
use crate::hasher::ContentHasher;
use crate::wire::{WireObject, WireValue, CLOSURE_KEY, DETACH_PREFIX, ID_KEY, REF_KEY};

/// Encode a chunk body into its canonical bytes.
///
/// Members are written in the order they appear in `body`; two bodies with
/// the same members in a different order encode differently. Fails on
/// non-finite numbers and on keys that collide with the wire vocabulary.
pub fn encode(body: &WireObject) -> CodecResult<Vec<u8>> {
    validate_object(body)?;
    serde_json::to_vec(body).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Canonical id of a chunk body.
pub fn object_id(body: &WireObject) -> CodecResult<ObjectId> {
    Ok(ContentHasher::OBJECT.hash(&encode(body)?))
}

fn validate_object(obj: &WireObject) -> CodecResult<()> {
    for field in &obj.fields {
        validate_key(&field.key)?;
        validate_value(&field.key, &field.value)?;
    }
    Ok(())
}

fn validate_key(key: &str) -> CodecResult<()> {
    if key == ID_KEY || key == CLOSURE_KEY || key == REF_KEY {
        return Err(CodecError::ReservedKey(key.to_string()));
    }
    if key.starts_with(DETACH_PREFIX) || key.starts_with("__") {
        return Err(CodecError::ReservedKey(key.to_string()));
    }
    Ok(())
}

fn validate_value(key: &str, value: &WireValue) -> CodecResult<()> {
    match value {
        WireValue::Number(n) if !n.is_finite() => Err(CodecError::UnsupportedType {
            key: key.to_string(),
            reason: format!("number {n} is not finite"),
        }),
        WireValue::List(items) => items.iter().try_for_each(|v| validate_value(key, v)),
        WireValue::Object(obj) => validate_object(obj),
        _ => Ok(()),
    }
}
