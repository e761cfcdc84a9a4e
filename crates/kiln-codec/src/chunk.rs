use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};

use kiln_types::{Closure, ObjectId};

use crate::canonical::{encode, object_id};
use crate::error::{CodecError, CodecResult};
use crate::hasher::ContentHasher;
use crate::wire::{split_key, wire_key, WireField, WireObject, WireValue, CLOSURE_KEY, ID_KEY};

/// A stored chunk: a canonical body plus its id and closure table.
///
/// The stored payload is the body's members wrapped as
/// `{"id": .., <members>, "__closure": {..}}`. Only the body is hashed.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub id: ObjectId,
    pub body: WireObject,
    pub closure: Closure,
}

impl Chunk {
    /// Build a chunk, computing its id from the canonical body.
    pub fn new(body: WireObject, closure: Closure) -> CodecResult<Self> {
        let id = object_id(&body)?;
        Ok(Self { id, body, closure })
    }

    /// Render the stored payload.
    pub fn to_payload(&self) -> CodecResult<String> {
        serde_json::to_string(self).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Parse a stored payload. Does not verify the id; see [`Chunk::verify`].
    pub fn decode(payload: &str) -> CodecResult<Self> {
        serde_json::from_str(payload).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Canonical bytes of the body (the hash input).
    pub fn canonical_bytes(&self) -> CodecResult<Vec<u8>> {
        encode(&self.body)
    }

    /// Check that the body hashes to `expected` and that the embedded id
    /// agrees with it.
    pub fn verify(&self, expected: &ObjectId) -> CodecResult<()> {
        let computed = ContentHasher::OBJECT.hash(&self.canonical_bytes()?);
        if computed != *expected || self.id != *expected {
            return Err(CodecError::HashMismatch {
                expected: *expected,
                computed,
            });
        }
        Ok(())
    }

    /// Ids this chunk references directly.
    pub fn references(&self) -> Vec<ObjectId> {
        self.body.references()
    }
}

impl Serialize for Chunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = if self.closure.is_empty() { 1 } else { 2 };
        let mut map = serializer.serialize_map(Some(self.body.fields.len() + extra))?;
        map.serialize_entry(ID_KEY, &self.id)?;
        for field in &self.body.fields {
            map.serialize_entry(&wire_key(field), &field.value)?;
        }
        if !self.closure.is_empty() {
            map.serialize_entry(CLOSURE_KEY, &self.closure)?;
        }
        map.end()
    }
}

struct ChunkVisitor;

impl<'de> Visitor<'de> for ChunkVisitor {
    type Value = Chunk;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a stored chunk object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Chunk, A::Error> {
        let mut id = None;
        let mut closure = Closure::new();
        let mut body = WireObject::new();
        while let Some(raw) = map.next_key::<String>()? {
            if raw == ID_KEY {
                if id.is_some() {
                    return Err(de::Error::duplicate_field(ID_KEY));
                }
                id = Some(map.next_value::<ObjectId>()?);
            } else if raw == CLOSURE_KEY {
                closure = map.next_value()?;
            } else {
                let value: WireValue = map.next_value()?;
                let (key, detached) = split_key(raw);
                body.fields.push(WireField {
                    key,
                    detached,
                    value,
                });
            }
        }
        let id = id.ok_or_else(|| de::Error::missing_field(ID_KEY))?;
        Ok(Chunk { id, body, closure })
    }
}

impl<'de> Deserialize<'de> for Chunk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ChunkVisitor)
    }
}
