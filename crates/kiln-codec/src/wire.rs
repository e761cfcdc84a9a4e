//! Order-preserving wire representation of a chunk body.
//!
//! `serde_json::Value` sorts object members, which would change canonical
//! bytes on a decode/re-encode cycle. These types keep members in the order
//! they were written and recognize reference tokens while parsing.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use kiln_types::ObjectId;

/// Member key of a reference token.
pub const REF_KEY: &str = "__ref";
/// Member key of the stored closure table.
pub const CLOSURE_KEY: &str = "__closure";
/// Member key of the stored chunk id.
pub const ID_KEY: &str = "id";
/// Wire prefix marking a detached property.
pub const DETACH_PREFIX: char = '@';

/// A value as it appears in a chunk body.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<WireValue>),
    Object(WireObject),
    Ref(ObjectId),
}

/// One member of a [`WireObject`].
#[derive(Clone, Debug, PartialEq)]
pub struct WireField {
    /// Property name without the detach prefix.
    pub key: String,
    pub detached: bool,
    pub value: WireValue,
}

/// An ordered object: a chunk body or an inline node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WireObject {
    pub fields: Vec<WireField>,
}

impl WireObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, detached: bool, value: WireValue) {
        self.fields.push(WireField {
            key: key.into(),
            detached,
            value,
        });
    }

    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Every reference token in this object, depth first, without repeats.
    pub fn references(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        for field in &self.fields {
            field.value.collect_refs(&mut out);
        }
        out
    }
}

impl WireValue {
    fn collect_refs(&self, out: &mut Vec<ObjectId>) {
        match self {
            Self::Ref(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Object(obj) => obj.fields.iter().for_each(|f| f.value.collect_refs(out)),
            _ => {}
        }
    }
}

/// Split a raw member key into (name, detached).
pub(crate) fn split_key(raw: String) -> (String, bool) {
    match raw.strip_prefix(DETACH_PREFIX) {
        Some(name) => (name.to_string(), true),
        None => (raw, false),
    }
}

/// The on-wire member key for a field.
pub(crate) fn wire_key(field: &WireField) -> String {
    if field.detached {
        format!("{DETACH_PREFIX}{}", field.key)
    } else {
        field.key.clone()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(obj) => obj.serialize(serializer),
            Self::Ref(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(REF_KEY, id)?;
                map.end()
            }
        }
    }
}

impl Serialize for WireObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&wire_key(field), &field.value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Deserialization
// ---------------------------------------------------------------------------

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a chunk value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        Ok(WireValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        Ok(WireValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireValue, A::Error> {
        let mut obj = WireObject::new();
        let mut first = true;
        while let Some(raw) = map.next_key::<String>()? {
            if first && raw == REF_KEY {
                let id: ObjectId = map.next_value()?;
                if map.next_key::<String>()?.is_some() {
                    return Err(de::Error::custom("reference token with extra members"));
                }
                return Ok(WireValue::Ref(id));
            }
            first = false;
            let value: WireValue = map.next_value()?;
            let (key, detached) = split_key(raw);
            obj.fields.push(WireField {
                key,
                detached,
                value,
            });
        }
        Ok(WireValue::Object(obj))
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}
