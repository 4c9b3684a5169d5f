//! A `serde::Serializer` that builds [`Value`] trees.
//!
//! Enums follow serde_json's externally tagged layout: a unit variant is its
//! name, every other variant is a one-entry map keyed by the name.
//!
//! Integers become [`Value::Int`] whenever they fit in an `i64`, whatever
//! their Rust type, so `serde_json` numbers and native integers agree.
//! [`Value::UInt`] is kept for unsigned values above `i64::MAX`.
//!
//! A serializer built with [`ValueSerializer::for_paths`] only converts the
//! record fields and map entries on the given paths. Everything else is left
//! out of the tree without being serialized.

use std::collections::BTreeMap;

use serde::ser::{self, Serialize};

use super::valuer::UNBINDABLE_TOKEN;
use super::Value;
use crate::error::SqlTmplError;

/// Field paths a render reads, as a prefix tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTree {
    /// The whole value at this node is read.
    whole: bool,
    children: BTreeMap<String, PathTree>,
}

/// Shared by list elements below a pruned path: lookups never enter lists.
static UNREACHABLE: PathTree = PathTree {
    whole: false,
    children: BTreeMap::new(),
};

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one path. An empty path marks the whole value.
    pub fn insert<S: AsRef<str>>(&mut self, path: &[S]) {
        let mut node = self;
        for name in path {
            if node.whole {
                return;
            }
            node = node.children.entry(name.as_ref().to_string()).or_default();
        }
        node.whole = true;
        node.children.clear();
    }

    pub fn is_whole(&self) -> bool {
        self.whole
    }

    fn get(&self, name: &str) -> Option<&PathTree> {
        self.children.get(name)
    }
}

impl<S: AsRef<str>> FromIterator<Vec<S>> for PathTree {
    fn from_iter<I: IntoIterator<Item = Vec<S>>>(paths: I) -> Self {
        let mut tree = PathTree::new();
        for path in paths {
            tree.insert(&path);
        }
        tree
    }
}

/// Serializer producing a [`Value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueSerializer<'p> {
    /// `None` converts everything.
    paths: Option<&'p PathTree>,
}

impl<'p> ValueSerializer<'p> {
    /// Convert the full value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert only what `paths` reads.
    pub fn for_paths(paths: &'p PathTree) -> Self {
        Self {
            paths: (!paths.whole).then_some(paths),
        }
    }

    /// Serializer for the entry `name`; `None` if nothing below it is read.
    fn entry(self, name: &str) -> Option<Self> {
        match self.paths {
            None => Some(self),
            Some(tree) => tree.get(name).map(Self::for_paths),
        }
    }

    /// Serializer for list elements.
    fn elements(self) -> Self {
        match self.paths {
            None => self,
            Some(_) => Self::for_paths(&UNREACHABLE),
        }
    }
}

fn int_from_u64(v: u64) -> Value {
    i64::try_from(v).map_or(Value::UInt(v), Value::Int)
}

impl<'p> ser::Serializer for ValueSerializer<'p> {
    type Ok = Value;
    type Error = SqlTmplError;

    type SerializeSeq = SerializeList<'p>;
    type SerializeTuple = SerializeList<'p>;
    type SerializeTupleStruct = SerializeList<'p>;
    type SerializeTupleVariant = SerializeTupleVariant<'p>;
    type SerializeMap = SerializeMap<'p>;
    type SerializeStruct = SerializeRecord<'p>;
    type SerializeStructVariant = SerializeStructVariant<'p>;

    fn serialize_bool(self, v: bool) -> Result<Value, SqlTmplError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, SqlTmplError> {
        if let Ok(n) = i64::try_from(v) {
            return Ok(Value::Int(n));
        }
        u64::try_from(v)
            .map(Value::UInt)
            .map_err(|_| SqlTmplError::Conversion(format!("integer {} out of range", v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, SqlTmplError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, SqlTmplError> {
        Ok(int_from_u64(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, SqlTmplError> {
        u64::try_from(v)
            .map(int_from_u64)
            .map_err(|_| SqlTmplError::Conversion(format!("integer {} out of range", v)))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, SqlTmplError> {
        Ok(Value::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, SqlTmplError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, SqlTmplError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, SqlTmplError> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, SqlTmplError> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Value, SqlTmplError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, SqlTmplError> {
        Ok(Value::Optional(Box::new(value.serialize(self)?)))
    }

    fn serialize_unit(self) -> Result<Value, SqlTmplError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, SqlTmplError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, SqlTmplError> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value, SqlTmplError> {
        let inner = value.serialize(self)?;
        if name != UNBINDABLE_TOKEN {
            return Ok(inner);
        }
        Ok(match inner {
            Value::String(message) => Value::Unbindable(message),
            other => Value::Unbindable(format!("{:?}", other)),
        })
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, SqlTmplError> {
        let Some(inner) = self.entry(variant) else {
            return Ok(Value::Map(Vec::new()));
        };
        Ok(Value::Map(vec![(
            Value::String(variant.to_owned()),
            value.serialize(inner)?,
        )]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeList<'p>, SqlTmplError> {
        Ok(SerializeList {
            items: Vec::with_capacity(len.unwrap_or(0)),
            elements: self.elements(),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeList<'p>, SqlTmplError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeList<'p>, SqlTmplError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant<'p>, SqlTmplError> {
        Ok(SerializeTupleVariant {
            variant,
            items: Vec::with_capacity(len),
            elements: self.elements(),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeMap<'p>, SqlTmplError> {
        Ok(SerializeMap {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            next_key: None,
            serializer: self,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeRecord<'p>, SqlTmplError> {
        Ok(SerializeRecord {
            fields: Vec::with_capacity(len),
            serializer: Some(self),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeStructVariant<'p>, SqlTmplError> {
        Ok(SerializeStructVariant {
            variant,
            record: SerializeRecord {
                fields: Vec::with_capacity(len),
                serializer: self.entry(variant),
            },
        })
    }
}

pub struct SerializeList<'p> {
    items: Vec<Value>,
    elements: ValueSerializer<'p>,
}

impl ser::SerializeSeq for SerializeList<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SqlTmplError> {
        self.items.push(value.serialize(self.elements)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        Ok(Value::List(self.items))
    }
}

impl ser::SerializeTuple for SerializeList<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SqlTmplError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeList<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SqlTmplError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant<'p> {
    variant: &'static str,
    items: Vec<Value>,
    elements: ValueSerializer<'p>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SqlTmplError> {
        self.items.push(value.serialize(self.elements)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        Ok(Value::Map(vec![(
            Value::String(self.variant.to_owned()),
            Value::List(self.items),
        )]))
    }
}

pub struct SerializeMap<'p> {
    entries: Vec<(Value, Value)>,
    next_key: Option<Value>,
    serializer: ValueSerializer<'p>,
}

impl ser::SerializeMap for SerializeMap<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), SqlTmplError> {
        self.next_key = Some(key.serialize(ValueSerializer::new())?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SqlTmplError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| SqlTmplError::Conversion("map value without a key".to_string()))?;
        let serializer = match (&key, self.serializer.paths) {
            (_, None) => Some(self.serializer),
            (Value::String(name), Some(_)) => self.serializer.entry(name),
            // Only string keys are reachable by field paths.
            _ => None,
        };
        if let Some(serializer) = serializer {
            self.entries.push((key, value.serialize(serializer)?));
        }
        Ok(())
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        Ok(Value::Map(self.entries))
    }
}

pub struct SerializeRecord<'p> {
    fields: Vec<(String, Value)>,
    /// `None` when no field of this record is read.
    serializer: Option<ValueSerializer<'p>>,
}

impl ser::SerializeStruct for SerializeRecord<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SqlTmplError> {
        if let Some(serializer) = self.serializer.and_then(|s| s.entry(key)) {
            self.fields.push((key.to_owned(), value.serialize(serializer)?));
        }
        Ok(())
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        Ok(Value::Record(self.fields))
    }
}

pub struct SerializeStructVariant<'p> {
    variant: &'static str,
    record: SerializeRecord<'p>,
}

impl ser::SerializeStructVariant for SerializeStructVariant<'_> {
    type Ok = Value;
    type Error = SqlTmplError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SqlTmplError> {
        ser::SerializeStruct::serialize_field(&mut self.record, key, value)
    }

    fn end(self) -> Result<Value, SqlTmplError> {
        if self.record.serializer.is_none() {
            return Ok(Value::Map(Vec::new()));
        }
        Ok(Value::Map(vec![(
            Value::String(self.variant.to_owned()),
            Value::Record(self.record.fields),
        )]))
    }
}
