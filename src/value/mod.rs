//! Parameter values.
//!
//! Parameter objects are any `serde::Serialize` type. Before rendering they
//! are converted into a [`Value`] tree, which keeps the distinction between
//! records (structs) and maps, and between a present optional and its
//! contents. Lookups, truthiness and argument extraction all work on that
//! tree.

mod ser;
mod valuer;

use std::borrow::Cow;
use std::fmt;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::ast::NumberValue;
use crate::config::MissingValue;
use crate::error::{SqlTmplError, SqlTmplResult};

pub use ser::{PathTree, ValueSerializer};
pub use valuer::{serialize_valuer, Bind, BoxError, Valuer};

/// A parameter value, and the type of every bound argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL: unit, `None`, unit structs
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Strings and chars
    String(String),
    Bytes(Vec<u8>),
    /// Sequences and tuples
    List(Vec<Value>),
    /// Map entries in serialization order
    Map(Vec<(Value, Value)>),
    /// Struct fields in declaration order
    Record(Vec<(String, Value)>),
    /// A present `Option` (or other pointer-like wrapper)
    Optional(Box<Value>),
    /// A value whose [`Valuer`] conversion failed
    Unbindable(String),
}

/// Convert any serializable value into a [`Value`].
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> SqlTmplResult<Value> {
    value.serialize(ValueSerializer::new())
}

impl Value {
    /// Strip `Optional` wrappers.
    pub fn peel(&self) -> &Value {
        let mut value = self;
        while let Value::Optional(inner) = value {
            value = inner;
        }
        value
    }

    /// Look up a map entry or record field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.peel() {
            Value::Map(entries) => entries
                .iter()
                .find(|(key, _)| matches!(key, Value::String(k) if k == name))
                .map(|(_, value)| value),
            Value::Record(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Follow a field path. An empty path is the value itself.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |value, name| value.get(name.as_ref()))
    }

    /// Template truthiness: false, zero, empty and NULL are false.
    ///
    /// Records (plain structs) are false as well; only a present optional
    /// around one is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Unbindable(_) | Value::Record(_) => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::UInt(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Optional(_) => true,
        }
    }

    /// The raw value to bind as a query argument.
    pub fn to_arg(&self) -> SqlTmplResult<Value> {
        match self.peel() {
            Value::Unbindable(message) => Err(SqlTmplError::Conversion(message.clone())),
            value => Ok(value.clone()),
        }
    }

    /// Index/key and element pairs of a list or map; `None` for anything else.
    pub fn pairs(&self) -> Option<Vec<(Cow<'_, Value>, Cow<'_, Value>)>> {
        let pairs = match self.peel() {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Cow::Owned(Value::Int(i as i64)), Cow::Borrowed(item)))
                .collect(),
            Value::Bytes(bytes) => bytes
                .iter()
                .enumerate()
                .map(|(i, b)| {
                    (
                        Cow::Owned(Value::Int(i as i64)),
                        Cow::Owned(Value::Int(i64::from(*b))),
                    )
                })
                .collect(),
            Value::Map(entries) => entries
                .iter()
                .map(|(key, value)| (Cow::Borrowed(key), Cow::Borrowed(value)))
                .collect(),
            _ => return None,
        };
        Some(pairs)
    }
}

/// Extract a bindable argument from a possibly unresolved value.
pub(crate) fn extract(
    value: Option<&Value>,
    missing: MissingValue,
    source: &dyn fmt::Display,
) -> SqlTmplResult<Value> {
    match (value, missing) {
        (Some(value), _) => value.to_arg(),
        (None, MissingValue::Null) => Ok(Value::Null),
        (None, MissingValue::Error) => Err(SqlTmplError::MissingValue(source.to_string())),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::UInt(n) => serializer.serialize_u64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Optional(inner) => serializer.serialize_some(inner.as_ref()),
            Value::Unbindable(message) => Err(S::Error::custom(message)),
        }
    }
}

impl From<NumberValue> for Value {
    fn from(n: NumberValue) -> Self {
        match n {
            NumberValue::Int(n) => Value::Int(n),
            NumberValue::UInt(n) => Value::UInt(n),
            NumberValue::Float(n) => Value::Float(n),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                // Same policy as the serializer: `Int` unless it only fits a `u64`.
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_int {
    ($variant:ident: $target:ty => $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::$variant(<$target>::from(n))
                }
            }
        )*
    };
}

from_int!(Int: i64 => i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Value::UInt(n), Value::Int)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
