//! Self-conversion of parameter values into bindable SQL values.

use serde::{Serialize, Serializer};

use super::Value;

/// Error type returned by [`Valuer::sql_value`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Newtype-struct name that marks a failed conversion for [`super::ValueSerializer`].
pub(crate) const UNBINDABLE_TOKEN: &str = "$sqltmpl::private::Unbindable";

/// A type that knows its own SQL representation.
///
/// Implementors are routed through [`Bind`] or [`serialize_valuer`]. A failed
/// conversion does not fail serialization; the error is kept and reported
/// only if the value is actually bound as an argument.
///
/// ```
/// use sqltmpl::{Bind, BoxError, Template, Value, Valuer};
///
/// struct Cents(i64);
///
/// impl Valuer for Cents {
///     fn sql_value(&self) -> Result<Value, BoxError> {
///         Ok(Value::Float(self.0 as f64 / 100.0))
///     }
/// }
///
/// let tmpl = Template::<Bind<Cents>>::parse("SELECT {{.}}").unwrap();
/// let (_, args) = tmpl.render(&Bind(Cents(250))).unwrap();
/// assert_eq!(args, vec![Value::Float(2.5)]);
/// ```
pub trait Valuer {
    fn sql_value(&self) -> Result<Value, BoxError>;
}

/// Serialize a [`Valuer`] through its SQL representation.
///
/// Meant for `#[serde(serialize_with = "sqltmpl::serialize_valuer")]`.
pub fn serialize_valuer<V, S>(valuer: &V, serializer: S) -> Result<S::Ok, S::Error>
where
    V: Valuer + ?Sized,
    S: Serializer,
{
    match valuer.sql_value() {
        Ok(value) => value.serialize(serializer),
        Err(err) => serializer.serialize_newtype_struct(UNBINDABLE_TOKEN, &err.to_string()),
    }
}

/// Wrapper that serializes `T` through its [`Valuer`] impl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bind<T>(pub T);

impl<T: Valuer> Serialize for Bind<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_valuer(&self.0, serializer)
    }
}
