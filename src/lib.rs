//! # sqltmpl — SQL from text templates
//!
//! > **Write the query. Bind the values.**
//!
//! `sqltmpl` compiles `{{ … }}` templates into parameterized SQL: query text
//! with `?` placeholders plus the ordered argument list pulled from any
//! `serde::Serialize` parameter value. Values never end up in the query text;
//! only literals written in the template do.
//!
//! ## Quick Example
//!
//! ```
//! use serde::Serialize;
//! use sqltmpl::{Template, Value};
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct Params {
//!     ids: Vec<i64>,
//!     r#type: String,
//! }
//!
//! let tmpl = Template::<Params>::parse(
//!     "SELECT a FROM t WHERE id IN ({{- range $i, $e := .Ids -}}\
//!      {{if $i}}, {{end}}{{$e}}{{- end -}}) AND type = {{.Type}}",
//! )?;
//! let (query, args) = tmpl.render(&Params {
//!     ids: vec![1, 2, 3],
//!     r#type: "foobar".into(),
//! })?;
//!
//! assert_eq!(query, "SELECT a FROM t WHERE id IN (?, ?, ?) AND type = ?");
//! assert_eq!(
//!     args,
//!     vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::from("foobar")]
//! );
//! # Ok::<(), sqltmpl::SqlTmplError>(())
//! ```
//!
//! ## Syntax
//!
//! | Construct                      | Result                                   |
//! |--------------------------------|------------------------------------------|
//! | `{{.A.B}}`, `{{.}}`, `{{$x}}`  | `?` placeholder, value appended to args  |
//! | `{{1}}`, `{{"x"}}`, `{{true}}` | Literal text, inlined                    |
//! | `{{nil}}`                      | `NULL`, inlined                          |
//! | `{{if}}` / `{{else}}`          | Branch on truthiness                     |
//! | `{{range $i, $e := .L}}`       | Loop over a list or map                  |
//! | `{{with .A}}`                  | Rebind `.` when truthy                   |
//! | `{{/* … */}}`                  | Comment                                  |
//!
//! Templates without `if`/`range`/`with` are compiled once; the rest are
//! walked on every render. Pipelines (`|`) and function calls are rejected.

pub mod ast;
pub mod compile;
pub mod config;
mod diagnostics;
pub mod error;
pub mod parser;
pub mod render;
pub mod template;
pub mod value;

pub use config::{MissingValue, Options};
pub use error::{SqlTmplError, SqlTmplResult};
pub use template::{RenderSql, Template};
pub use value::{serialize_valuer, to_value, Bind, BoxError, Value, Valuer};

/// The token emitted for every bound argument.
pub const PLACEHOLDER: &str = "?";

pub mod prelude {
    pub use crate::config::{MissingValue, Options};
    pub use crate::error::*;
    pub use crate::template::{RenderSql, Template};
    pub use crate::value::{Bind, Value, Valuer};
}

/// Parse and compile a template with default options.
///
/// # Example
///
/// ```
/// let tmpl = sqltmpl::parse::<serde_json::Value>("SELECT * FROM users WHERE id = {{.Id}}").unwrap();
/// let (query, args) = tmpl.render(&serde_json::json!({"Id": 7})).unwrap();
/// assert_eq!(query, "SELECT * FROM users WHERE id = ?");
/// assert_eq!(args, vec![sqltmpl::Value::Int(7)]);
/// ```
pub fn parse<P: ?Sized>(source: &str) -> SqlTmplResult<Template<P>> {
    Template::parse(source)
}
