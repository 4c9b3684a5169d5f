//! Template options.
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! missing_value = "error"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{SqlTmplError, SqlTmplResult};

/// What to bind when a referenced value does not resolve
/// (missing map key, unknown field, path through a non-record).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValue {
    /// Bind SQL NULL.
    #[default]
    Null,
    /// Fail the render with [`SqlTmplError::MissingValue`].
    Error,
}

/// Per-template options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub missing_value: MissingValue,
}

impl Options {
    /// Parse options from a TOML document. Absent keys keep their defaults.
    pub fn from_toml(text: &str) -> SqlTmplResult<Self> {
        toml::from_str(text).map_err(|e| SqlTmplError::Config(e.to_string()))
    }

    pub fn missing_value(mut self, policy: MissingValue) -> Self {
        self.missing_value = policy;
        self
    }
}
