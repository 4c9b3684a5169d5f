//! Error types for sqltmpl.

use std::fmt::Display;

use thiserror::Error;

use crate::ast::NodeKind;

/// The main error type for template building and rendering.
#[derive(Debug, Error)]
pub enum SqlTmplError {
    /// No template lines were given.
    #[error("template is empty")]
    EmptyTemplate,

    /// Failed to parse the template source.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// More than one command in a pipeline (`{{ .A | f }}`).
    #[error("chained pipeline is unsupported")]
    ChainedPipeline,

    /// A command with arguments, or a bare function name.
    #[error("function or method calling is unsupported")]
    FunctionCall,

    /// A node kind the compiler does not handle at this position.
    #[error("unsupported node type: {0}")]
    UnsupportedNode(NodeKind),

    /// Any other construct that parses but cannot be compiled to SQL.
    #[error("unsupported construct: {0}")]
    Unsupported(&'static str),

    /// `range` over something that is not a list or map.
    #[error("range value should be array, slice or map")]
    InvalidRangeValue,

    /// A referenced value did not resolve and the template forbids NULL fallback.
    #[error("no value for {0}")]
    MissingValue(String),

    /// The parameter object (or one of its values) could not be converted.
    #[error("value conversion failed: {0}")]
    Conversion(String),

    /// Invalid options document.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SqlTmplError {
    /// Create a parse error at the given byte offset.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

impl serde::ser::Error for SqlTmplError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Conversion(msg.to_string())
    }
}

/// Result type alias for sqltmpl operations.
pub type SqlTmplResult<T> = Result<T, SqlTmplError>;
