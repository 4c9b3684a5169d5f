//! Syntax tree produced by the template parser.
//!
//! The shape follows Go's `text/template/parse`: a template is a list of
//! nodes, control nodes own nested lists, and every value-producing position
//! holds a [`Pipeline`].

use std::fmt;

/// A node in a template list.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, copied verbatim.
    Text(String),
    /// `{{ pipeline }}`
    Action(Pipeline),
    /// `{{if pipeline}} list {{else}} list {{end}}`
    If(Branch),
    /// `{{range pipeline}} list {{else}} list {{end}}`
    Range(Branch),
    /// `{{with pipeline}} list {{else}} list {{end}}`
    With(Branch),
    /// `{{/* text */}}`
    Comment(String),
    Break,
    Continue,
    /// `{{template "name" pipeline}}`
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text(_) => NodeKind::Text,
            Node::Action(_) => NodeKind::Action,
            Node::If(_) => NodeKind::If,
            Node::Range(_) => NodeKind::Range,
            Node::With(_) => NodeKind::With,
            Node::Comment(_) => NodeKind::Comment,
            Node::Break => NodeKind::Break,
            Node::Continue => NodeKind::Continue,
            Node::Template { .. } => NodeKind::Template,
        }
    }
}

/// Shared body of `if`, `range` and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipeline: Pipeline,
    pub list: Vec<Node>,
    /// Empty when there is no `{{else}}`.
    pub else_list: Vec<Node>,
}

/// Kind tag used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    Action,
    If,
    Range,
    With,
    Comment,
    Break,
    Continue,
    Template,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Text => "text",
            NodeKind::Action => "action",
            NodeKind::If => "if",
            NodeKind::Range => "range",
            NodeKind::With => "with",
            NodeKind::Comment => "comment",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Template => "template",
        };
        f.write_str(name)
    }
}

/// `$x := cmd | cmd`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    /// Declared variable names, including the leading `$`.
    pub decl: Vec<String>,
    /// `=` instead of `:=`.
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

/// One pipeline stage: an operand optionally followed by arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Expr>,
}

/// An operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Number(Number),
    /// Unquoted string contents.
    String(String),
    Nil,
    /// `.`
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`; `name` includes the `$`.
    Variable { name: String, path: Vec<String> },
    /// A function name.
    Identifier(String),
    /// `( pipeline )`
    Pipeline(Box<Pipeline>),
}

impl Expr {
    /// Literals are rendered into the query text rather than bound.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Bool(_) | Expr::Number(_) | Expr::String(_) | Expr::Nil
        )
    }

    /// Text form of a literal as it appears in rendered SQL.
    pub fn literal_text(&self) -> Option<&str> {
        match self {
            Expr::Bool(true) => Some("true"),
            Expr::Bool(false) => Some("false"),
            Expr::Number(n) => Some(&n.text),
            Expr::String(s) => Some(s),
            Expr::Nil => Some("NULL"),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Number(n) => f.write_str(&n.text),
            Expr::String(s) => write!(f, "{:?}", s),
            Expr::Nil => f.write_str("nil"),
            Expr::Dot => f.write_str("."),
            Expr::Field(path) => {
                for ident in path {
                    write!(f, ".{}", ident)?;
                }
                Ok(())
            }
            Expr::Variable { name, path } => {
                f.write_str(name)?;
                for ident in path {
                    write!(f, ".{}", ident)?;
                }
                Ok(())
            }
            Expr::Identifier(name) => f.write_str(name),
            Expr::Pipeline(_) => f.write_str("(pipeline)"),
        }
    }
}

/// A numeric constant: source text plus evaluated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub text: String,
    pub value: NumberValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}
