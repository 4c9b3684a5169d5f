//! Dynamic rendering.
//!
//! Templates with `if`, `range` or `with` keep their parse tree and are
//! walked on every render. Each walk owns its output buffer and argument list;
//! variable scopes are shallow maps of borrowed or computed values.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::trace;

use crate::ast::{Branch, Expr, Node};
use crate::config::Options;
use crate::diagnostics::{action_operand, control_operand, unsupported_node};
use crate::error::{SqlTmplError, SqlTmplResult};
use crate::template::RenderSql;
use crate::value::{extract, Value};
use crate::PLACEHOLDER;

const DOT: &str = ".";
const ROOT: &str = "$";

/// Variables in scope, keyed by name (`.`, `$`, `$x`).
type Env<'a> = HashMap<&'a str, Cow<'a, Value>>;

/// A parse tree rendered per call.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTemplate {
    root: Vec<Node>,
}

impl DynamicTemplate {
    pub fn new(root: Vec<Node>) -> Self {
        Self { root }
    }
}

impl RenderSql for DynamicTemplate {
    fn render_sql(&self, params: &Value, options: &Options) -> SqlTmplResult<(String, Vec<Value>)> {
        let mut env = Env::new();
        env.insert(DOT, Cow::Borrowed(params));
        env.insert(ROOT, Cow::Borrowed(params));

        let mut renderer = Renderer {
            buf: String::new(),
            args: Vec::new(),
            options,
        };
        renderer.render_list(&self.root, &env)?;
        trace!(args = renderer.args.len(), "rendered dynamic template");
        Ok((renderer.buf, renderer.args))
    }
}

struct Renderer<'o> {
    buf: String,
    args: Vec<Value>,
    options: &'o Options,
}

impl Renderer<'_> {
    fn render_list<'a>(&mut self, nodes: &'a [Node], env: &Env<'a>) -> SqlTmplResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => self.buf.push_str(text),
                Node::Action(pipeline) => self.render_action(action_operand(pipeline)?, env)?,
                Node::If(branch) => self.render_if(branch, env)?,
                Node::Range(branch) => self.render_range(branch, env)?,
                Node::With(branch) => self.render_with(branch, env)?,
                Node::Comment(_) => {}
                Node::Break | Node::Continue | Node::Template { .. } => {
                    return Err(unsupported_node(node.kind()));
                }
            }
        }
        Ok(())
    }

    fn render_action<'a>(&mut self, operand: &'a Expr, env: &Env<'a>) -> SqlTmplResult<()> {
        if let Some(text) = operand.literal_text() {
            self.buf.push_str(text);
            return Ok(());
        }
        let value = eval(operand, env)?;
        let arg = extract(value.as_deref(), self.options.missing_value, operand)?;
        self.buf.push_str(PLACEHOLDER);
        self.args.push(arg);
        Ok(())
    }

    fn render_if<'a>(&mut self, branch: &'a Branch, env: &Env<'a>) -> SqlTmplResult<()> {
        let value = eval(control_operand(&branch.pipeline)?, env)?;
        if !is_truthy(value.as_deref()) {
            return self.render_list(&branch.else_list, env);
        }
        match (branch.pipeline.decl.first(), value) {
            (Some(name), Some(value)) => {
                let mut scope = env.clone();
                scope.insert(name.as_str(), value);
                self.render_list(&branch.list, &scope)
            }
            _ => self.render_list(&branch.list, env),
        }
    }

    fn render_range<'a>(&mut self, branch: &'a Branch, env: &Env<'a>) -> SqlTmplResult<()> {
        let value = eval(control_operand(&branch.pipeline)?, env)?;
        let pairs = value.map(collection_pairs).transpose()?;
        let Some(pairs) = pairs else {
            return Err(SqlTmplError::InvalidRangeValue);
        };
        if pairs.is_empty() {
            return self.render_list(&branch.else_list, env);
        }

        let (key_name, elem_name) = match branch.pipeline.decl.as_slice() {
            [] => (None, DOT),
            [elem] => (None, elem.as_str()),
            [key, elem, ..] => (Some(key.as_str()), elem.as_str()),
        };
        for (key, elem) in pairs {
            let mut scope = env.clone();
            if let Some(key_name) = key_name {
                scope.insert(key_name, key);
            }
            scope.insert(elem_name, elem);
            self.render_list(&branch.list, &scope)?;
        }
        Ok(())
    }

    fn render_with<'a>(&mut self, branch: &'a Branch, env: &Env<'a>) -> SqlTmplResult<()> {
        let value = eval(control_operand(&branch.pipeline)?, env)?;
        let value = match value {
            Some(value) if value.is_truthy() => value,
            _ => return self.render_list(&branch.else_list, env),
        };
        let name = branch
            .pipeline
            .decl
            .first()
            .map_or(DOT, String::as_str);
        let mut scope = env.clone();
        scope.insert(name, value);
        self.render_list(&branch.list, &scope)
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_truthy)
}

/// Evaluate a single operand. `None` means the reference did not resolve.
fn eval<'a>(expr: &'a Expr, env: &Env<'a>) -> SqlTmplResult<Option<Cow<'a, Value>>> {
    let value = match expr {
        Expr::Bool(b) => Some(Cow::Owned(Value::Bool(*b))),
        Expr::Number(number) => Some(Cow::Owned(Value::from(number.value))),
        Expr::String(s) => Some(Cow::Owned(Value::String(s.clone()))),
        Expr::Nil => Some(Cow::Owned(Value::Null)),
        Expr::Dot => env.get(DOT).and_then(|dot| lookup(dot, &[])),
        Expr::Field(path) => env.get(DOT).and_then(|dot| lookup(dot, path)),
        Expr::Variable { name, path } => env.get(name.as_str()).and_then(|var| lookup(var, path)),
        Expr::Identifier(_) => return Err(SqlTmplError::FunctionCall),
        Expr::Pipeline(_) => return Err(SqlTmplError::Unsupported("parenthesized pipeline")),
    };
    Ok(value)
}

/// Resolve a path below a scope value, borrowing from the parameters when possible.
fn lookup<'a>(base: &Cow<'a, Value>, path: &[String]) -> Option<Cow<'a, Value>> {
    match *base {
        Cow::Borrowed(value) => value.lookup(path).map(Cow::Borrowed),
        Cow::Owned(ref value) => value.lookup(path).cloned().map(Cow::Owned),
    }
}

type Pairs<'a> = Vec<(Cow<'a, Value>, Cow<'a, Value>)>;

fn collection_pairs(value: Cow<'_, Value>) -> SqlTmplResult<Pairs<'_>> {
    let pairs = match value {
        Cow::Borrowed(value) => value.pairs(),
        Cow::Owned(value) => value.pairs().map(|pairs| {
            pairs
                .into_iter()
                .map(|(key, elem)| (Cow::Owned(key.into_owned()), Cow::Owned(elem.into_owned())))
                .collect()
        }),
    };
    pairs.ok_or(SqlTmplError::InvalidRangeValue)
}
