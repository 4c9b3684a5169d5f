//! Static compilation.
//!
//! A template without `if`/`range`/`with` compiles once into finished query
//! text plus the list of field paths to bind, in placeholder order. Rendering
//! only resolves those paths against each new parameter value, and only the
//! parts of the parameter object on those paths are converted.

use serde::Serialize;
use tracing::debug;

use crate::ast::{Expr, Node};
use crate::config::Options;
use crate::diagnostics::{action_operand, unsupported_node};
use crate::error::{SqlTmplError, SqlTmplResult};
use crate::template::RenderSql;
use crate::value::{extract, PathTree, Value, ValueSerializer};
use crate::PLACEHOLDER;

/// An immutable, precompiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticTemplate {
    query: String,
    /// One path per placeholder; empty means the whole parameter value.
    arg_paths: Vec<Vec<String>>,
    paths: PathTree,
}

impl StaticTemplate {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn arg_paths(&self) -> &[Vec<String>] {
        &self.arg_paths
    }

    /// Convert the parts of `params` this template binds.
    pub fn convert<P: Serialize + ?Sized>(&self, params: &P) -> SqlTmplResult<Value> {
        params.serialize(ValueSerializer::for_paths(&self.paths))
    }
}

impl RenderSql for StaticTemplate {
    fn render_sql(&self, params: &Value, options: &Options) -> SqlTmplResult<(String, Vec<Value>)> {
        let args = self
            .arg_paths
            .iter()
            .map(|path| extract(params.lookup(path), options.missing_value, &describe(path)))
            .collect::<SqlTmplResult<Vec<_>>>()?;
        Ok((self.query.clone(), args))
    }
}

/// Field path in template syntax, for diagnostics.
fn describe(path: &[String]) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    path.iter().map(|ident| format!(".{}", ident)).collect()
}

/// Builds a [`StaticTemplate`] from a flat node list.
#[derive(Debug, Default)]
pub struct StaticCompiler {
    buf: String,
    arg_paths: Vec<Vec<String>>,
}

impl StaticCompiler {
    pub fn compile(mut self, nodes: &[Node]) -> SqlTmplResult<StaticTemplate> {
        for node in nodes {
            match node {
                Node::Text(text) => self.buf.push_str(text),
                Node::Action(pipeline) => self.compile_action(action_operand(pipeline)?)?,
                Node::Comment(_) => {}
                other => return Err(unsupported_node(other.kind())),
            }
        }

        debug!(
            placeholders = self.arg_paths.len(),
            "compiled static template"
        );
        let paths = self.arg_paths.iter().cloned().collect();
        Ok(StaticTemplate {
            query: self.buf,
            arg_paths: self.arg_paths,
            paths,
        })
    }

    fn compile_action(&mut self, operand: &Expr) -> SqlTmplResult<()> {
        if let Some(text) = operand.literal_text() {
            self.buf.push_str(text);
            return Ok(());
        }
        let path = match operand {
            Expr::Dot => Vec::new(),
            Expr::Field(path) => path.clone(),
            // `$` is the parameter value itself.
            Expr::Variable { name, path } if name == "$" => path.clone(),
            Expr::Variable { .. } => {
                return Err(SqlTmplError::Unsupported(
                    "variable reference outside range or with",
                ));
            }
            _ => return Err(SqlTmplError::FunctionCall),
        };
        self.buf.push_str(PLACEHOLDER);
        self.arg_paths.push(path);
        Ok(())
    }
}
