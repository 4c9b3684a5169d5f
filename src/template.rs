//! The public template type.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use tracing::{debug, trace};

use crate::ast::Node;
use crate::compile::{StaticCompiler, StaticTemplate};
use crate::config::Options;
use crate::error::{SqlTmplError, SqlTmplResult};
use crate::parser;
use crate::render::DynamicTemplate;
use crate::value::{to_value, Value};

/// Produces query text and arguments for one parameter value.
///
/// Implemented by both the precompiled static form and the per-call dynamic
/// walker, so [`Template`] does not care which one it holds.
pub trait RenderSql {
    fn render_sql(&self, params: &Value, options: &Options) -> SqlTmplResult<(String, Vec<Value>)>;
}

#[derive(Debug, Clone, PartialEq)]
enum Compiled {
    Static(StaticTemplate),
    Dynamic(DynamicTemplate),
}

impl Compiled {
    fn as_renderer(&self) -> &dyn RenderSql {
        match self {
            Compiled::Static(tmpl) => tmpl,
            Compiled::Dynamic(tmpl) => tmpl,
        }
    }
}

/// A compiled SQL template for parameters of type `P`.
///
/// Templates are immutable once built and can be shared across threads.
pub struct Template<P: ?Sized> {
    compiled: Compiled,
    options: Options,
    params: PhantomData<fn(&P)>,
}

impl<P: ?Sized> Template<P> {
    /// Parse and compile a template with default options.
    pub fn parse(source: &str) -> SqlTmplResult<Self> {
        Self::parse_with(source, Options::default())
    }

    /// Parse a template given as lines, joined with `\n`.
    pub fn parse_lines<I, S>(lines: I) -> SqlTmplResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse_lines_with(lines, Options::default())
    }

    pub fn parse_lines_with<I, S>(lines: I, options: Options) -> SqlTmplResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<S> = lines.into_iter().collect();
        if lines.is_empty() {
            return Err(SqlTmplError::EmptyTemplate);
        }
        let source = lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join("\n");
        Self::parse_with(&source, options)
    }

    pub fn parse_with(source: &str, options: Options) -> SqlTmplResult<Self> {
        let nodes = parser::parse(source)?;
        let compiled = if has_dynamic_node(&nodes) {
            debug!(nodes = nodes.len(), "built dynamic template");
            Compiled::Dynamic(DynamicTemplate::new(nodes))
        } else {
            Compiled::Static(StaticCompiler::default().compile(&nodes)?)
        };
        Ok(Self {
            compiled,
            options,
            params: PhantomData,
        })
    }

    /// Like [`Template::parse`], but panics on error.
    pub fn must_parse(source: &str) -> Self {
        must(Self::parse(source))
    }

    /// Like [`Template::parse_lines`], but panics on error.
    pub fn must_parse_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        must(Self::parse_lines(lines))
    }

    /// Whether the template was compiled once up front.
    pub fn is_static(&self) -> bool {
        matches!(self.compiled, Compiled::Static(_))
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl<P: Serialize + ?Sized> Template<P> {
    /// Render the query text and its ordered arguments.
    pub fn render(&self, params: &P) -> SqlTmplResult<(String, Vec<Value>)> {
        let value = match &self.compiled {
            Compiled::Static(tmpl) => tmpl.convert(params)?,
            Compiled::Dynamic(_) => to_value(params)?,
        };
        let (query, args) = self.compiled.as_renderer().render_sql(&value, &self.options)?;
        trace!(args = args.len(), static_path = self.is_static(), "rendered template");
        Ok((query, args))
    }

    /// Like [`Template::render`], but panics on error.
    pub fn must_render(&self, params: &P) -> (String, Vec<Value>) {
        match self.render(params) {
            Ok(rendered) => rendered,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<P: ?Sized> Clone for Template<P> {
    fn clone(&self) -> Self {
        Self {
            compiled: self.compiled.clone(),
            options: self.options.clone(),
            params: PhantomData,
        }
    }
}

impl<P: ?Sized> fmt::Debug for Template<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("compiled", &self.compiled)
            .field("options", &self.options)
            .finish()
    }
}

fn must<T>(parsed: SqlTmplResult<T>) -> T {
    match parsed {
        Ok(tmpl) => tmpl,
        Err(err) => panic!("Parse SQL template failed!\nError: {}", err),
    }
}

/// `if`, `range` or `with` among the direct children forces per-call rendering.
fn has_dynamic_node(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .any(|node| matches!(node, Node::If(_) | Node::Range(_) | Node::With(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifier() {
        assert!(!has_dynamic_node(&parser::parse("a {{.B}} {{/* c */}}").unwrap()));
        assert!(has_dynamic_node(&parser::parse("a {{if .B}}b{{end}}").unwrap()));
        assert!(has_dynamic_node(&parser::parse("{{with .B}}{{end}}").unwrap()));
    }

    #[test]
    fn test_static_matches_dynamic() {
        let sources = [
            "SELECT * FROM t WHERE a = {{.A}} AND b IN ({{.B.C}}, {{$.A}})",
            "SELECT {{1}}, {{nil}}, {{\"s\"}} FROM t WHERE x = {{.}}",
            "{{- /* only */ -}} SELECT 1",
        ];
        let params = Value::from(json!({"A": 1, "B": {"C": "c"}}));
        let options = Options::default();
        for source in sources {
            let nodes = parser::parse(source).unwrap();
            let fixed = StaticCompiler::default().compile(&nodes).unwrap();
            let walked = DynamicTemplate::new(nodes);
            assert_eq!(
                fixed.render_sql(&params, &options).unwrap(),
                walked.render_sql(&params, &options).unwrap(),
                "{}",
                source
            );
        }
    }

    #[test]
    fn test_parse_lines() {
        let tmpl = Template::<serde_json::Value>::parse_lines(["SELECT *", "FROM t WHERE id = {{.Id}}"]).unwrap();
        let (query, args) = tmpl.render(&json!({"Id": 3})).unwrap();
        assert_eq!(query, "SELECT *\nFROM t WHERE id = ?");
        assert_eq!(args, vec![Value::Int(3)]);
    }

    #[test]
    fn test_parse_lines_with_options() {
        let options = Options::default().missing_value(crate::config::MissingValue::Error);
        let tmpl = Template::<serde_json::Value>::parse_lines_with(["SELECT *", "WHERE id = {{.Id}}"], options).unwrap();
        assert!(matches!(
            tmpl.render(&json!({})),
            Err(SqlTmplError::MissingValue(path)) if path == ".Id"
        ));
    }

    #[test]
    fn test_must_parse_lines() {
        let tmpl = Template::<serde_json::Value>::must_parse_lines(["SELECT {{.A}}", "FROM t"]);
        assert_eq!(tmpl.must_render(&json!({"A": -1})).0, "SELECT ?\nFROM t");
    }

    #[test]
    #[should_panic(expected = "Parse SQL template failed!\nError: template is empty")]
    fn test_must_parse_lines_empty() {
        Template::<()>::must_parse_lines(Vec::<&str>::new());
    }

    #[test]
    fn test_parse_lines_empty() {
        let err = Template::<()>::parse_lines(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, SqlTmplError::EmptyTemplate));
    }

    #[test]
    fn test_is_static() {
        assert!(Template::<()>::parse("SELECT 1").unwrap().is_static());
        assert!(!Template::<()>::parse("{{if .}}1{{end}}").unwrap().is_static());
    }

    #[test]
    fn test_static_rejected_at_build() {
        let err = Template::<()>::parse("{{.A | len}}").unwrap_err();
        assert!(matches!(err, SqlTmplError::ChainedPipeline));
    }

    #[test]
    #[should_panic(expected = "Parse SQL template failed!")]
    fn test_must_parse_panics() {
        Template::<()>::must_parse("{{if .A}}");
    }

    #[test]
    #[should_panic(expected = "range value should be array, slice or map")]
    fn test_must_render_panics() {
        let tmpl = Template::<serde_json::Value>::must_parse("{{range .A}}{{.}}{{end}}");
        tmpl.must_render(&json!({"A": 1}));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template<std::rc::Rc<i32>>>();
        assert_send_sync::<Template<str>>();
    }
}
