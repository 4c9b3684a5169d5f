//! Template parser.
//!
//! Splits the source into literal text and `{{ … }}` actions, parses each
//! action with the nom grammar in [`action`], then assembles the node tree,
//! checking variable scopes and control-structure nesting the way Go's
//! `text/template/parse` does.
//!
//! ```text
//! SELECT * FROM t WHERE id IN ({{- range $i, $e := .Ids -}} … {{- end -}})
//! ───────┬──────────────────── ──┬──────────────────────── ─┬─ ──┬───────
//!        │                       │                          │    └── End
//!        │                       │                          └── body list
//!        │                       └── Range, with left/right trim markers
//!        └── Text
//! ```

mod action;

#[cfg(test)]
mod tests;

use crate::ast::{Branch, Expr, Node, Pipeline};
use crate::error::{SqlTmplError, SqlTmplResult};

use action::{Action, ControlKind};

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

/// Go's builtin template functions. They parse, and are later rejected as
/// function calls; any other identifier is a parse error.
const BUILTIN_FUNCS: &[&str] = &[
    "and", "call", "html", "index", "slice", "js", "len", "not", "or", "print", "printf",
    "println", "urlquery", "eq", "ge", "gt", "le", "lt", "ne",
];

/// Parse a complete template source into its root node list.
pub fn parse(source: &str) -> SqlTmplResult<Vec<Node>> {
    let items = scan(source)?;
    let mut builder = TreeBuilder {
        items: items.into_iter(),
        vars: vec!["$".to_string()],
        range_depth: 0,
    };

    let (nodes, stop) = builder.parse_list()?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::End(pos) => Err(SqlTmplError::parse(pos, "unexpected {{end}}")),
        Stop::Else(pos, _) => Err(SqlTmplError::parse(pos, "unexpected {{else}}")),
    }
}

// ============================================================================
// Scanner
// ============================================================================

#[derive(Debug)]
enum Item<'a> {
    Text(&'a str),
    Comment(&'a str),
    /// `pos` is the byte offset of `body` in the source.
    Action { pos: usize, body: &'a str },
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// `{{- ` : a dash followed by whitespace.
fn has_left_trim(after_delim: &str) -> bool {
    let mut chars = after_delim.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// Split the source into text, comments and raw action bodies, applying
/// trim markers to the text between them.
fn scan(source: &str) -> SqlTmplResult<Vec<Item<'_>>> {
    let mut items = Vec::new();
    let mut cursor = 0;
    let mut trim_next = false;

    loop {
        let rest = &source[cursor..];
        let open = rest.find(LEFT_DELIM).map(|i| cursor + i);
        let mut text = &source[cursor..open.unwrap_or(source.len())];
        if trim_next {
            text = text.trim_start_matches(is_space);
        }

        let Some(open) = open else {
            if !text.is_empty() {
                items.push(Item::Text(text));
            }
            return Ok(items);
        };

        // The trim marker is the dash plus exactly one whitespace byte.
        let mut body_start = open + LEFT_DELIM.len();
        if has_left_trim(&source[body_start..]) {
            text = text.trim_end_matches(is_space);
            body_start += 2;
        }
        if !text.is_empty() {
            items.push(Item::Text(text));
        }

        if source[body_start..].starts_with(LEFT_COMMENT) {
            let (comment, close_end, trim_right) = scan_comment(source, open, body_start)?;
            items.push(Item::Comment(comment));
            cursor = close_end;
            trim_next = trim_right;
            continue;
        }

        let (body_end, close_end, trim_right) = scan_action(source, open, body_start)?;
        items.push(Item::Action {
            pos: body_start,
            body: &source[body_start..body_end],
        });
        cursor = close_end;
        trim_next = trim_right;
    }
}

/// Returns the comment text, the offset after the closing delimiter and
/// whether a right trim marker was present.
fn scan_comment(source: &str, open: usize, start: usize) -> SqlTmplResult<(&str, usize, bool)> {
    let inner_start = start + LEFT_COMMENT.len();
    let Some(len) = source[inner_start..].find(RIGHT_COMMENT) else {
        return Err(SqlTmplError::parse(open, "unclosed comment"));
    };
    let comment = &source[inner_start..inner_start + len];
    let after = inner_start + len + RIGHT_COMMENT.len();
    let tail = &source[after..];

    if tail.starts_with(RIGHT_DELIM) {
        Ok((comment, after + RIGHT_DELIM.len(), false))
    } else if tail.starts_with(is_space) && tail[1..].starts_with("-}}") {
        Ok((comment, after + 1 + "-}}".len(), true))
    } else {
        Err(SqlTmplError::parse(after, "comment ends before closing delimiter"))
    }
}

/// Find the closing delimiter of an action, skipping quoted literals.
///
/// Returns the end of the body, the offset after the delimiter, and whether a
/// right trim marker was present.
fn scan_action(source: &str, open: usize, body_start: usize) -> SqlTmplResult<(usize, usize, bool)> {
    let bytes = source.as_bytes();
    let mut i = body_start;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                loop {
                    match bytes.get(i) {
                        None | Some(b'\n') => {
                            return Err(SqlTmplError::parse(i, "unterminated quoted string"));
                        }
                        Some(b'\\') => i += 2,
                        Some(&b) if b == quote => break,
                        Some(_) => i += 1,
                    }
                }
            }
            b'`' => match source[i + 1..].find('`') {
                Some(len) => i += len + 1,
                None => return Err(SqlTmplError::parse(i, "unterminated raw quoted string")),
            },
            b'}' if source[i..].starts_with(RIGHT_DELIM) => {
                let trim_right = i >= body_start + 2
                    && bytes[i - 1] == b'-'
                    && is_space(bytes[i - 2] as char);
                let body_end = if trim_right { i - 1 } else { i };
                return Ok((body_end, i + RIGHT_DELIM.len(), trim_right));
            }
            _ => {}
        }
        i += 1;
    }

    Err(SqlTmplError::parse(open, "unclosed action"))
}

// ============================================================================
// Tree builder
// ============================================================================

/// Why a list ended.
enum Stop {
    Eof,
    End(usize),
    Else(usize, Option<(ControlKind, Pipeline)>),
}

struct TreeBuilder<'a> {
    items: std::vec::IntoIter<Item<'a>>,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    range_depth: usize,
}

impl TreeBuilder<'_> {
    fn parse_list(&mut self) -> SqlTmplResult<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let (pos, body) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text.to_string()));
                    continue;
                }
                Item::Comment(text) => {
                    nodes.push(Node::Comment(text.to_string()));
                    continue;
                }
                Item::Action { pos, body } => (pos, body),
            };

            let action = action::parse_action(body)
                .map_err(|(offset, message)| SqlTmplError::parse(pos + offset, message))?;

            match action {
                Action::Pipeline(pipeline) => {
                    self.check_pipeline(&pipeline, pos, "command")?;
                    nodes.push(Node::Action(pipeline));
                }
                Action::Control(kind, pipeline) => {
                    nodes.push(self.parse_control(kind, pipeline, pos)?);
                }
                Action::Else(chained) => return Ok((nodes, Stop::Else(pos, chained))),
                Action::End => return Ok((nodes, Stop::End(pos))),
                Action::Break if self.range_depth == 0 => {
                    return Err(SqlTmplError::parse(pos, "{{break}} outside {{range}}"));
                }
                Action::Continue if self.range_depth == 0 => {
                    return Err(SqlTmplError::parse(pos, "{{continue}} outside {{range}}"));
                }
                Action::Break => nodes.push(Node::Break),
                Action::Continue => nodes.push(Node::Continue),
                Action::Template { name, pipeline } => {
                    if let Some(pipeline) = &pipeline {
                        self.check_pipeline(pipeline, pos, "template clause")?;
                    }
                    nodes.push(Node::Template { name, pipeline });
                }
                Action::Definition(word) => {
                    return Err(SqlTmplError::parse(
                        pos,
                        format!("{{{{{}}}}} is unsupported", word),
                    ));
                }
            }
        }

        Ok((nodes, Stop::Eof))
    }

    /// Parse the body of `if`/`range`/`with` up to its `{{end}}`.
    fn parse_control(
        &mut self,
        kind: ControlKind,
        pipeline: Pipeline,
        pos: usize,
    ) -> SqlTmplResult<Node> {
        let mark = self.vars.len();
        self.check_pipeline(&pipeline, pos, kind.name())?;

        if kind == ControlKind::Range {
            self.range_depth += 1;
        }
        let body = self.parse_list();
        if kind == ControlKind::Range {
            self.range_depth -= 1;
        }
        let (list, stop) = body?;

        let else_list = match stop {
            Stop::End(_) => Vec::new(),
            Stop::Eof => return Err(SqlTmplError::parse(pos, "unexpected EOF")),
            Stop::Else(_, None) => match self.parse_list()? {
                (list, Stop::End(_)) => list,
                (_, Stop::Eof) => return Err(SqlTmplError::parse(pos, "unexpected EOF")),
                (_, Stop::Else(else_pos, _)) => {
                    return Err(SqlTmplError::parse(else_pos, "expected end; found {{else}}"));
                }
            },
            // `{{else if}}` nests a new construct that shares our `{{end}}`.
            Stop::Else(else_pos, Some((chained, pipeline))) => {
                if chained != kind {
                    return Err(SqlTmplError::parse(
                        else_pos,
                        format!("unexpected {{{{else {}}}}} in {}", chained.name(), kind.name()),
                    ));
                }
                vec![self.parse_control(chained, pipeline, else_pos)?]
            }
        };

        self.vars.truncate(mark);

        let branch = Branch {
            pipeline,
            list,
            else_list,
        };
        Ok(match kind {
            ControlKind::If => Node::If(branch),
            ControlKind::Range => Node::Range(branch),
            ControlKind::With => Node::With(branch),
        })
    }

    /// Validate a pipeline and bring its declared variables into scope.
    fn check_pipeline(&mut self, pipeline: &Pipeline, pos: usize, context: &str) -> SqlTmplResult<()> {
        if pipeline.cmds.is_empty() {
            return Err(SqlTmplError::parse(pos, format!("missing value for {}", context)));
        }
        for (i, cmd) in pipeline.cmds.iter().enumerate() {
            if i > 0 && matches!(cmd.args.first(), Some(e) if e.is_literal() || *e == Expr::Dot) {
                return Err(SqlTmplError::parse(
                    pos,
                    format!("non executable command in pipeline stage {}", i + 1),
                ));
            }
            for arg in &cmd.args {
                self.check_expr(arg, pos)?;
            }
        }

        let max_decl = if context == "range" { 2 } else { 1 };
        if pipeline.decl.len() > max_decl {
            return Err(SqlTmplError::parse(pos, format!("too many declarations in {}", context)));
        }
        for name in &pipeline.decl {
            if pipeline.is_assign {
                if !self.vars.contains(name) {
                    return Err(SqlTmplError::parse(pos, format!("undefined variable {:?}", name)));
                }
            } else {
                self.vars.push(name.clone());
            }
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &Expr, pos: usize) -> SqlTmplResult<()> {
        match expr {
            Expr::Variable { name, .. } if !self.vars.contains(name) => {
                Err(SqlTmplError::parse(pos, format!("undefined variable {:?}", name)))
            }
            Expr::Identifier(name) if !BUILTIN_FUNCS.contains(&name.as_str()) => {
                Err(SqlTmplError::parse(pos, format!("function {:?} not defined", name)))
            }
            Expr::Pipeline(inner) => self.check_pipeline(inner, pos, "parenthesized pipeline"),
            _ => Ok(()),
        }
    }
}
