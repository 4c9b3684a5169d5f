//! Rejection of constructs that cannot become parameterized SQL.
//!
//! Both compilers accept only pipelines made of a single command with a
//! single operand. Everything else is reported, never approximated.

use tracing::debug;

use crate::ast::{Expr, NodeKind, Pipeline};
use crate::error::{SqlTmplError, SqlTmplResult};

/// The operand of an output action. Actions may not declare or assign.
pub(crate) fn action_operand(pipeline: &Pipeline) -> SqlTmplResult<&Expr> {
    if pipeline.is_assign {
        return Err(reject(SqlTmplError::Unsupported("variable assignment")));
    }
    if !pipeline.decl.is_empty() {
        return Err(reject(SqlTmplError::Unsupported(
            "variable declaration outside if, range or with",
        )));
    }
    single_operand(pipeline)
}

/// The operand of an `if`/`range`/`with` pipeline.
pub(crate) fn control_operand(pipeline: &Pipeline) -> SqlTmplResult<&Expr> {
    if pipeline.is_assign {
        return Err(reject(SqlTmplError::Unsupported("variable assignment")));
    }
    single_operand(pipeline)
}

fn single_operand(pipeline: &Pipeline) -> SqlTmplResult<&Expr> {
    if pipeline.cmds.len() > 1 {
        return Err(reject(SqlTmplError::ChainedPipeline));
    }
    let Some(cmd) = pipeline.cmds.first() else {
        return Err(reject(SqlTmplError::Unsupported("empty pipeline")));
    };
    match cmd.args.as_slice() {
        [] => Err(reject(SqlTmplError::Unsupported("empty command"))),
        [Expr::Identifier(_)] | [_, _, ..] => Err(reject(SqlTmplError::FunctionCall)),
        [Expr::Pipeline(_)] => Err(reject(SqlTmplError::Unsupported("parenthesized pipeline"))),
        [arg] => Ok(arg),
    }
}

pub(crate) fn unsupported_node(kind: NodeKind) -> SqlTmplError {
    reject(SqlTmplError::UnsupportedNode(kind))
}

fn reject(err: SqlTmplError) -> SqlTmplError {
    debug!(error = %err, "rejected template construct");
    err
}
