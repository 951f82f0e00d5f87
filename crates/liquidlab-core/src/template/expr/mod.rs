//! Expression sub-language
//!
//! Tag bodies such as `items | @sort | @join: ', '` or `(a + b) * 2 > limit`
//! compile into an [`Expr`] tree once, at template compile time, and are then
//! evaluated against a [`Scope`] on every render.

mod ast;
mod eval;
mod filter;
mod lexer;
mod parser;
pub(crate) mod split;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub(crate) use eval::{eval, Scope};
pub(crate) use filter::compile_expression;
pub(crate) use parser::{is_identifier, parse_loop_header};

/// Grammar error in an expression; the compiler attaches line and source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);
