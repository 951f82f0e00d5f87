//! Pipe-chained filter applications
//!
//! `base | f1 | f2` folds left to right. The dialect of each application is
//! picked by its first character:
//!
//! | form              | meaning                                   |
//! |-------------------|-------------------------------------------|
//! | `@name[:args]`    | registry filter                           |
//! | `.name[:args]`    | attribute access, method call with args   |
//! | `[...][:args]`    | subscript, called with args if present    |
//! | `:body`           | lambda over `a, b, c, ...`                |
//! | `lambda p: body`  | literal lambda                            |
//! | `name[:args]`     | registry filter                           |
//!
//! A registry filter in the last segment may be followed by a comparison or
//! boolean tail (`x | @size > 2 and ready`), which applies to its result.

use crate::config::consts::expr::LAMBDA_PARAMS;
use crate::template::filters::FilterRegistry;

use super::ast::Expr;
use super::parser::{
    is_identifier, parse_args, parse_condition_tail, parse_expr, parse_filter_args, parse_lambda,
    parse_postfix_on,
};
use super::split::{split, split_once};
use super::ParseError;

/// Compile a full filter expression such as `items | @join: ', '`
pub(crate) fn compile_expression(text: &str, filters: &FilterRegistry) -> Result<Expr, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError("Empty expression".to_string()));
    }

    let mut segments = split(text, '|').into_iter().peekable();
    let base = segments.next().unwrap_or_default();
    let mut inputs = compile_base(&base, filters)?;

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        inputs = vec![apply(&segment, inputs, last, filters)?];
    }

    Ok(into_single(inputs))
}

fn compile_base(base: &str, filters: &FilterRegistry) -> Result<Vec<Expr>, ParseError> {
    if base.is_empty() {
        return Err(ParseError("Missing value before '|'".to_string()));
    }
    if starts_with_word(base, "lambda") {
        return Ok(vec![parse_expr(base, filters)?]);
    }
    let parts = split(base, ',');
    if parts.len() == 1 {
        return Ok(vec![parse_expr(base, filters)?]);
    }
    parts.iter().map(|part| parse_expr(part, filters)).collect()
}

fn into_single(mut inputs: Vec<Expr>) -> Expr {
    if inputs.len() == 1 {
        inputs.remove(0)
    } else {
        Expr::Tuple(inputs)
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(|c: char| c == '_' || c.is_ascii_alphanumeric()))
}

/// A registry filter application: `name`, `name: a, b` or either followed
/// by a condition tail such as `== 3`
struct FilterCall<'s> {
    name: &'s str,
    args: Vec<Expr>,
    tail: Option<&'s str>,
}

fn parse_filter_call<'s>(
    segment: &'s str,
    filters: &FilterRegistry,
) -> Result<FilterCall<'s>, ParseError> {
    let segment = segment.trim();
    let name_end = segment
        .find(|c: char| c != '_' && !c.is_ascii_alphanumeric())
        .unwrap_or(segment.len());
    let (name, rest) = (&segment[..name_end], segment[name_end..].trim_start());

    if !is_identifier(name) {
        return Err(ParseError(format!("Invalid filter '{}'", segment)));
    }
    if rest.is_empty() {
        return Ok(FilterCall {
            name,
            args: Vec::new(),
            tail: None,
        });
    }
    match rest.strip_prefix(':') {
        Some(args) => {
            let (args_expr, tail) = parse_filter_args(args, filters)?;
            Ok(FilterCall {
                name,
                args: args_expr,
                tail: tail.map(|offset| &args[offset..]),
            })
        }
        None => Ok(FilterCall {
            name,
            args: Vec::new(),
            tail: Some(rest),
        }),
    }
}

fn registry_filter(
    segment: &str,
    inputs: Vec<Expr>,
    last: bool,
    filters: &FilterRegistry,
) -> Result<Expr, ParseError> {
    let call = parse_filter_call(segment, filters)?;
    if !filters.contains(call.name) {
        return Err(ParseError(format!("Unknown filter '{}'", call.name)));
    }
    let mut all = inputs;
    all.extend(call.args);
    let applied = Expr::Filter {
        name: call.name.to_string(),
        args: all,
    };

    match call.tail {
        None => Ok(applied),
        Some(tail) if last => parse_condition_tail(applied, tail, filters),
        Some(tail) => Err(ParseError(format!(
            "'{}' after filter '{}' must come at the end of the filter chain",
            tail.trim(),
            call.name
        ))),
    }
}

fn apply(
    segment: &str,
    inputs: Vec<Expr>,
    last: bool,
    filters: &FilterRegistry,
) -> Result<Expr, ParseError> {
    if segment.is_empty() {
        return Err(ParseError("Empty filter after '|'".to_string()));
    }

    if let Some(rest) = segment.strip_prefix('@') {
        return registry_filter(rest, inputs, last, filters);
    }

    if segment.starts_with('.') {
        let target = into_single(inputs);
        return match split_once(segment, ':') {
            None => parse_postfix_on(target, segment, filters),
            Some((name, args)) => {
                let name = name.trim_start_matches('.');
                if !is_identifier(name) {
                    return Err(ParseError(format!("Invalid method name '{}'", name)));
                }
                Ok(Expr::Method {
                    target: Box::new(target),
                    name: name.to_string(),
                    args: parse_args(args, filters)?,
                })
            }
        };
    }

    if segment.starts_with('[') {
        let target = into_single(inputs);
        return match split_once(segment, ':') {
            None => parse_postfix_on(target, segment, filters),
            Some((subscript, args)) => Ok(Expr::Call {
                callee: Box::new(parse_postfix_on(target, subscript, filters)?),
                args: parse_args(args, filters)?,
            }),
        };
    }

    if let Some(body) = segment.strip_prefix(':') {
        let params = implicit_params(inputs.len())?;
        return Ok(Expr::Apply {
            params,
            body: Box::new(parse_expr(body, filters)?),
            args: inputs,
        });
    }

    if starts_with_word(segment, "lambda") {
        let (params, body) = parse_lambda(segment, filters)?;
        if params.len() != inputs.len() {
            return Err(ParseError(format!(
                "Lambda takes {} parameter(s) but {} value(s) are piped into it",
                params.len(),
                inputs.len()
            )));
        }
        return Ok(Expr::Apply {
            params,
            body: Box::new(body),
            args: inputs,
        });
    }

    registry_filter(segment, inputs, last, filters)
}

fn implicit_params(count: usize) -> Result<Vec<String>, ParseError> {
    if count > LAMBDA_PARAMS.len() {
        return Err(ParseError(format!(
            "Too many piped values for an implicit lambda: {}",
            count
        )));
    }
    Ok(LAMBDA_PARAMS
        .chars()
        .take(count)
        .map(|c| c.to_string())
        .collect())
}
