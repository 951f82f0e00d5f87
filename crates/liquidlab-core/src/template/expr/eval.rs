//! Tree-walking evaluator

use std::sync::Arc;

use crate::config::consts::expr::MAX_SEQUENCE_LEN;
use crate::template::error::EvalError;
use crate::template::filters::FilterRegistry;
use crate::template::value::{Bindings, Function, Lambda, Map, Value};

use super::ast::{BinaryOp, Expr, UnaryOp};

/// Chain of binding maps searched innermost first
///
/// Names missing from every map fall back to the filter registry, so
/// registered filters are callable as plain functions unless shadowed.
pub(crate) struct Scope<'a> {
    vars: &'a Bindings,
    parent: Option<&'a Scope<'a>>,
    filters: &'a Arc<FilterRegistry>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(vars: &'a Bindings, filters: &'a Arc<FilterRegistry>) -> Self {
        Self {
            vars,
            parent: None,
            filters,
        }
    }

    pub(crate) fn child<'b>(&'b self, vars: &'b Bindings) -> Scope<'b> {
        Scope {
            vars,
            parent: Some(self),
            filters: self.filters,
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        match self.vars.get(name) {
            Some(value) => Some(value),
            None => self.parent.and_then(|parent| parent.lookup(name)),
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.lookup(name) {
            return Ok(value.clone());
        }
        self.filters
            .get(name)
            .map(Value::Function)
            .ok_or_else(|| EvalError::UndefinedName(name.to_string()))
    }

    /// Flatten the chain into one map, inner bindings winning
    fn snapshot(&self) -> Bindings {
        let mut merged = match self.parent {
            Some(parent) => parent.snapshot(),
            None => Bindings::new(),
        };
        merged.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl Lambda {
    pub(crate) fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        let params = bind_params(&self.params, args)?;
        let outer = Scope::new(&self.captured, &self.filters);
        eval(&self.body, &outer.child(&params))
    }
}

fn bind_params(params: &[String], args: &[Value]) -> Result<Bindings, EvalError> {
    if params.len() != args.len() {
        return Err(EvalError::Arity {
            name: "<lambda>".to_string(),
            expected: params.len().to_string(),
            got: args.len(),
        });
    }
    Ok(params.iter().cloned().zip(args.iter().cloned()).collect())
}

fn eval_all(exprs: &[Expr], scope: &Scope<'_>) -> Result<Vec<Value>, EvalError> {
    exprs.iter().map(|expr| eval(expr, scope)).collect()
}

pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => scope.resolve(name),
        Expr::Tuple(items) | Expr::List(items) => Ok(Value::List(eval_all(items, scope)?)),
        Expr::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(eval(key, scope)?.render(), eval(value, scope)?);
            }
            Ok(Value::Map(map))
        }
        Expr::Range(start, end) => {
            let start = range_bound(eval(start, scope)?)?;
            let end = range_bound(eval(end, scope)?)?;
            let len = (end as i128 - start as i128 + 1).max(0);
            if len > MAX_SEQUENCE_LEN as i128 {
                return Err(EvalError::TooLarge {
                    what: "range",
                    limit: MAX_SEQUENCE_LEN,
                });
            }
            Ok(Value::List((start..=end).map(Value::Int).collect()))
        }
        Expr::Attribute { target, name } => attribute(eval(target, scope)?, name, scope),
        Expr::Method { target, name, args } => {
            let target = eval(target, scope)?;
            let args = eval_all(args, scope)?;
            method(target, name, args, scope)
        }
        Expr::Index { target, index } => index_value(&eval(target, scope)?, &eval(index, scope)?),
        Expr::Slice { target, start, end } => {
            let target = eval(target, scope)?;
            let start = optional_bound(start.as_deref(), scope)?;
            let end = optional_bound(end.as_deref(), scope)?;
            slice_value(&target, start, end)
        }
        Expr::Call { callee, args } => {
            let args = eval_all(args, scope)?;
            match eval(callee, scope)? {
                Value::Function(func) => func.call(&args),
                _ => Err(EvalError::NotCallable(callee.to_string())),
            }
        }
        Expr::Filter { name, args } => {
            let func = scope
                .filters
                .get(name)
                .ok_or_else(|| EvalError::UndefinedName(name.clone()))?;
            func.call(&eval_all(args, scope)?)
        }
        Expr::Lambda { params, body } => Ok(Value::Function(Function::Lambda(Arc::new(Lambda {
            params: params.clone(),
            body: (**body).clone(),
            captured: scope.snapshot(),
            filters: Arc::clone(scope.filters),
        })))),
        Expr::Apply { params, body, args } => {
            let params = bind_params(params, &eval_all(args, scope)?)?;
            eval(body, &scope.child(&params))
        }
        Expr::Unary { op, operand } => {
            let value = eval(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => value.neg(),
            }
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, scope),
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope<'_>) -> Result<Value, EvalError> {
    let left = eval(left, scope)?;
    match op {
        BinaryOp::Or if left.is_truthy() => return Ok(left),
        BinaryOp::And if !left.is_truthy() => return Ok(left),
        BinaryOp::Or | BinaryOp::And => return eval(right, scope),
        _ => {}
    }

    let right = eval(right, scope)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(Value::Bool(left.compare(&right)?.is_lt())),
        BinaryOp::Le => Ok(Value::Bool(left.compare(&right)?.is_le())),
        BinaryOp::Gt => Ok(Value::Bool(left.compare(&right)?.is_gt())),
        BinaryOp::Ge => Ok(Value::Bool(left.compare(&right)?.is_ge())),
        BinaryOp::In => Ok(Value::Bool(right.contains(&left)?)),
        BinaryOp::NotIn => Ok(Value::Bool(!right.contains(&left)?)),
        BinaryOp::Contains => Ok(Value::Bool(left.contains(&right)?)),
        BinaryOp::Add => left.add(&right),
        BinaryOp::Sub => left.sub(&right),
        BinaryOp::Mul => left.mul(&right),
        BinaryOp::Div => left.div(&right),
        BinaryOp::Rem => left.rem(&right),
        BinaryOp::Or | BinaryOp::And => Ok(right),
    }
}

fn range_bound(value: Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(i) => Ok(i),
        other => Err(EvalError::type_error(format!(
            "range bounds must be integers, got {}",
            other.type_name()
        ))),
    }
}

fn optional_bound(expr: Option<&Expr>, scope: &Scope<'_>) -> Result<Option<i64>, EvalError> {
    match expr {
        None => Ok(None),
        Some(expr) => match eval(expr, scope)? {
            Value::Nil => Ok(None),
            Value::Int(i) => Ok(Some(i)),
            other => Err(EvalError::type_error(format!(
                "slice indices must be integers, got {}",
                other.type_name()
            ))),
        },
    }
}

/// `target.name`: map key, then built-in property, then a filter of that name
pub(crate) fn attribute(target: Value, name: &str, scope: &Scope<'_>) -> Result<Value, EvalError> {
    if let Value::Map(map) = &target {
        if let Some(value) = map.get(name) {
            return Ok(value.clone());
        }
    }

    let builtin = match (&target, name) {
        (_, "size" | "length") => target.len().map(Value::from),
        (Value::List(items), "first") => Some(items.first().cloned().unwrap_or_default()),
        (Value::List(items), "last") => Some(items.last().cloned().unwrap_or_default()),
        (Value::Str(s), "first") => Some(s.chars().next().map(String::from).into()),
        (Value::Str(s), "last") => Some(s.chars().last().map(String::from).into()),
        (Value::Map(map), "keys") => Some(Value::from(map.keys().cloned().collect::<Vec<_>>())),
        (Value::Map(map), "values") => Some(Value::List(map.values().cloned().collect())),
        _ => None,
    };
    if let Some(value) = builtin {
        return Ok(value);
    }

    if let Some(func) = scope.filters.get(name) {
        return func.call(&[target]);
    }

    Err(EvalError::NoAttribute {
        type_name: target.type_name(),
        name: name.to_string(),
    })
}

/// `target.name(args)`: a callable stored in a map, else a filter of that name
fn method(
    target: Value,
    name: &str,
    args: Vec<Value>,
    scope: &Scope<'_>,
) -> Result<Value, EvalError> {
    if let Value::Map(map) = &target {
        match map.get(name) {
            Some(Value::Function(func)) => return func.call(&args),
            Some(_) => return Err(EvalError::NotCallable(name.to_string())),
            None => {}
        }
    }

    match scope.filters.get(name) {
        Some(func) => {
            let mut all = Vec::with_capacity(args.len() + 1);
            all.push(target);
            all.extend(args);
            func.call(&all)
        }
        None => Err(EvalError::NoAttribute {
            type_name: target.type_name(),
            name: name.to_string(),
        }),
    }
}

/// Resolve a possibly negative index against `len`
fn normalize_index(index: i64, len: usize) -> Result<usize, EvalError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

pub(crate) fn index_value(target: &Value, index: &Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => Ok(items[normalize_index(*i, items.len())?].clone()),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[normalize_index(*i, chars.len())?].to_string()))
        }
        (Value::Map(map), key) => {
            let key = key.render();
            map.get(&key)
                .cloned()
                .ok_or(EvalError::KeyNotFound(key))
        }
        (target, index) => Err(EvalError::type_error(format!(
            "{} cannot be indexed by {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

/// Clamp slice bounds the way half-open ranges with negative offsets work
fn slice_bounds(start: Option<i64>, end: Option<i64>, len: usize) -> (usize, usize) {
    let clamp = |bound: i64| -> usize {
        let resolved = if bound < 0 { bound + len as i64 } else { bound };
        resolved.clamp(0, len as i64) as usize
    };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len, clamp);
    (start, end.max(start))
}

fn slice_value(target: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value, EvalError> {
    match target {
        Value::List(items) => {
            let (start, end) = slice_bounds(start, end, items.len());
            Ok(Value::List(items[start..end].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(start, end, chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        other => Err(EvalError::type_error(format!(
            "{} cannot be sliced",
            other.type_name()
        ))),
    }
}
