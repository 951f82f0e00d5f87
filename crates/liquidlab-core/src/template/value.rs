//! Dynamic values flowing through templates
//!
//! Every context value, filter argument and expression result is a [`Value`].
//! The coercion rules live here and nowhere else:
//!
//! - **Truthiness**: `nil`, `false`, `0`, `0.0`, `""`, `[]` and `{}` are false.
//! - **Stringification**: `nil` renders empty, integral floats keep one
//!   decimal (`1.0`), lists concatenate their elements.
//! - **Equality**: integers and floats compare numerically; functions never
//!   compare equal.
//! - **Arithmetic**: `int / int` is floor division, any float operand makes it
//!   a float division. Division by zero is a fault.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::config::consts::expr::MAX_SEQUENCE_LEN;
use crate::template::error::EvalError;
use crate::template::expr::Expr;
use crate::template::filters::FilterRegistry;

/// Ordered string-keyed map
pub type Map = BTreeMap<String, Value>;

/// Named bindings visible to a template
pub type Bindings = HashMap<String, Value>;

/// Signature of native callables (filters and host functions)
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

/// A dynamically typed template value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Map),
    Function(Function),
}

/// A callable value
#[derive(Clone)]
pub enum Function {
    /// Host function, usually a registered filter
    Native { name: String, func: Arc<NativeFn> },
    /// Lambda created by a template expression
    Lambda(Arc<Lambda>),
}

/// Lambda closed over the bindings visible where it was created
pub struct Lambda {
    pub(crate) params: Vec<String>,
    pub(crate) body: Expr,
    pub(crate) captured: Bindings,
    pub(crate) filters: Arc<FilterRegistry>,
}

impl Function {
    /// Wrap a host closure as a template value
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Function::Native {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Native { name, .. } => name,
            Function::Lambda(_) => "<lambda>",
        }
    }

    /// Invoke with positional arguments
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            Function::Native { func, .. } => func(args),
            Function::Lambda(lambda) => lambda.call(args),
        }
    }

    fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native { func: a, .. }, Function::Native { func: b, .. }) => {
                Arc::ptr_eq(a, b)
            }
            (Function::Lambda(a), Function::Lambda(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { name, .. } => write!(f, "<function {}>", name),
            Function::Lambda(lambda) => write!(f, "<lambda {}>", lambda.params.join(", ")),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Function(_) => true,
        }
    }

    /// Empty in the `default` filter sense: nil, false or an empty container
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Nil | Value::Bool(false) => true,
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render for template output
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Number of elements of a sized value
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            Value::Nil => Some(0),
            _ => None,
        }
    }

    /// Items visited by a `for` loop
    ///
    /// Maps yield `[key, value]` pairs, strings yield characters.
    pub fn iterate(&self) -> Result<Vec<Value>, EvalError> {
        match self {
            Value::Nil => Ok(Vec::new()),
            Value::List(items) => Ok(items.clone()),
            Value::Map(map) => Ok(map
                .iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                .collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(EvalError::type_error(format!(
                "{} is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Membership test backing `in` and `contains`
    pub fn contains(&self, needle: &Value) -> Result<bool, EvalError> {
        match self {
            Value::List(items) => Ok(items.iter().any(|item| item == needle)),
            Value::Str(s) => match needle {
                Value::Str(n) => Ok(s.contains(n.as_str())),
                other => Ok(s.contains(other.to_string().as_str())),
            },
            Value::Map(map) => Ok(needle.as_str().is_some_and(|key| map.contains_key(key))),
            Value::Nil => Ok(false),
            other => Err(EvalError::type_error(format!(
                "argument of type {} is not a container",
                other.type_name()
            ))),
        }
    }

    pub fn compare(&self, other: &Value) -> Result<Ordering, EvalError> {
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            EvalError::type_error(format!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            ))
        })
    }

    pub fn add(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a
                .checked_add(*b)
                .map(Value::Int)
                .unwrap_or(Value::Float(*a as f64 + *b as f64))),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => self.float_op(other, "+", |x, y| x + y),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a
                .checked_sub(*b)
                .map(Value::Int)
                .unwrap_or(Value::Float(*a as f64 - *b as f64))),
            _ => self.float_op(other, "-", |x, y| x - y),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a
                .checked_mul(*b)
                .map(Value::Int)
                .unwrap_or(Value::Float(*a as f64 * *b as f64))),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = usize::try_from(*n).unwrap_or(0);
                match s.chars().count().checked_mul(count) {
                    Some(len) if len <= MAX_SEQUENCE_LEN => Ok(Value::Str(s.repeat(count))),
                    _ => Err(EvalError::TooLarge {
                        what: "repeated string",
                        limit: MAX_SEQUENCE_LEN,
                    }),
                }
            }
            _ => self.float_op(other, "*", |x, y| x * y),
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (_, Value::Int(0)) => Err(EvalError::DivisionByZero),
            (_, Value::Float(f)) if *f == 0.0 => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(floor_div(*a, *b)
                .map(Value::Int)
                .unwrap_or(Value::Float((*a as f64 / *b as f64).floor()))),
            _ => self.float_op(other, "/", |x, y| x / y),
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (_, Value::Int(0)) => Err(EvalError::DivisionByZero),
            (_, Value::Float(f)) if *f == 0.0 => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(
                floor_div(*a, *b).map_or(0, |q| a.wrapping_sub(q.wrapping_mul(*b))),
            )),
            _ => self.float_op(other, "%", |x, y| x - y * (x / y).floor()),
        }
    }

    pub fn neg(&self) -> Result<Value, EvalError> {
        match self {
            Value::Int(i) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(*i as f64)))),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::type_error(format!(
                "bad operand type for unary -: {}",
                other.type_name()
            ))),
        }
    }

    fn float_op(
        &self,
        other: &Value,
        symbol: &str,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, EvalError> {
        match (self.number(), other.number()) {
            (Some(x), Some(y)) => Ok(Value::Float(op(x, y))),
            _ => Err(EvalError::type_error(format!(
                "unsupported operand types for {}: {} and {}",
                symbol,
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    // Bools are not numbers for arithmetic, unlike `as_int`.
    fn number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Integer division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => items.iter().try_for_each(|item| write!(f, "{}", item)),
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Value::Function(_) => f.write_str("<function>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Function(func) => write!(f, "{:?}", func),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.as_float() == other.as_float()
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(map: HashMap<String, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::Str(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::Str(dt.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(table) => Value::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}
