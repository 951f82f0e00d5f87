//! Filter registry
//!
//! Filters are plain callables keyed by name. A filter receives the piped
//! input values first, then any `: args`, and returns a new value.
//!
//! [`FilterRegistry::standard`] carries the usual Liquid set; hosts add their
//! own with [`FilterRegistry::register`].

use std::collections::BTreeMap;
use std::fmt;

use crate::template::error::EvalError;
use crate::template::value::{Function, Value};

/// Named filters available to templates
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Function>,
}

impl FilterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the standard filters
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (name, func) in STANDARD {
            registry.register(*name, *func);
        }
        registry
    }

    /// Register or replace a filter
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.filters
            .insert(name.clone(), Function::native(name, func));
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.register(name, func);
        self
    }

    pub fn get(&self, name: &str) -> Option<Function> {
        self.filters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

type FilterFn = fn(&[Value]) -> Result<Value, EvalError>;

const STANDARD: &[(&str, FilterFn)] = &[
    ("abs", abs),
    ("append", append),
    ("capitalize", capitalize),
    ("ceil", ceil),
    ("compact", compact),
    ("default", default),
    ("divided_by", divided_by),
    ("downcase", downcase),
    ("escape", escape),
    ("first", first),
    ("floor", floor),
    ("join", join),
    ("last", last),
    ("lstrip", lstrip),
    ("map", map),
    ("minus", minus),
    ("modulo", modulo),
    ("newline_to_br", newline_to_br),
    ("plus", plus),
    ("prepend", prepend),
    ("remove", remove),
    ("replace", replace),
    ("reverse", reverse),
    ("round", round),
    ("rstrip", rstrip),
    ("size", size),
    ("slice", slice),
    ("sort", sort),
    ("split", split),
    ("strip", strip),
    ("times", times),
    ("truncate", truncate),
    ("uniq", uniq),
    ("upcase", upcase),
];

/// Check the argument count is within `min..=max`
fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn int_arg(name: &str, value: &Value) -> Result<i64, EvalError> {
    value
        .as_int()
        .ok_or_else(|| EvalError::filter(name, format!("expected an integer, got {}", value.type_name())))
}

fn list_arg<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], EvalError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(EvalError::filter(
            name,
            format!("expected a list, got {}", other.type_name()),
        )),
    }
}

fn string_filter(
    name: &str,
    args: &[Value],
    op: impl Fn(&str) -> String,
) -> Result<Value, EvalError> {
    arity(name, args, 1, 1)?;
    Ok(Value::Str(op(&args[0].render())))
}

fn number_filter(
    name: &str,
    args: &[Value],
    op: impl Fn(f64) -> f64,
) -> Result<Value, EvalError> {
    arity(name, args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(op(*f) as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| Value::Int(op(f) as i64))
            .map_err(|_| EvalError::filter(name, format!("'{}' is not a number", s))),
        other => Err(EvalError::filter(
            name,
            format!("expected a number, got {}", other.type_name()),
        )),
    }
}

fn abs(args: &[Value]) -> Result<Value, EvalError> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => Ok(i
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*i as f64).abs()))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EvalError::filter(
            "abs",
            format!("expected a number, got {}", other.type_name()),
        )),
    }
}

fn append(args: &[Value]) -> Result<Value, EvalError> {
    arity("append", args, 2, 2)?;
    Ok(Value::Str(format!("{}{}", args[0], args[1])))
}

fn prepend(args: &[Value]) -> Result<Value, EvalError> {
    arity("prepend", args, 2, 2)?;
    Ok(Value::Str(format!("{}{}", args[1], args[0])))
}

fn capitalize(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("capitalize", args, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    })
}

fn downcase(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("downcase", args, str::to_lowercase)
}

fn upcase(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("upcase", args, str::to_uppercase)
}

fn strip(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("strip", args, |s| s.trim().to_string())
}

fn lstrip(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("lstrip", args, |s| s.trim_start().to_string())
}

fn rstrip(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("rstrip", args, |s| s.trim_end().to_string())
}

fn escape(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("escape", args, |s| {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                c => out.push(c),
            }
        }
        out
    })
}

fn newline_to_br(args: &[Value]) -> Result<Value, EvalError> {
    string_filter("newline_to_br", args, |s| s.replace('\n', "<br />\n"))
}

fn ceil(args: &[Value]) -> Result<Value, EvalError> {
    number_filter("ceil", args, f64::ceil)
}

fn floor(args: &[Value]) -> Result<Value, EvalError> {
    number_filter("floor", args, f64::floor)
}

fn round(args: &[Value]) -> Result<Value, EvalError> {
    arity("round", args, 1, 2)?;
    let digits = match args.get(1) {
        Some(value) => int_arg("round", value)?,
        None => 0,
    };
    if digits <= 0 {
        return number_filter("round", &args[..1], f64::round);
    }
    let value = args[0]
        .as_float()
        .ok_or_else(|| EvalError::filter("round", "expected a number"))?;
    let factor = 10f64.powi(digits.min(15) as i32);
    Ok(Value::Float((value * factor).round() / factor))
}

fn plus(args: &[Value]) -> Result<Value, EvalError> {
    arity("plus", args, 2, 2)?;
    args[0].add(&args[1])
}

fn minus(args: &[Value]) -> Result<Value, EvalError> {
    arity("minus", args, 2, 2)?;
    args[0].sub(&args[1])
}

fn times(args: &[Value]) -> Result<Value, EvalError> {
    arity("times", args, 2, 2)?;
    args[0].mul(&args[1])
}

fn divided_by(args: &[Value]) -> Result<Value, EvalError> {
    arity("divided_by", args, 2, 2)?;
    args[0].div(&args[1])
}

fn modulo(args: &[Value]) -> Result<Value, EvalError> {
    arity("modulo", args, 2, 2)?;
    args[0].rem(&args[1])
}

fn default(args: &[Value]) -> Result<Value, EvalError> {
    arity("default", args, 2, 2)?;
    if args[0].is_empty() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

fn size(args: &[Value]) -> Result<Value, EvalError> {
    arity("size", args, 1, 1)?;
    args[0].len().map(Value::from).ok_or_else(|| {
        EvalError::filter("size", format!("{} has no size", args[0].type_name()))
    })
}

fn first(args: &[Value]) -> Result<Value, EvalError> {
    arity("first", args, 1, 1)?;
    match &args[0] {
        Value::List(items) => Ok(items.first().cloned().unwrap_or_default()),
        Value::Str(s) => Ok(s.chars().next().map(String::from).into()),
        other => Err(EvalError::filter(
            "first",
            format!("expected a list or string, got {}", other.type_name()),
        )),
    }
}

fn last(args: &[Value]) -> Result<Value, EvalError> {
    arity("last", args, 1, 1)?;
    match &args[0] {
        Value::List(items) => Ok(items.last().cloned().unwrap_or_default()),
        Value::Str(s) => Ok(s.chars().last().map(String::from).into()),
        other => Err(EvalError::filter(
            "last",
            format!("expected a list or string, got {}", other.type_name()),
        )),
    }
}

fn join(args: &[Value]) -> Result<Value, EvalError> {
    arity("join", args, 1, 2)?;
    let separator = args.get(1).map_or_else(|| " ".to_string(), Value::render);
    let items = list_arg("join", &args[0])?;
    Ok(Value::Str(
        items
            .iter()
            .map(Value::render)
            .collect::<Vec<_>>()
            .join(&separator),
    ))
}

fn split(args: &[Value]) -> Result<Value, EvalError> {
    arity("split", args, 2, 2)?;
    let text = args[0].render();
    let separator = args[1].render();
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        text.split(separator.as_str()).map(Value::from).collect()
    };
    Ok(Value::List(parts))
}

fn remove(args: &[Value]) -> Result<Value, EvalError> {
    arity("remove", args, 2, 2)?;
    Ok(Value::Str(args[0].render().replace(&args[1].render(), "")))
}

fn replace(args: &[Value]) -> Result<Value, EvalError> {
    arity("replace", args, 3, 3)?;
    Ok(Value::Str(
        args[0].render().replace(&args[1].render(), &args[2].render()),
    ))
}

fn reverse(args: &[Value]) -> Result<Value, EvalError> {
    arity("reverse", args, 1, 1)?;
    match &args[0] {
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
        other => Err(EvalError::filter(
            "reverse",
            format!("expected a list or string, got {}", other.type_name()),
        )),
    }
}

fn compact(args: &[Value]) -> Result<Value, EvalError> {
    arity("compact", args, 1, 1)?;
    let items = list_arg("compact", &args[0])?;
    Ok(Value::List(
        items.iter().filter(|item| !item.is_nil()).cloned().collect(),
    ))
}

fn uniq(args: &[Value]) -> Result<Value, EvalError> {
    arity("uniq", args, 1, 1)?;
    let mut seen: Vec<Value> = Vec::new();
    for item in list_arg("uniq", &args[0])? {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    Ok(Value::List(seen))
}

/// Property of a map item, used by `map` and `sort`
fn property(name: &str, item: &Value, key: &str) -> Result<Value, EvalError> {
    match item {
        Value::Map(map) => Ok(map.get(key).cloned().unwrap_or_default()),
        other => Err(EvalError::filter(
            name,
            format!("cannot read '{}' of {}", key, other.type_name()),
        )),
    }
}

fn map(args: &[Value]) -> Result<Value, EvalError> {
    arity("map", args, 2, 2)?;
    let items = list_arg("map", &args[0])?;
    let mapped = match &args[1] {
        Value::Function(func) => items
            .iter()
            .map(|item| func.call(std::slice::from_ref(item)))
            .collect::<Result<Vec<_>, _>>()?,
        key => {
            let key = key.render();
            items
                .iter()
                .map(|item| property("map", item, &key))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(Value::List(mapped))
}

fn sort(args: &[Value]) -> Result<Value, EvalError> {
    arity("sort", args, 1, 2)?;
    let items = list_arg("sort", &args[0])?;
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = match args.get(1) {
            Some(key) => property("sort", item, &key.render())?,
            None => item.clone(),
        };
        keyed.push((key, item.clone()));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        a.compare(b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            std::cmp::Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Value::List(keyed.into_iter().map(|(_, item)| item).collect())),
    }
}

/// `slice: offset[, length]`, negative offsets count from the end
fn slice(args: &[Value]) -> Result<Value, EvalError> {
    arity("slice", args, 2, 3)?;
    let offset = int_arg("slice", &args[1])?;
    let length = match args.get(2) {
        Some(value) => int_arg("slice", value)?.max(0) as usize,
        None => 1,
    };
    let window = |len: usize| -> (usize, usize) {
        let start = if offset < 0 { offset + len as i64 } else { offset };
        let start = start.clamp(0, len as i64) as usize;
        (start, (start + length).min(len))
    };
    match &args[0] {
        Value::List(items) => {
            let (start, end) = window(items.len());
            Ok(Value::List(items[start..end].to_vec()))
        }
        other => {
            let chars: Vec<char> = other.render().chars().collect();
            let (start, end) = window(chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
    }
}

fn truncate(args: &[Value]) -> Result<Value, EvalError> {
    arity("truncate", args, 1, 3)?;
    let text = args[0].render();
    let limit = match args.get(1) {
        Some(value) => int_arg("truncate", value)?.max(0) as usize,
        None => 50,
    };
    let ellipsis = args.get(2).map_or_else(|| "...".to_string(), Value::render);

    if text.chars().count() <= limit {
        return Ok(Value::Str(text));
    }
    let keep = limit.saturating_sub(ellipsis.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&ellipsis);
    Ok(Value::Str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        FilterRegistry::standard()
            .get(name)
            .unwrap_or_else(|| panic!("missing filter {}", name))
            .call(args)
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn test_standard_registry_names() {
        let registry = FilterRegistry::standard();
        assert!(registry.contains("upcase"));
        assert!(registry.contains("divided_by"));
        assert!(!registry.contains("nope"));
        assert_eq!(registry.names().count(), STANDARD.len());
    }

    #[test]
    fn test_register_custom_filter() {
        let registry = FilterRegistry::new().with("twice", |args| args[0].mul(&Value::Int(2)));
        assert_eq!(
            registry.get("twice").unwrap().call(&[Value::Int(4)]).unwrap(),
            Value::Int(8)
        );
        assert!(!registry.contains("upcase"));
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(call("upcase", &[s("abc")]).unwrap(), s("ABC"));
        assert_eq!(call("capitalize", &[s("hello world")]).unwrap(), s("Hello world"));
        assert_eq!(call("strip", &[s("  x ")]).unwrap(), s("x"));
        assert_eq!(call("append", &[s("a"), s("b")]).unwrap(), s("ab"));
        assert_eq!(call("prepend", &[s("a"), s("b")]).unwrap(), s("ba"));
        assert_eq!(call("replace", &[s("aXbX"), s("X"), s("-")]).unwrap(), s("a-b-"));
        assert_eq!(call("remove", &[s("aXbX"), s("X")]).unwrap(), s("ab"));
        assert_eq!(call("escape", &[s("<a & 'b'>")]).unwrap(), s("&lt;a &amp; &#39;b&#39;&gt;"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(call("truncate", &[s("Ground control"), Value::Int(9)]).unwrap(), s("Ground..."));
        assert_eq!(call("truncate", &[s("short"), Value::Int(9)]).unwrap(), s("short"));
        assert_eq!(
            call("truncate", &[s("Ground control"), Value::Int(7), s("")]).unwrap(),
            s("Ground ")
        );
    }

    #[test]
    fn test_list_filters() {
        let list = Value::from(vec![3, 1, 2, 1]);
        assert_eq!(call("sort", &[list.clone()]).unwrap(), Value::from(vec![1, 1, 2, 3]));
        assert_eq!(call("uniq", &[list.clone()]).unwrap(), Value::from(vec![3, 1, 2]));
        assert_eq!(call("reverse", &[list.clone()]).unwrap(), Value::from(vec![1, 2, 1, 3]));
        assert_eq!(call("first", &[list.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call("size", &[list.clone()]).unwrap(), Value::Int(4));
        assert_eq!(call("join", &[list, s(", ")]).unwrap(), s("3, 1, 2, 1"));
    }

    #[test]
    fn test_sort_rejects_mixed_types() {
        let list = Value::List(vec![Value::Int(1), s("a")]);
        assert!(call("sort", &[list]).is_err());
    }

    #[test]
    fn test_map_by_key_and_function() {
        let mut a = crate::template::value::Map::new();
        a.insert("name".into(), s("x"));
        let list = Value::List(vec![Value::Map(a)]);
        assert_eq!(call("map", &[list.clone(), s("name")]).unwrap(), Value::from(vec!["x"]));

        let upcase = FilterRegistry::standard().get("upcase").unwrap();
        assert_eq!(
            call("map", &[Value::from(vec!["a", "b"]), Value::Function(upcase)]).unwrap(),
            Value::from(vec!["A", "B"])
        );
    }

    #[test]
    fn test_math_filters() {
        assert_eq!(call("plus", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(call("divided_by", &[Value::Int(7), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(
            call("divided_by", &[Value::Int(7), Value::Int(0)]),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(call("ceil", &[Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", &[Value::Float(1.256), Value::Int(2)]).unwrap(), Value::Float(1.26));
        assert_eq!(call("abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_slice_and_split() {
        assert_eq!(call("slice", &[s("Liquid"), Value::Int(2), Value::Int(3)]).unwrap(), s("qui"));
        assert_eq!(call("slice", &[s("Liquid"), Value::Int(-3), Value::Int(2)]).unwrap(), s("ui"));
        assert_eq!(
            call("split", &[s("a,b"), s(",")]).unwrap(),
            Value::from(vec!["a", "b"])
        );
    }

    #[test]
    fn test_default() {
        assert_eq!(call("default", &[Value::Nil, s("x")]).unwrap(), s("x"));
        assert_eq!(call("default", &[s(""), s("x")]).unwrap(), s("x"));
        assert_eq!(call("default", &[Value::Int(0), s("x")]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_arity_errors() {
        match call("replace", &[s("a")]) {
            Err(EvalError::Arity { name, got, .. }) => {
                assert_eq!(name, "replace");
                assert_eq!(got, 1);
            }
            other => panic!("Expected Arity error, got {:?}", other),
        }
    }
}
