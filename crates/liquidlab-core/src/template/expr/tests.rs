use std::sync::Arc;

use super::*;
use crate::config::consts::expr::MAX_SEQUENCE_LEN;
use crate::template::error::EvalError;
use crate::template::filters::FilterRegistry;
use crate::template::value::{Bindings, Value};

fn registry() -> Arc<FilterRegistry> {
    Arc::new(FilterRegistry::standard())
}

fn bindings(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn eval_with(text: &str, vars: &Bindings) -> Result<Value, EvalError> {
    let filters = registry();
    let expr = compile_expression(text, &filters).unwrap();
    eval(&expr, &Scope::new(vars, &filters))
}

fn eval_str(text: &str) -> Value {
    eval_with(text, &Bindings::new()).unwrap()
}

fn list(items: &[i64]) -> Value {
    Value::List(items.iter().copied().map(Value::Int).collect())
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval_str("1 + 2 * 3"), Value::Int(7));
    assert_eq!(eval_str("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(eval_str("10 - 4 - 3"), Value::Int(3));
}

#[test]
fn test_division_floors_integers() {
    assert_eq!(eval_str("7 / 2"), Value::Int(3));
    assert_eq!(eval_str("-7 / 2"), Value::Int(-4));
    assert_eq!(eval_str("7 % -3"), Value::Int(-2));
    assert_eq!(eval_str("7 / 2.0"), Value::Float(3.5));
}

#[test]
fn test_division_by_zero_is_fault() {
    match eval_with("1 / 0", &Bindings::new()) {
        Err(EvalError::DivisionByZero) => {}
        other => panic!("Expected DivisionByZero, got {:?}", other),
    }
}

#[test]
fn test_comparison_and_membership() {
    assert_eq!(eval_str("2 > 1 and 1 <= 1"), Value::Bool(true));
    assert_eq!(eval_str("'a' in ['a', 'b']"), Value::Bool(true));
    assert_eq!(eval_str("'c' not in ['a', 'b']"), Value::Bool(true));
    assert_eq!(eval_str("'hello' contains 'ell'"), Value::Bool(true));
    assert_eq!(eval_str("1 == 1.0"), Value::Bool(true));
    assert_eq!(eval_str("1 <> 2"), Value::Bool(true));
}

#[test]
fn test_boolean_operators_return_operands() {
    let vars = bindings(&[("missing", Value::Nil)]);
    assert_eq!(eval_with("missing or 'fallback'", &vars).unwrap(), Value::from("fallback"));
    assert_eq!(eval_str("0 and 5"), Value::Int(0));
    assert_eq!(eval_str("not 0"), Value::Bool(true));
}

#[test]
fn test_undefined_name() {
    match eval_with("ghost + 1", &Bindings::new()) {
        Err(EvalError::UndefinedName(name)) => assert_eq!(name, "ghost"),
        other => panic!("Expected UndefinedName, got {:?}", other),
    }
}

#[test]
fn test_registry_filter_chain() {
    let vars = bindings(&[("name", Value::from("bob"))]);
    assert_eq!(
        eval_with("name | @upcase | @append: '!'", &vars).unwrap(),
        Value::from("BOB!")
    );
    assert_eq!(
        eval_with("name | capitalize | prepend: 'Hi '", &vars).unwrap(),
        Value::from("Hi Bob")
    );
}

#[test]
fn test_filter_chain_is_left_associative() {
    let vars = bindings(&[("n", Value::Int(2))]);
    // (2 + 3) * 4, not 2 + (3 * 4)
    assert_eq!(
        eval_with("n | @plus: 3 | @times: 4", &vars).unwrap(),
        Value::Int(20)
    );
}

#[test]
fn test_unknown_filter_is_parse_error() {
    let filters = registry();
    let err = compile_expression("x | @nope", &filters).unwrap_err();
    assert_eq!(err, ParseError("Unknown filter 'nope'".to_string()));
    assert!(compile_expression("x | nope: 1", &filters).is_err());
}

#[test]
fn test_attribute_and_method_dialects() {
    let mut user = crate::template::value::Map::new();
    user.insert("name".to_string(), Value::from("ada"));
    let vars = bindings(&[("user", Value::Map(user)), ("items", list(&[3, 1, 2]))]);

    assert_eq!(eval_with("user | .name", &vars).unwrap(), Value::from("ada"));
    assert_eq!(eval_with("user.name | .upcase", &vars).unwrap(), Value::from("ADA"));
    assert_eq!(
        eval_with("user.name | .append: '!'", &vars).unwrap(),
        Value::from("ada!")
    );
    assert_eq!(eval_with("items | .size", &vars).unwrap(), Value::Int(3));
    match eval_with("user | .age", &vars) {
        Err(EvalError::NoAttribute { name, .. }) => assert_eq!(name, "age"),
        other => panic!("Expected NoAttribute, got {:?}", other),
    }
}

#[test]
fn test_subscript_dialect() {
    let vars = bindings(&[("items", list(&[10, 20, 30, 40]))]);
    assert_eq!(eval_with("items | [0]", &vars).unwrap(), Value::Int(10));
    assert_eq!(eval_with("items | [-1]", &vars).unwrap(), Value::Int(40));
    assert_eq!(eval_with("items | [1:3]", &vars).unwrap(), list(&[20, 30]));
    match eval_with("items[9]", &vars) {
        Err(EvalError::IndexOutOfRange { index, len }) => {
            assert_eq!(index, 9);
            assert_eq!(len, 4);
        }
        other => panic!("Expected IndexOutOfRange, got {:?}", other),
    }
}

#[test]
fn test_implicit_lambda_over_inputs() {
    let vars = bindings(&[("x", Value::Int(3)), ("y", Value::Int(4))]);
    assert_eq!(eval_with("x, y | : a * b", &vars).unwrap(), Value::Int(12));
    assert_eq!(eval_with("x | : a + 1 | : a * 2", &vars).unwrap(), Value::Int(8));
}

#[test]
fn test_explicit_lambda() {
    let vars = bindings(&[("x", Value::Int(5))]);
    assert_eq!(eval_with("x | lambda v: v * 2", &vars).unwrap(), Value::Int(10));

    let filters = registry();
    assert!(compile_expression("x, x | lambda v: v", &filters).is_err());
}

#[test]
fn test_lambda_captures_scope() {
    let vars = bindings(&[("items", list(&[1, 2])), ("offset", Value::Int(10))]);
    assert_eq!(
        eval_with("items | @map: (lambda n: n + offset)", &vars).unwrap(),
        list(&[11, 12])
    );
}

#[test]
fn test_parenthesized_pipe_groups() {
    let vars = bindings(&[("items", list(&[1, 2, 3]))]);
    assert_eq!(eval_with("(items | @size) + 1", &vars).unwrap(), Value::Int(4));
    assert_eq!(
        eval_with("(items | @size) > 2 and (items | @first) == 1", &vars).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_ranges_and_literals() {
    assert_eq!(eval_str("(1..3)"), list(&[1, 2, 3]));
    assert_eq!(eval_str("[1, 2][1]"), Value::Int(2));
    assert_eq!(eval_str("{'a': 1}.a"), Value::Int(1));
    assert_eq!(eval_str("'ab' * 2"), Value::from("abab"));
}

#[test]
fn test_oversized_sequences_are_eval_errors() {
    let too_large = |what| EvalError::TooLarge {
        what,
        limit: MAX_SEQUENCE_LEN,
    };
    let none = Bindings::new();

    assert_eq!(
        eval_with("'ab' * 9223372036854775807", &none),
        Err(too_large("repeated string"))
    );
    assert_eq!(
        eval_with("(0..100000000000)", &none),
        Err(too_large("range"))
    );
    assert_eq!(
        eval_with("(-9223372036854775807..9223372036854775807)", &none),
        Err(too_large("range"))
    );
    assert_eq!(eval_str("'' * 9223372036854775807"), Value::from(""));
    assert_eq!(eval_str("'ab' * -3"), Value::from(""));
}

#[test]
fn test_filter_result_feeds_condition_tail() {
    let vars = bindings(&[("x", Value::from("b")), ("ready", Value::Bool(false))]);

    assert_eq!(
        eval_with("x | @append: 'a' == 'ba'", &vars).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_with("x | @append: 'a', 'c' == 'bac'", &vars),
        Err(EvalError::Arity {
            name: "append".to_string(),
            expected: "2".to_string(),
            got: 3,
        })
    );
    assert_eq!(eval_with("'abc' | @size == 3", &vars).unwrap(), Value::Bool(true));
    assert_eq!(
        eval_with("'abc' | @size > 2 and ready", &vars).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        eval_with("'abc' | @size > 5 or x", &vars).unwrap(),
        Value::from("b")
    );
    assert_eq!(
        eval_with("x | @upcase in 'ABC'", &vars).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_condition_tail_must_end_the_chain() {
    let filters = registry();
    assert!(compile_expression("x | @size == 3 | @upcase", &filters).is_err());
    assert!(compile_expression("x | @size 3", &filters).is_err());
    assert!(compile_expression("x | @append: 'a' 'b'", &filters).is_err());
}

#[test]
fn test_registry_names_resolve_as_callables() {
    assert_eq!(eval_str("upcase('x')"), Value::from("X"));

    let vars = bindings(&[("upcase", Value::from("shadowed"))]);
    assert_eq!(eval_with("upcase", &vars).unwrap(), Value::from("shadowed"));
}

#[test]
fn test_loop_header() {
    let filters = registry();
    let (targets, iterable) = parse_loop_header("k, v in pairs", &filters).unwrap();
    assert_eq!(targets, vec!["k".to_string(), "v".to_string()]);
    assert_eq!(iterable, Expr::Variable("pairs".to_string()));

    let (_, iterable) = parse_loop_header("x in items | @reverse", &filters).unwrap();
    assert!(matches!(iterable, Expr::Filter { .. }));

    assert!(parse_loop_header("in items", &filters).is_err());
    assert!(parse_loop_header("x items", &filters).is_err());
}

#[test]
fn test_grammar_errors() {
    let filters = registry();
    for text in ["1 +", "(1, 2", "x |", "| x", "a b"] {
        assert!(compile_expression(text, &filters).is_err(), "{}", text);
    }
}
