//! Whitespace control and mode directive tests

use super::helpers::{compile_err, render_ok};
use super::*;
use crate::config::EngineConfig;

fn items() -> TemplateContext {
    TemplateContext::empty().with("items", vec![1, 2])
}

#[test]
fn test_loose_mode_keeps_whitespace_without_markers() {
    let template = "{% if true %}\nx\n{% endif %}\n";
    assert_eq!(render_ok(template, &items()), "\nx\n\n");
}

#[test]
fn test_loose_mode_trim_markers() {
    let template = "a\n{%- for i in items -%}\n  {{ i }}\n{%- endfor -%}\nb";
    assert_eq!(render_ok(template, &items()), "a\n  1\n  2\nb");
    assert_eq!(render_ok("[ {{- 'x' -}} ]", &items()), "[x]");
}

#[test]
fn test_compact_mode_trims_every_tag() {
    let template = "{% mode compact %}\n<ul>\n  {% for i in items %}\n  <li>{{ i }}</li>\n  {% endfor %}\n</ul>\n";
    assert_eq!(
        render_ok(template, &items()),
        "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>\n"
    );
    assert_eq!(
        render_ok("{% mode compact %}\n{{ items[0] }} {{ items[1] }}", &items()),
        "12"
    );
}

#[test]
fn test_mixed_mode_trims_statements_only() {
    let template = "{% mode mixed %}\n{{ items[0] }} {{ items[1] }}\n{% if true %}\n  yes\n{% endif %}\n";
    assert_eq!(render_ok(template, &items()), "1 2\n  yes\n");
}

#[test]
fn test_directive_sets_mode_and_debug() {
    let engine = TemplateEngine::new();
    let template = engine.compile("{% mode mixed debug %}\nx").unwrap();
    assert_eq!(template.mode(), Mode::Mixed);
    assert!(template.debug());

    let template = engine.compile("x").unwrap();
    assert_eq!(template.mode(), Mode::Loose);
    assert!(!template.debug());
}

#[test]
fn test_config_defaults_apply_without_directive() {
    let config = EngineConfig {
        mode: Mode::Compact,
        debug: true,
        ..EngineConfig::default()
    };
    let engine = TemplateEngine::with_config(config);

    let template = engine.compile("x").unwrap();
    assert_eq!(template.mode(), Mode::Compact);
    assert!(template.debug());

    let template = engine.compile("{% mode loose nodebug %}\nx").unwrap();
    assert_eq!(template.mode(), Mode::Loose);
    assert!(!template.debug());
}

#[test]
fn test_unknown_directive_words_are_ignored() {
    let template = TemplateEngine::new().compile("{% mode fancy %}\nx").unwrap();
    assert_eq!(template.mode(), Mode::Loose);
    assert_eq!(template.render(&TemplateContext::empty()).unwrap(), "x");
}

#[test]
fn test_directive_only_on_first_line() {
    match compile_err("x\n{% mode compact %}") {
        TemplateError::Syntax { message, line, .. } => {
            assert_eq!(message, "Unknown tag: mode");
            assert_eq!(line, 2);
        }
        other => panic!("Expected Syntax error, got {:?}", other),
    }
}

#[test]
fn test_line_numbers_count_directive_line() {
    match render("{% mode loose %}\n\n{{ ghost }}", &TemplateContext::empty()) {
        Err(TemplateError::Render { line, .. }) => assert_eq!(line, 3),
        other => panic!("Expected Render error, got {:?}", other),
    }
}

#[test]
fn test_mode_parsing() {
    assert_eq!("compact".parse::<Mode>().unwrap(), Mode::Compact);
    assert!("Compact".parse::<Mode>().is_err());
    assert_eq!(Mode::Mixed.to_string(), "mixed");
    assert_eq!(Mode::default(), Mode::Loose);
}
