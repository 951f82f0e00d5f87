//! Shared test helpers for template engine tests

use crate::template::engine::{render, TemplateContext, TemplateEngine};
use crate::template::error::TemplateError;
use toml::{toml, Value};

/// Create a simple test context with basic scalar values
pub(super) fn simple_context() -> TemplateContext {
    let data = toml! {
        title = "My Title"
        count = 42
        price = 9.99
        enabled = true
        date = 2026-01-15
        tags = ["rust", "templates"]
        empty = []
    };
    TemplateContext::new(Value::Table(data))
}

/// Create a nested test context with arrays and tables
pub(super) fn nested_context() -> TemplateContext {
    let data = toml! {
        [paper]
        title = "Research Paper"
        language = "en"

        [[paper.authors]]
        name = "John Doe"
        email = "john@example.com"

        [[paper.authors]]
        name = "Jane Smith"
        email = "jane@example.com"

        [scores]
        alice = 3
        bob = 5
    };
    TemplateContext::new(Value::Table(data))
}

/// Render `template` with the default engine, panicking on failure
pub(super) fn render_ok(template: &str, context: &TemplateContext) -> String {
    match render(template, context) {
        Ok(output) => output,
        Err(e) => panic!("Failed to render {:?}: {}", template, e),
    }
}

/// Compile `template` and return the expected syntax error
pub(super) fn compile_err(template: &str) -> TemplateError {
    match TemplateEngine::new().compile(template) {
        Ok(compiled) => panic!(
            "Expected {:?} to fail compiling, got program:\n{}",
            template,
            compiled.program()
        ),
        Err(e) => e,
    }
}
