//! Template module - Liquid-style template compiler and renderer
//!
//! Templates are compiled once into a linked instruction [`Program`] and
//! rendered any number of times against TOML or JSON data.
//!
//! ## Syntax
//!
//! - Output: `{{ user.name | @upcase }}`
//! - Statements: `{% if %}`/`{% elif %}`/`{% else %}`, `{% unless %}`,
//!   `{% for x in items %}`, `{% while %}`, `{% case %}`/`{% when %}`,
//!   `{% capture %}`, `{% assign %}`, `{% increment %}`, `{% include %}`
//! - Verbatim regions: `{% raw %}` and `{% comment %}`
//! - Notes: `{# never rendered #}`
//! - Mode directive on the first line: `{% mode compact debug %}`
//!
//! ## Filters
//!
//! Filter chains are left-associative and resolved against a
//! [`FilterRegistry`] at compile time:
//!
//! - `x | @name: args` or `x | name: args`: registry filter
//! - `x | .attr` / `x | .method: args`: attribute access or method call
//! - `x | [0]` / `x | [1:3]`: index or slice
//! - `a, b | : a + b`: implicit lambda over the inputs
//! - `x | lambda v: v * 2`: explicit lambda
//!
//! In the last filter of a chain, a comparison or `and`/`or` after the
//! arguments applies to the filter result: `{% if x | @size > 2 %}`.

pub mod engine;
pub mod error;
pub mod expr;
pub mod filters;
pub mod value;

pub use engine::{
    compile, render, FsLoader, MemoryLoader, Mode, Program, Template, TemplateContext,
    TemplateEngine, TemplateLoader,
};
pub use error::{EvalError, TemplateError};
pub use filters::FilterRegistry;
pub use value::{Bindings, Function, Value};
