//! Template engine implementation
//!
//! Compilation runs tokenizer -> tag classifier -> block-stack compiler and
//! produces a linked [`Program`]. Rendering interprets that program against a
//! fresh environment per call, so a compiled [`Template`] can be shared across
//! threads.

mod blocks;
mod helpers;
mod include;
mod program;
mod render;
mod tag;
mod tokenize;

use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::template::error::TemplateError;
use crate::template::filters::FilterRegistry;
use crate::template::value::{Bindings, Value};

use blocks::{compile_root, CompileContext};

pub use include::{FsLoader, MemoryLoader, TemplateLoader};
pub use program::{Fragment, Instruction, Op, Program};
pub use tokenize::Mode;

/// Names bound in every environment before stored bindings and context
const CONSTANTS: [(&str, Value); 5] = [
    ("true", Value::Bool(true)),
    ("false", Value::Bool(false)),
    ("nil", Value::Nil),
    ("blank", Value::Nil),
    ("none", Value::Nil),
];

/// Call-site data for a render
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    bindings: Bindings,
}

impl TemplateContext {
    /// Create a context from a TOML table; each top-level key becomes a binding
    pub fn new(data: toml::Value) -> Self {
        Self::from_value(data.into())
    }

    /// Create a context from a JSON object
    pub fn from_json(data: serde_json::Value) -> Self {
        Self::from_value(data.into())
    }

    fn from_value(value: Value) -> Self {
        let bindings = match value {
            Value::Map(map) => map.into_iter().collect(),
            other => {
                tracing::warn!(
                    type_name = other.type_name(),
                    "context data is not a table, ignoring it"
                );
                Bindings::new()
            }
        };
        Self { bindings }
    }

    /// Create an empty context
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// A compiled template, immutable and reusable
#[derive(Debug, Clone)]
pub struct Template {
    program: Program,
    bindings: Bindings,
    filters: Arc<FilterRegistry>,
    mode: Mode,
    debug: bool,
}

impl Template {
    /// Render with `context`
    pub fn render(&self, context: &TemplateContext) -> Result<String, TemplateError> {
        self.render_with_env(context).map(|(output, _)| output)
    }

    /// Render with `context`, also returning the final environment
    pub fn render_with_env(
        &self,
        context: &TemplateContext,
    ) -> Result<(String, Bindings), TemplateError> {
        let mut env: Bindings = CONSTANTS
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        env.extend(self.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(context.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));

        render::execute(&self.program, env, &self.filters)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Tokenizer mode the template was compiled with
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Compiles templates with shared configuration, filters and bindings
#[derive(Clone)]
pub struct TemplateEngine {
    config: EngineConfig,
    filters: Arc<FilterRegistry>,
    loader: Arc<dyn TemplateLoader>,
    bindings: Bindings,
}

impl TemplateEngine {
    /// Create an engine with default config, standard filters and [`FsLoader`]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            filters: Arc::new(FilterRegistry::standard()),
            loader: Arc::new(FsLoader),
            bindings: Bindings::new(),
        }
    }

    /// Replace the filter registry
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    /// Replace the include loader
    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Bind `name` in every template compiled by this engine
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Compile `text` into a reusable [`Template`]
    pub fn compile(&self, text: &str) -> Result<Template, TemplateError> {
        let ctx = CompileContext {
            filters: &self.filters,
            loader: self.loader.as_ref(),
            include_dir: self.config.include_dir.as_deref(),
            include_extension: &self.config.include_extension,
            max_include_depth: self.config.max_include_depth,
            default_mode: self.config.mode,
            debug: self.config.debug,
        };
        let compiled = compile_root(text, &ctx)?;

        Ok(Template {
            program: compiled.program,
            bindings: self.bindings.clone(),
            filters: Arc::clone(&self.filters),
            mode: compiled.mode,
            debug: compiled.debug,
        })
    }

    /// Compile and render in one step
    pub fn render(&self, text: &str, context: &TemplateContext) -> Result<String, TemplateError> {
        self.compile(text)?.render(context)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("config", &self.config)
            .field("filters", &self.filters)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Compile `text` with includes resolved against `include_dir`
pub fn compile(
    text: &str,
    include_dir: Option<&Path>,
    bindings: Bindings,
) -> Result<Template, TemplateError> {
    let config = EngineConfig {
        include_dir: include_dir.map(Path::to_path_buf),
        ..EngineConfig::default()
    };
    let mut engine = TemplateEngine::with_config(config);
    engine.bindings = bindings;
    engine.compile(text)
}

/// Convenience function to render a template
pub fn render(template: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    TemplateEngine::new().render(template, context)
}

#[cfg(test)]
mod tests;
