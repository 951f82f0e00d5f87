//! Liquid-style template compiler and renderer
//!
//! ```no_run
//! use liquidlab_core::{TemplateContext, TemplateEngine};
//!
//! let engine = TemplateEngine::new();
//! let template = engine.compile("Hello, {{ name | @capitalize }}!")?;
//! let context = TemplateContext::empty().with("name", "world");
//! assert_eq!(template.render(&context)?, "Hello, World!");
//! # Ok::<(), liquidlab_core::LiquidlabError>(())
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod template;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{LiquidlabError, Result};
pub use template::{
    compile, render, FilterRegistry, Mode, Template, TemplateContext, TemplateEngine,
    TemplateError, Value,
};
