//! Template error types

use thiserror::Error;

/// Errors raised while compiling or rendering a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Malformed template syntax, raised at compile time
    #[error("Syntax error at line {line}: {message}\n    {text}")]
    Syntax {
        /// Error message
        message: String,
        /// Line number of the offending tag
        line: usize,
        /// Raw source of the offending tag
        text: String,
    },

    /// Fault raised while executing an instruction
    #[error("Render error at line {line}: {message}\n    {text}\n{context}")]
    Render {
        /// The fault message
        message: String,
        /// Line number of the offending instruction
        line: usize,
        /// Raw source of the offending instruction
        text: String,
        /// Listing of the instructions around the offending one
        context: String,
    },
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>, line: usize, text: impl Into<String>) -> Self {
        TemplateError::Syntax {
            message: message.into(),
            line,
            text: text.into(),
        }
    }

    /// Line number the error points at
    pub fn line(&self) -> usize {
        match self {
            TemplateError::Syntax { line, .. } | TemplateError::Render { line, .. } => *line,
        }
    }

    /// The bare error message, without provenance
    pub fn message(&self) -> &str {
        match self {
            TemplateError::Syntax { message, .. } | TemplateError::Render { message, .. } => {
                message
            }
        }
    }
}

/// Faults raised while evaluating an expression or a filter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("{type_name} has no attribute '{name}'")]
    NoAttribute {
        type_name: &'static str,
        name: String,
    },

    #[error("filter '{name}': {message}")]
    Filter { name: String, message: String },

    #[error("{what} would exceed the limit of {limit} elements")]
    TooLarge { what: &'static str, limit: usize },

    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
}

impl EvalError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type(message.into())
    }

    pub(crate) fn filter(name: &str, message: impl Into<String>) -> Self {
        EvalError::Filter {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
