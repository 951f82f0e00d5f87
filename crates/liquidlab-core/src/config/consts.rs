//! Engine-wide constants

/// Include resolution limits
pub mod include {
    /// Extension appended to include paths when none is configured
    pub const DEFAULT_EXTENSION: &str = "liquid";

    /// Maximum nesting of `{% include %}` tags
    pub const MAX_DEPTH: usize = 32;
}

/// Render error reporting
pub mod render {
    /// Instructions listed before the offending one in a render error
    pub const CONTEXT_BEFORE: usize = 3;

    /// Instructions listed after the offending one
    pub const CONTEXT_AFTER: usize = 1;

    /// Appended to undefined-name faults
    pub const MISSING_DATA_HINT: &str = "Do you forget to provide the data?";
}

/// Expression sub-language
pub mod expr {
    /// Parameter names given to `| :body` lambdas, one per piped value
    pub const LAMBDA_PARAMS: &str = "abcdefghijklmnopqrstuvwxyz";

    /// Largest range or repeated string an expression may build
    pub const MAX_SEQUENCE_LEN: usize = 1 << 24;
}
