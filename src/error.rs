pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Recoverable failures raised while evaluating a single tag.
///
/// These never abort a render: the renderer catches them at the tag that caused them and
/// writes an escaped diagnostic such as `{{a / 0!!division by zero}}` in place of the tag's
/// output.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum EvalError {
    #[error("path `{0}` not found")]
    PathNotFound(String),
    #[error("filter `{0}` not found")]
    FilterNotFound(String),
    #[error("test `{0}` not found")]
    TestNotFound(String),
    #[error("not enough operands for '{0}'")]
    NotEnoughOperands(String),
    #[error("malformed expression")]
    MalformedExpression,
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("expression must evaluate to an array")]
    NotIterable,
    #[error(r#"invalid syntax, expected "item in array" or "key, value in array""#)]
    InvalidForSyntax,
    #[error("could not find matching `if`")]
    UnmatchedBranch,
    /// Raised by user supplied filters and tests.
    #[error("{0}")]
    Custom(String),
}

impl EvalError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Failure reported by a [`TemplateLoader`](crate::TemplateLoader).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("template `{name}` not found")]
    NotFound { name: String },
    #[error("{0}")]
    Other(String),
}

/// Structural failures that abort a render and are returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("template loader not configured for {directive} directive")]
    LoaderNotConfigured { directive: &'static str },
    #[error("failed to load parent template '{name}': {source}")]
    ParentLoad { name: String, source: LoadError },
    #[error("failed to load included template '{name}': {source}")]
    IncludeLoad { name: String, source: LoadError },
    #[error("failed to load template '{name}': {source}")]
    TemplateLoad { name: String, source: LoadError },
    #[error("template '{name}' exceeds the nesting limit of {limit}")]
    DepthExceeded { name: String, limit: usize },
    #[error("template '{name}' already exists")]
    TemplateExists { name: String },
}
