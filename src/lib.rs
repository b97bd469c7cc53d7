mod ast;
mod builtins;
mod engine;
mod error;
mod expression;
mod inheritance;
mod interface;
mod loader;
mod parser;
mod pipeline;
mod registry;
mod template;

// Public exports.
pub use engine::{DEFAULT_MAX_DEPTH, Engine};
pub use error::{Error, EvalError, EvalResult, LoadError, Result};
pub use expression::{Associativity, Expression, OPERATORS, Operator, OperatorKind};
pub use interface::{Context, Map, TemplateLoader, Value};
pub use loader::MemoryLoader;
pub use registry::{Filter, Registry, Test};
pub use template::Template;
