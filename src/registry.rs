use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    Context, Value,
    error::{EvalError, EvalResult},
    pipeline::{Call, CallKind},
};

/// A filter receives the piped value followed by its evaluated arguments.
pub type Filter = dyn Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync;

/// A test receives the tested value followed by its evaluated arguments.
pub type Test = dyn Fn(&Value, &[Value]) -> EvalResult<bool> + Send + Sync;

/// Named filters and tests available to templates.
///
/// The registry is read-only while rendering, so one registry can serve concurrent renders.
///
/// # Example
/// ```
/// use templet::{Registry, Value};
///
/// let mut registry = Registry::new();
/// registry.add_filter("shout", |value, _args| {
///     Ok(Value::from(format!("{}!", value.to_string().to_uppercase())))
/// });
///
/// assert!(registry.filter("shout").is_some());
/// assert!(registry.test("defined").is_some());
/// ```
#[derive(Clone)]
pub struct Registry {
    filters: HashMap<String, Arc<Filter>>,
    tests: HashMap<String, Arc<Test>>,
}

impl Registry {
    /// A registry with the builtin filters and tests.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        crate::builtins::register(&mut registry);
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
            tests: HashMap::new(),
        }
    }

    /// Register a filter, replacing any filter with the same name.
    pub fn add_filter<N, F>(&mut self, name: N, filter: F) -> &mut Self
    where
        N: Into<String>,
        F: Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Register a test, replacing any test with the same name.
    pub fn add_test<N, F>(&mut self, name: N, test: F) -> &mut Self
    where
        N: Into<String>,
        F: Fn(&Value, &[Value]) -> EvalResult<bool> + Send + Sync + 'static,
    {
        self.tests.insert(name.into(), Arc::new(test));
        self
    }

    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name).map(|filter| &**filter)
    }

    pub fn test(&self, name: &str) -> Option<&Test> {
        self.tests.get(name).map(|test| &**test)
    }

    /// Apply one pipeline step to `value`.
    pub(crate) fn apply(&self, call: &Call<'_>, value: &Value, context: &Context) -> EvalResult<Value> {
        match call.kind {
            CallKind::Filter => {
                let filter = self
                    .filter(call.name)
                    .ok_or_else(|| EvalError::FilterNotFound(call.name.to_owned()))?;
                filter(value, &call.arguments(context)?)
            }
            CallKind::Test { negated } => {
                let test = self
                    .test(call.name)
                    .ok_or_else(|| EvalError::TestNotFound(call.name.to_owned()))?;
                let passed = test(value, &call.arguments(context)?)?;
                Ok(Value::Bool(passed != negated))
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        let mut tests: Vec<_> = self.tests.keys().collect();
        filters.sort();
        tests.sort();
        f.debug_struct("Registry")
            .field("filters", &filters)
            .field("tests", &tests)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    #[test]
    #[ntest::timeout(100)]
    fn test_custom_filter_replaces_builtin() {
        let mut registry = Registry::new();
        registry.add_filter("upper", |_, _| Ok(Value::from("custom")));

        let pipeline = Pipeline::parse("x|upper");
        let value = registry
            .apply(&pipeline.calls[0], &Value::from("a"), &Context::new())
            .unwrap();
        assert_eq!(value, Value::from("custom"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_names() {
        let registry = Registry::empty();
        let context = Context::new();

        let pipeline = Pipeline::parse("x|nope is missing");
        assert_eq!(
            registry.apply(&pipeline.calls[0], &Value::Null, &context),
            Err(EvalError::FilterNotFound("nope".into()))
        );
        assert_eq!(
            registry.apply(&pipeline.calls[1], &Value::Null, &context),
            Err(EvalError::TestNotFound("missing".into()))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_negated_test() {
        let registry = Registry::new();
        let pipeline = Pipeline::parse("x is not even");
        assert_eq!(
            registry.apply(&pipeline.calls[0], &Value::Int(3), &Context::new()),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_arguments_resolve_from_context() {
        let mut registry = Registry::empty();
        registry.add_filter("append", |value, args| {
            Ok(Value::from(format!("{value}{}", args[0])))
        });

        let mut context = Context::new();
        context.insert("suffix", "!");

        let pipeline = Pipeline::parse("x|append(suffix)");
        assert_eq!(
            registry.apply(&pipeline.calls[0], &Value::from("hi"), &context),
            Ok(Value::from("hi!"))
        );
    }
}
