use std::sync::Arc;

use crate::{
    error::{EvalResult, Error, LoadError, Result},
    interface::{Context, TemplateLoader, Value},
    registry::Registry,
    template::Template,
};

/// Nesting limit for include recursion and extends chains when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// The directive a template load was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    Extends,
    Include,
    Render,
}

impl Directive {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Extends => "extends",
            Self::Include => "include",
            Self::Render => "render",
        }
    }
}

/// `Engine` ties together the filters and tests available to templates, an optional
/// [`TemplateLoader`] for `extends`/`include`, and the nesting limit for both.
///
/// An engine is immutable while rendering and is `Send + Sync`, so a single engine can render
/// many templates concurrently.
///
/// # Examples
///
/// ```
/// use templet::{Context, Engine, MemoryLoader};
///
/// // Store templates in memory
/// let mut loader = MemoryLoader::new();
/// loader.add_template("base", "<h1>{% block title %}Untitled{% endblock %}</h1>").unwrap();
/// loader
///     .add_template("page", "{% extends \"base\" %}{% block title %}{{ title }}{% endblock %}")
///     .unwrap();
///
/// // Create an engine that reads from the loader
/// let engine = Engine::new().with_loader(loader);
///
/// // Setup context
/// let mut context = Context::new();
/// context.insert("title", "Home");
///
/// // Render template
/// let output = engine.render("page", &context).unwrap();
/// assert_eq!(output, "<h1>Home</h1>");
/// ```
#[derive(Clone)]
pub struct Engine {
    registry: Registry,
    loader: Option<Arc<dyn TemplateLoader>>,
    max_depth: usize,
}

impl Engine {
    /// Creates an engine with the builtin filters and tests and no loader.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            loader: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Use `loader` to resolve `extends`, `include` and [`Engine::render`] names.
    #[must_use]
    pub fn with_loader<L: TemplateLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Limit how deeply includes may nest and how long an extends chain may be.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Register a filter, replacing any filter (builtin or not) with the same name.
    ///
    /// # Examples
    ///
    /// ```
    /// use templet::{Context, Engine, Value};
    ///
    /// let engine = Engine::new().with_filter("double", |value, _args| {
    ///     Ok(Value::from(value.as_f64().unwrap_or_default() * 2.0))
    /// });
    ///
    /// let output = engine.render_str("{{ 21|double }}", &Context::new()).unwrap();
    /// assert_eq!(output, "42");
    /// ```
    #[must_use]
    pub fn with_filter<N, F>(mut self, name: N, filter: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value, &[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.registry.add_filter(name, filter);
        self
    }

    /// Register a test, replacing any test (builtin or not) with the same name.
    #[must_use]
    pub fn with_test<N, F>(mut self, name: N, test: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value, &[Value]) -> EvalResult<bool> + Send + Sync + 'static,
    {
        self.registry.add_test(name, test);
        self
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub const fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Parses and renders `source` in one step.
    ///
    /// # Arguments
    ///
    /// * `source` - The template text
    /// * `context` - Variables available to the template
    ///
    /// # Returns
    ///
    /// * `Ok(String)` containing the rendered output, including any inline diagnostics
    /// * `Err(Error::LoaderNotConfigured)` if the template uses `extends` or `include` and no
    ///   loader is configured
    /// * Other load and nesting errors raised by `extends` or `include`
    ///
    /// # Examples
    ///
    /// ```
    /// use templet::{Context, Engine};
    ///
    /// let engine = Engine::new();
    ///
    /// let mut context = Context::new();
    /// context.insert("items", vec![1, 2, 3]);
    ///
    /// let output = engine
    ///     .render_str("{% for i in items %}{{ i * 2 }} {% endfor %}", &context)
    ///     .unwrap();
    /// assert_eq!(output, "2 4 6 ");
    /// ```
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String> {
        Template::new(source).render(context, self)
    }

    /// Loads the template `name` through the configured loader and renders it.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` containing the rendered template content
    /// * `Err(Error::LoaderNotConfigured)` if no loader is configured
    /// * `Err(Error::TemplateLoad)` if the loader cannot produce `name`
    /// * Other errors raised by `extends` or `include` inside the template
    ///
    /// # Examples
    ///
    /// ```
    /// use templet::{Context, Engine, Error, MemoryLoader};
    ///
    /// let mut loader = MemoryLoader::new();
    /// loader.add_template("greeting", "Hello, {{ name }}!").unwrap();
    /// let engine = Engine::new().with_loader(loader);
    ///
    /// let mut context = Context::new();
    /// context.insert("name", "World");
    /// assert_eq!(engine.render("greeting", &context).unwrap(), "Hello, World!");
    ///
    /// assert!(matches!(
    ///     engine.render("missing", &context),
    ///     Err(Error::TemplateLoad { .. })
    /// ));
    /// ```
    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        let source = self.load(name, Directive::Render)?;
        Template::named(name, source).render(context, self)
    }

    /// Fetch template source from the loader, tagging failures with the directive that asked.
    pub(crate) fn load(&self, name: &str, directive: Directive) -> Result<String> {
        let loader = self
            .loader
            .as_deref()
            .ok_or(Error::LoaderNotConfigured {
                directive: directive.as_str(),
            })?;

        log::debug!("loading template `{name}` for {}", directive.as_str());
        loader.load(name).map_err(|source: LoadError| {
            let name = name.to_owned();
            match directive {
                Directive::Extends => Error::ParentLoad { name, source },
                Directive::Include => Error::IncludeLoad { name, source },
                Directive::Render => Error::TemplateLoad { name, source },
            }
        })
    }
}

impl Default for Engine {
    /// Creates a default `Engine` instance by calling `new()`.
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("loader", &self.loader.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
