use std::sync::LazyLock;

use regex::Regex;

use crate::{
    Context, Engine, Expression, Value,
    ast::{Node, build},
    engine::Directive,
    error::{Error, EvalError, EvalResult, Result},
    inheritance::{Blocks, collect_blocks, extends_target, template_name},
    parser::tokenize,
    pipeline::Pipeline,
};

/// `item in items` or `key, value in items`.
static FOR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^([a-zA-Z_][a-zA-Z0-9_]*(?:\s*,\s*[a-zA-Z_][a-zA-Z0-9_]*)?)\s+in\s+(.+)$",
    )
    .expect("for-loop header pattern is valid")
});

/// A parsed template that can be rendered any number of times.
///
/// Parsing never fails: malformed tags surface as inline diagnostics when the template is
/// rendered. A `Template` holds no per-render state and can be shared between threads.
///
/// # Example
///
/// ```rust
/// use templet::{Context, Engine, Template};
///
/// // Create a new template
/// let template = Template::new("Hello, {{ name }}!");
///
/// // Create a context with variables
/// let mut context = Context::new();
/// context.insert("name", "World");
///
/// // Render the template
/// let result = template.render(&context, &Engine::new()).unwrap();
/// assert_eq!(result, "Hello, World!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Template {
    source: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    nodes: Vec<Node>,
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct TemplateHelper {
            source: String,
            #[serde(default)]
            name: Option<String>,
        }

        let helper = TemplateHelper::deserialize(deserializer)?;
        let mut template = Self::new(helper.source);
        template.name = helper.name;
        Ok(template)
    }
}

impl Template {
    /// Parse `source` into a template.
    pub fn new<T: Into<String>>(source: T) -> Self {
        let source = source.into();
        let nodes = build(tokenize(&source));
        Self {
            source,
            name: None,
            nodes,
        }
    }

    /// Parse a template that was loaded under `name`.
    pub fn named<N: Into<String>, T: Into<String>>(name: N, source: T) -> Self {
        let mut template = Self::new(source);
        template.name = Some(name.into());
        template
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name of the parent template, if this template starts with `{% extends %}`.
    pub fn parent(&self) -> Option<&str> {
        extends_target(&self.nodes)
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Render the template against `context`, using `engine` for filters, tests and loading
    /// `extends`/`include` targets.
    ///
    /// # Errors
    ///
    /// Expression problems never fail a render; they are written into the output as
    /// diagnostics. An error is returned only when a referenced template cannot be loaded:
    /// - [`Error::LoaderNotConfigured`] if the engine has no loader.
    /// - [`Error::ParentLoad`] / [`Error::IncludeLoad`] if the loader fails.
    /// - [`Error::DepthExceeded`] if includes or extends nest deeper than the engine allows.
    pub fn render(&self, context: &Context, engine: &Engine) -> Result<String> {
        let mut output = String::with_capacity(self.source.len());
        Renderer::new(engine).render_template(self, context, &mut output)?;
        Ok(output)
    }
}

/// Write `text` to `output`, escaping HTML special characters.
pub(crate) fn escape_html(output: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '\'' => output.push_str("&#39;"),
            '"' => output.push_str("&#34;"),
            _ => output.push(c),
        }
    }
}

/// Write an escaped diagnostic in place of a failed tag.
fn diagnostic(output: &mut String, tag: &str) {
    log::debug!("rendering inline diagnostic {tag}");
    escape_html(output, tag);
}

fn control_diagnostic(output: &mut String, keyword: &str, expression: &str, error: &EvalError) {
    diagnostic(output, &format!("{{% {keyword} {expression}!!{error} %}}"));
}

/// State for one render call.
struct Renderer<'e> {
    engine: &'e Engine,
    /// Number of nested includes.
    depth: usize,
    /// Blocks currently being rendered from an override, so a block never substitutes itself.
    active_blocks: Vec<String>,
}

impl<'e> Renderer<'e> {
    const fn new(engine: &'e Engine) -> Self {
        Renderer {
            engine,
            depth: 0,
            active_blocks: Vec::new(),
        }
    }

    fn render_template(
        &mut self,
        template: &Template,
        context: &Context,
        output: &mut String,
    ) -> Result<()> {
        match template.parent() {
            Some(parent) => self.render_extends(template, parent, context, output),
            None => self.render_nodes(template.nodes(), context, &Blocks::new(), output),
        }
    }

    /// Render the root of the inheritance chain, substituting the most derived definition of
    /// every block.
    fn render_extends(
        &mut self,
        child: &Template,
        parent: &str,
        context: &Context,
        output: &mut String,
    ) -> Result<()> {
        let limit = self.engine.max_depth();
        let mut ancestors: Vec<Template> = Vec::new();
        let mut next = Some(parent.to_owned());

        while let Some(name) = next {
            if ancestors.len() >= limit {
                return Err(Error::DepthExceeded { name, limit });
            }
            let source = self.engine.load(&name, Directive::Extends)?;
            let template = Template::named(name, source);
            next = template.parent().map(ToOwned::to_owned);
            ancestors.push(template);
        }

        let Some((base, intermediate)) = ancestors.split_last() else {
            return Ok(());
        };

        // Blocks the base defines itself are not overrides; each renders its own body.
        let mut blocks = Blocks::new();
        collect_blocks(child.nodes(), &mut blocks);
        for ancestor in intermediate {
            collect_blocks(ancestor.nodes(), &mut blocks);
        }

        self.render_nodes(base.nodes(), context, &blocks, output)
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        context: &Context,
        blocks: &Blocks<'_>,
        output: &mut String,
    ) -> Result<()> {
        // Whether a branch of the current if/elseif/else chain has been taken; `None` outside
        // a chain.
        let mut chain: Option<bool> = None;

        for node in nodes {
            match node {
                Node::Literal(text) => {
                    output.push_str(text);
                    chain = None;
                }
                Node::Variable(expression) => {
                    self.render_variable(expression, context, output);
                    chain = None;
                }
                Node::If { condition, body } => {
                    let taken = self.condition("if", condition, context, output);
                    if taken {
                        self.render_nodes(body, context, blocks, output)?;
                    }
                    chain = Some(taken);
                }
                Node::ElseIf { condition, body } => match chain {
                    None => control_diagnostic(
                        output,
                        "elseif",
                        condition,
                        &EvalError::UnmatchedBranch,
                    ),
                    Some(true) => {}
                    Some(false) => {
                        let taken = self.condition("elseif", condition, context, output);
                        if taken {
                            self.render_nodes(body, context, blocks, output)?;
                        }
                        chain = Some(taken);
                    }
                },
                Node::Else { body } => {
                    match chain {
                        None => control_diagnostic(output, "else", "", &EvalError::UnmatchedBranch),
                        Some(false) => self.render_nodes(body, context, blocks, output)?,
                        Some(true) => {}
                    }
                    chain = None;
                }
                Node::For { header, body } => {
                    self.render_for(header, body, context, blocks, output)?;
                    chain = None;
                }
                Node::Block { name, body } => {
                    self.render_block(name, body, context, blocks, output)?;
                    chain = None;
                }
                Node::Include { target } => {
                    self.render_include(target, context, output)?;
                    chain = None;
                }
                // Only meaningful as the first node of a template.
                Node::Extends { .. } => chain = None,
            }
        }

        Ok(())
    }

    /// Evaluate a tag expression with its filters and tests.
    fn evaluate(&self, source: &str, context: &Context) -> EvalResult<Value> {
        let pipeline = Pipeline::parse(source);
        let value = match Expression::parse(pipeline.expression).evaluate_in(context) {
            Err(EvalError::PathNotFound(_)) if pipeline.tests_definedness() => Value::Undefined,
            result => result?,
        };

        let registry = self.engine.registry();
        pipeline
            .calls
            .iter()
            .try_fold(value, |value, call| registry.apply(call, &value, context))
    }

    fn render_variable(&self, expression: &str, context: &Context, output: &mut String) {
        match self.evaluate(expression, context) {
            Ok(Value::Raw(text)) => output.push_str(&text),
            Ok(value) => escape_html(output, &value.to_string()),
            Err(error) => diagnostic(output, &format!("{{{{{expression}!!{error}}}}}")),
        }
    }

    /// Evaluate an `if`/`elseif` condition; a failed evaluation counts as false.
    fn condition(
        &self,
        keyword: &str,
        expression: &str,
        context: &Context,
        output: &mut String,
    ) -> bool {
        match self.evaluate(expression, context) {
            Ok(value) => value.is_truthy(),
            Err(error) => {
                control_diagnostic(output, keyword, expression, &error);
                false
            }
        }
    }

    fn render_for(
        &mut self,
        header: &str,
        body: &[Node],
        context: &Context,
        blocks: &Blocks<'_>,
        output: &mut String,
    ) -> Result<()> {
        let parsed = FOR_HEADER.captures(header).and_then(|captures| {
            Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
        });
        let Some((variables, source)) = parsed else {
            control_diagnostic(output, "for", header, &EvalError::InvalidForSyntax);
            return Ok(());
        };

        let (first, second) = match variables.split_once(',') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (variables.trim(), None),
        };

        let iterable = match self.evaluate(source.trim(), context) {
            Ok(value) => value,
            Err(error) => {
                control_diagnostic(output, "for", header, &error);
                return Ok(());
            }
        };

        match iterable {
            Value::Seq(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    let mut scope = context.clone();
                    match second {
                        Some(value_name) => {
                            scope
                                .insert(first, i64::try_from(index).unwrap_or(i64::MAX))
                                .insert(value_name, item);
                        }
                        None => {
                            scope.insert(first, item);
                        }
                    }
                    self.render_nodes(body, &scope, blocks, output)?;
                }
            }
            Value::Map(map) => {
                for (key, item) in map {
                    let mut scope = context.clone();
                    match second {
                        Some(value_name) => {
                            scope.insert(first, key).insert(value_name, item);
                        }
                        None => {
                            scope.insert(first, item);
                        }
                    }
                    self.render_nodes(body, &scope, blocks, output)?;
                }
            }
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::Raw(_)
            | Value::Undefined => {
                control_diagnostic(output, "for", header, &EvalError::NotIterable);
            }
        }

        Ok(())
    }

    fn render_block(
        &mut self,
        name: &str,
        default: &[Node],
        context: &Context,
        blocks: &Blocks<'_>,
        output: &mut String,
    ) -> Result<()> {
        let body = match blocks.get(name) {
            Some(body) if !self.active_blocks.iter().any(|active| active == name) => *body,
            _ => default,
        };

        self.active_blocks.push(name.to_owned());
        let result = self.render_nodes(body, context, blocks, output);
        self.active_blocks.pop();
        result
    }

    fn render_include(&mut self, target: &str, context: &Context, output: &mut String) -> Result<()> {
        let name = template_name(target);
        let limit = self.engine.max_depth();
        if self.depth >= limit {
            return Err(Error::DepthExceeded {
                name: name.to_owned(),
                limit,
            });
        }

        let source = self.engine.load(name, Directive::Include)?;
        let template = Template::named(name, source);

        self.depth = self.depth.saturating_add(1);
        let active_blocks = std::mem::take(&mut self.active_blocks);
        let result = self.render_template(&template, context, output);
        self.active_blocks = active_blocks;
        self.depth = self.depth.saturating_sub(1);
        result
    }
}
