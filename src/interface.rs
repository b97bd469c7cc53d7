use std::{collections::BTreeMap, fmt};

use crate::{
    error::{EvalError, EvalResult, LoadError},
    pipeline::split_unquoted,
};

/// Nested mapping type used inside [`Value::Map`]. Iteration is in key order.
pub type Map = BTreeMap<String, Value>;

/// A dynamically typed value flowing through a render.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(Map),
    /// Pre-escaped text, written to the output verbatim. Produced by the `raw` filter.
    Raw(String),
    /// Result of a failed path lookup, only observable through the `defined` and
    /// `undefined` tests.
    Undefined,
}

impl Value {
    /// Template truthiness: `false`, `0`, `0.0`, `""`, null and undefined are falsy,
    /// everything else (including empty collections) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) | Self::Raw(s) => !s.is_empty(),
            Self::Null | Self::Undefined => false,
            Self::Seq(_) | Self::Map(_) => true,
        }
    }

    /// Numeric view of the value. Strings count as numbers when they parse as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.parse().ok(),
            Self::Null
            | Self::Bool(_)
            | Self::Seq(_)
            | Self::Map(_)
            | Self::Raw(_)
            | Self::Undefined => None,
        }
    }

    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_iterable(&self) -> bool {
        matches!(self, Self::Seq(_) | Self::Map(_) | Self::String(_))
    }

    /// Borrow the elements of a sequence.
    pub fn as_seq(&self) -> Option<&[Self]> {
        match self {
            Self::Seq(items) => Some(items),
            Self::Null
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::String(_)
            | Self::Map(_)
            | Self::Raw(_)
            | Self::Undefined => None,
        }
    }
}

/// Output text of a value as it appears in a rendered template.
///
/// Floats use the shortest representation without trailing zeros (`7.5`, `2`), `true` renders
/// as `1` and `false`, null and undefined render as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::Undefined | Self::Bool(false) => Ok(()),
            Self::Bool(true) => f.write_str("1"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) | Self::Raw(s) => f.write_str(s),
            Self::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Self::Map(value)
    }
}

impl From<Context> for Value {
    fn from(value: Context) -> Self {
        Self::Map(value.data)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Seq(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Self>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The data a template is rendered against.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    data: Map,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Into<String>, V: Into<Value>>(&mut self, name: T, value: V) -> &mut Self {
        self.data.insert(name.into(), value.into());
        self
    }

    pub fn get<T: AsRef<str>>(&self, name: T) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<T: AsRef<str>>(&self, name: T) -> bool {
        self.data.contains_key(name.as_ref())
    }

    /// Resolve a dotted path such as `user.address.city` against the context.
    ///
    /// Each segment indexes into a mapping by key, or into a sequence when the segment is a
    /// non-negative integer.
    ///
    /// # Errors
    /// Returns [`EvalError::PathNotFound`] naming the first segment that could not be
    /// resolved.
    ///
    /// # Example
    /// ```
    /// use templet::{Context, Value};
    ///
    /// let mut context = Context::new();
    /// context.insert(
    ///     "user",
    ///     [("name", Value::from("Ada"))].into_iter().collect::<Value>(),
    /// );
    ///
    /// assert_eq!(context.resolve("user.name").unwrap(), Value::from("Ada"));
    /// assert!(context.resolve("user.email").is_err());
    /// ```
    pub fn resolve(&self, path: &str) -> EvalResult<Value> {
        let mut segments = split_unquoted(path, '.', None).into_iter();
        let first = segments.next().unwrap_or_default();
        let mut current = self
            .data
            .get(first)
            .ok_or_else(|| EvalError::PathNotFound(first.to_owned()))?;

        for segment in segments {
            let next = match current {
                Value::Map(map) => map.get(segment),
                Value::Seq(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::String(_)
                | Value::Raw(_)
                | Value::Undefined => None,
            };
            current = next.ok_or_else(|| EvalError::PathNotFound(segment.to_owned()))?;
        }

        Ok(current.clone())
    }

    /// Iterate over top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<Map> for Context {
    fn from(data: Map) -> Self {
        Self { data }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Resolves template names to template source for `extends`, `include` and named renders.
///
/// Any `Fn(&str) -> Result<String, LoadError>` closure is a loader:
///
/// ```
/// use templet::{Context, Engine, LoadError};
///
/// let engine = Engine::new().with_loader(|name: &str| match name {
///     "greeting" => Ok("Hello {{ name }}!".to_owned()),
///     _ => Err(LoadError::NotFound { name: name.to_owned() }),
/// });
///
/// let mut context = Context::new();
/// context.insert("name", "World");
/// assert_eq!(
///     engine.render_str(r#"{% include "greeting" %}"#, &context).unwrap(),
///     "Hello World!"
/// );
/// ```
pub trait TemplateLoader: Send + Sync {
    /// # Errors
    /// Returns a [`LoadError`] when the template cannot be produced.
    fn load(&self, name: &str) -> Result<String, LoadError>;
}

impl<F> TemplateLoader for F
where
    F: Fn(&str) -> Result<String, LoadError> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self(name)
    }
}
