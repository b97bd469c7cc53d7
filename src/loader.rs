use std::collections::HashMap;

use crate::{
    error::{Error, LoadError, Result},
    interface::TemplateLoader,
};

/// A [`TemplateLoader`] backed by an in-memory map of template names to sources.
///
/// # Examples
///
/// ```
/// use templet::{MemoryLoader, TemplateLoader};
///
/// let mut loader = MemoryLoader::new();
/// loader.add_template("nav", "<nav>{{ title }}</nav>").unwrap();
///
/// assert_eq!(loader.load("nav").unwrap(), "<nav>{{ title }}</nav>");
/// assert!(loader.add_template("nav", "again").is_err());
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateExists`] if a template with the given name already exists.
    pub fn add_template<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) -> Result<()> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(Error::TemplateExists { name });
        }
        self.templates.insert(name, source.into());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                name: name.to_owned(),
            })
    }
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(name, source)| (name.into(), source.into()))
                .collect(),
        }
    }
}
