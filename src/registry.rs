use crate::error::{NetFnError, Result};
use crate::function::Callable;
use std::collections::HashMap;

/// Key used when a registry is built from a single function.
pub const ANONYMOUS: &str = "anonymous";

/// Ordered name → function mapping exposed by one side of a connection.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: Vec<(String, Callable)>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, callable: Callable) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = callable,
            None => self.entries.push((name, callable)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Callable)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry built from a single function.
    pub fn is_anonymous(&self) -> bool {
        self.contains(ANONYMOUS)
    }

    /// Keep only `names`, in the order given. Every name must exist.
    pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> Result<FunctionRegistry> {
        let mut restricted = FunctionRegistry::new();
        for name in names {
            let name = name.as_ref();
            let callable = self
                .get(name)
                .ok_or_else(|| NetFnError::UndefinedFunction(name.to_string()))?;
            restricted.insert(name, callable.clone());
        }
        Ok(restricted)
    }
}

impl<K: Into<String>> FromIterator<(K, Callable)> for FunctionRegistry {
    fn from_iter<I: IntoIterator<Item = (K, Callable)>>(iter: I) -> Self {
        let mut registry = FunctionRegistry::new();
        for (name, callable) in iter {
            registry.insert(name, callable);
        }
        registry
    }
}

/// The shapes a caller may describe its functions in.
#[derive(Debug, Clone)]
pub enum RegistrySource {
    /// One function, exposed as [`ANONYMOUS`].
    Single(Callable),
    /// Functions keyed by their own names; unnamed ones are dropped.
    List(Vec<Callable>),
    /// Explicit names, used as-is.
    Map(Vec<(String, Callable)>),
}

impl From<Callable> for RegistrySource {
    fn from(callable: Callable) -> Self {
        RegistrySource::Single(callable)
    }
}

impl From<Vec<Callable>> for RegistrySource {
    fn from(callables: Vec<Callable>) -> Self {
        RegistrySource::List(callables)
    }
}

impl From<Vec<(String, Callable)>> for RegistrySource {
    fn from(entries: Vec<(String, Callable)>) -> Self {
        RegistrySource::Map(entries)
    }
}

impl From<HashMap<String, Callable>> for RegistrySource {
    fn from(map: HashMap<String, Callable>) -> Self {
        RegistrySource::Map(map.into_iter().collect())
    }
}

impl From<FunctionRegistry> for RegistrySource {
    fn from(registry: FunctionRegistry) -> Self {
        RegistrySource::Map(registry.entries)
    }
}

/// Build the canonical registry for `source`.
pub fn normalize(source: impl Into<RegistrySource>) -> FunctionRegistry {
    match source.into() {
        RegistrySource::Single(callable) => {
            let mut registry = FunctionRegistry::new();
            registry.insert(ANONYMOUS, callable);
            registry
        }
        RegistrySource::List(callables) => callables
            .into_iter()
            .filter_map(|c| {
                let name = c.name()?.to_string();
                Some((name, c))
            })
            .collect(),
        RegistrySource::Map(entries) => entries.into_iter().collect(),
    }
}
