//! Binding environments.
//!
//! A [`Bindings`] map is created fresh for every macro invocation and dropped when the
//! invocation returns, so a macro's parameters can never leak into its caller or callee.
//! Global `let` constants live in a separate map consulted only after the local one.

use im::HashMap;

use crate::value::Value;

/// Name → value map backed by a persistent hash map, so cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Binds `name`, returning the value it shadowed in this environment.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        names
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.bind(name, value);
        }
        bindings
    }
}

/// Default bound on nested macro invocations.
pub const DEFAULT_MAX_DEPTH: usize = 256;
