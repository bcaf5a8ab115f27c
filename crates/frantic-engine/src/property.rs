//! Hierarchical property store
//!
//! A [`PropertyScope`] is a key/value namespace with an optional parent.
//! Lookups fall through to the parent chain, writes stay local and removal
//! targets whichever scope in the chain actually holds the key.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// A property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Borrow the text if this is a textual value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A chained property namespace
///
/// Cloning a scope yields another handle to the same namespace. A child keeps
/// its parent alive; the parent may outlive the child.
#[derive(Clone, Default)]
pub struct PropertyScope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    values: RefCell<HashMap<String, PropertyValue>>,
    parent: Option<PropertyScope>,
}

impl PropertyScope {
    /// Create a root scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope delegating misses to `parent`
    pub fn with_parent(parent: PropertyScope) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                values: RefCell::new(HashMap::new()),
                parent: Some(parent),
            }),
        }
    }

    /// Create a child of this scope
    pub fn child(&self) -> Self {
        Self::with_parent(self.clone())
    }

    pub fn parent(&self) -> Option<&PropertyScope> {
        self.inner.parent.as_ref()
    }

    /// Look a name up here, then along the parent chain
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        if let Some(value) = self.inner.values.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent().and_then(|parent| parent.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.values.borrow().contains_key(name)
            || self.parent().is_some_and(|parent| parent.contains(name))
    }

    /// Store a value in this scope, shadowing any ancestor value
    pub fn set(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.inner
            .values
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Remove a name from the nearest scope that holds it
    pub fn remove(&self, name: &str) -> Option<PropertyValue> {
        let removed = self.inner.values.borrow_mut().remove(name);
        match removed {
            Some(value) => Some(value),
            None => self.parent().and_then(|parent| parent.remove(name)),
        }
    }

    /// All visible names, sorted and deduplicated
    pub fn names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names.into_iter().collect()
    }

    fn collect_names(&self, names: &mut BTreeSet<String>) {
        names.extend(self.inner.values.borrow().keys().cloned());
        if let Some(parent) = self.parent() {
            parent.collect_names(names);
        }
    }

    /// Names stored directly in this scope, sorted
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.values.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of locally stored values
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }

    /// Number of ancestors above this scope
    pub fn depth(&self) -> usize {
        self.parent().map_or(0, |parent| parent.depth() + 1)
    }

    /// Whether both handles refer to the same namespace
    pub fn ptr_eq(&self, other: &PropertyScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V> FromIterator<(K, V)> for PropertyScope
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let scope = PropertyScope::new();
        for (name, value) in iter {
            scope.set(name, value);
        }
        scope
    }
}

impl fmt::Debug for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyScope")
            .field("values", &self.inner.values.borrow())
            .field("depth", &self.depth())
            .finish()
    }
}
