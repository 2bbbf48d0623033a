//! Request type registry.
//!
//! Maps a type key (e.g. `"move"`) to a factory closure and an optional
//! argument adapter so requests can be created generically from data.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use super::error::RequestResult;
use super::request::Request;

/// A single request argument.
///
/// Deserializes from plain TOML/JSON scalars, so scripted sessions can write
/// `args = [5, 5]` or `args = ["Wall A"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ArgValue {
    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Ordered request arguments.
pub type RequestArgs = Vec<ArgValue>;

/// Builds a request from its (adapted) arguments.
pub type RequestFactory = Box<dyn Fn(RequestArgs) -> RequestResult<Box<dyn Request>> + Send + Sync>;

/// Rewrites arguments before they reach the factory.
pub type ArgAdapter = Box<dyn Fn(RequestArgs) -> RequestArgs + Send + Sync>;

/// A registered request type.
pub struct RequestTypeEntry {
    type_key: String,
    factory: RequestFactory,
    adapter: Option<ArgAdapter>,
}

impl RequestTypeEntry {
    pub fn new<F>(type_key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(RequestArgs) -> RequestResult<Box<dyn Request>> + Send + Sync + 'static,
    {
        Self {
            type_key: type_key.into(),
            factory: Box::new(factory),
            adapter: None,
        }
    }

    /// Attaches an argument adapter applied before every instantiation.
    pub fn with_adapter<A>(mut self, adapter: A) -> Self
    where
        A: Fn(RequestArgs) -> RequestArgs + Send + Sync + 'static,
    {
        self.adapter = Some(Box::new(adapter));
        self
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    /// Adapts `args` and runs the factory.
    pub fn instantiate(&self, args: RequestArgs) -> RequestResult<Box<dyn Request>> {
        let args = match &self.adapter {
            Some(adapter) => adapter(args),
            None => args,
        };
        (self.factory)(args)
    }
}

impl fmt::Debug for RequestTypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTypeEntry")
            .field("type_key", &self.type_key)
            .field("has_adapter", &self.adapter.is_some())
            .finish()
    }
}

/// Type key → factory lookup table.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: HashMap<String, RequestTypeEntry>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry`, replacing any entry with the same key.
    pub fn register(&mut self, entry: RequestTypeEntry) {
        if self.entries.contains_key(entry.type_key()) {
            log::debug!(
                target: "transaction",
                "Request type \"{}\" re-registered",
                entry.type_key()
            );
        }
        self.entries.insert(entry.type_key.clone(), entry);
    }

    pub fn get(&self, type_key: &str) -> Option<&RequestTypeEntry> {
        self.entries.get(type_key)
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.entries.contains_key(type_key)
    }

    /// Registered type keys, sorted.
    pub fn type_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
