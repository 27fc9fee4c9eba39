use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Request-scoped scratchpad written by handlers and read back through the
/// `http.vars.*` placeholder namespace and the vars regexp matcher.
///
/// Cloning is shallow; every clone sees the same underlying map for the
/// lifetime of the request.
#[derive(Clone, Debug, Default)]
pub struct VarsStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl VarsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().unwrap().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Fetch a var rendered as a string, the form placeholders and regexp
    /// matchers consume.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| value_to_string(&value))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

/// Strings render bare; everything else renders as JSON.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
