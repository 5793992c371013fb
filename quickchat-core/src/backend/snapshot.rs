//! Immutable views of database content

use super::error::BackendResult;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Data read from one location, as of one point in time
///
/// A snapshot produced by a query remembers the query order of its children;
/// otherwise children are visited in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    key: Option<String>,
    value: Value,
    order: Option<Vec<String>>,
}

impl DataSnapshot {
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self {
            key,
            value,
            order: None,
        }
    }

    /// Build a snapshot whose children keep the given order
    pub fn from_ordered(key: Option<String>, children: Vec<(String, Value)>) -> Self {
        let order = children.iter().map(|(k, _)| k.clone()).collect();
        let value = if children.is_empty() {
            Value::Null
        } else {
            Value::Object(children.into_iter().collect::<Map<_, _>>())
        };
        Self {
            key,
            value,
            order: Some(order),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    pub fn children_count(&self) -> usize {
        self.value.as_object().map_or(0, Map::len)
    }

    /// Children in query order (or key order)
    pub fn children(&self) -> Vec<DataSnapshot> {
        let Some(map) = self.value.as_object() else {
            return Vec::new();
        };
        match &self.order {
            Some(order) => order
                .iter()
                .filter_map(|k| map.get(k).map(|v| DataSnapshot::new(Some(k.clone()), v.clone())))
                .collect(),
            None => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| DataSnapshot::new(Some(k.clone()), map[k.as_str()].clone()))
                    .collect()
            }
        }
    }

    /// Snapshot of a direct child field; absent fields yield a non-existent snapshot
    pub fn child(&self, key: &str) -> DataSnapshot {
        let value = self.value.get(key).cloned().unwrap_or(Value::Null);
        DataSnapshot::new(Some(key.to_string()), value)
    }

    /// String value of a child field, if it is a string
    pub fn child_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Decode this snapshot's value, `None` when nothing is stored
    pub fn get<T: DeserializeOwned>(&self) -> BackendResult<Option<T>> {
        if !self.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(self.value.clone())?))
    }
}
