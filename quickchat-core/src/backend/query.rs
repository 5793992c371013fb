//! Ordered and filtered reads over the children of a node

use serde_json::Value;
use std::cmp::Ordering;

/// What children are sorted by
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Child key (the default). Push ids sort in append order.
    #[default]
    Key,
    /// Value of a named field inside each child; ties fall back to key order
    Child(String),
}

/// Query parameters for `read_once`, `subscribe` and `watch`
///
/// # Example
///
/// ```
/// use quickchat_core::backend::Query;
///
/// let latest = Query::new().order_by_child("timeStamp").limit_to_last(1);
/// assert_eq!(latest.limit, Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub order_by: OrderBy,
    pub equal_to: Option<Value>,
    pub limit: Option<usize>,
}

impl Query {
    /// Unfiltered query in key order
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by_child(mut self, field: impl Into<String>) -> Self {
        self.order_by = OrderBy::Child(field.into());
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by = OrderBy::Key;
        self
    }

    /// Keep only children whose ordering value equals `value`
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    /// Keep only the last `n` children in query order
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.order_by == OrderBy::Key && self.equal_to.is_none() && self.limit.is_none()
    }

    /// Apply this query to the children of a node
    ///
    /// Returns `(key, value)` pairs in query order.
    pub fn apply(&self, node: &Value) -> Vec<(String, Value)> {
        let Some(children) = node.as_object() else {
            return Vec::new();
        };

        let mut selected: Vec<(String, Value)> = children
            .iter()
            .filter(|(key, child)| match &self.equal_to {
                Some(expected) => self
                    .ordering_value(key, child)
                    .map_or(expected.is_null(), |v| v == *expected),
                None => true,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        selected.sort_by(|(ka, va), (kb, vb)| {
            compare_values(
                self.ordering_value(ka, va).as_ref(),
                self.ordering_value(kb, vb).as_ref(),
            )
            .then_with(|| ka.cmp(kb))
        });

        if let Some(limit) = self.limit {
            let skip = selected.len().saturating_sub(limit);
            selected.drain(..skip);
        }

        selected
    }

    fn ordering_value(&self, key: &str, child: &Value) -> Option<Value> {
        match &self.order_by {
            OrderBy::Key => Some(Value::String(key.to_string())),
            OrderBy::Child(field) => child.get(field).cloned(),
        }
    }
}

/// Sort order used by the hosted database for child values:
/// missing/null, false, true, numbers, strings, then objects.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(false)) => 1,
            Some(Value::Bool(true)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(result: &[(String, Value)]) -> Vec<&str> {
        result.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_key_order_default() {
        let node = json!({ "b": 1, "a": 2, "c": 3 });
        assert_eq!(keys(&Query::new().apply(&node)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_order_by_child_with_key_tiebreak() {
        let node = json!({
            "-m2": { "timeStamp": 200 },
            "-m1": { "timeStamp": 100 },
            "-m3": { "timeStamp": 200 },
        });
        let q = Query::new().order_by_child("timeStamp");
        assert_eq!(keys(&q.apply(&node)), vec!["-m1", "-m2", "-m3"]);

        let last = q.limit_to_last(1);
        assert_eq!(keys(&last.apply(&node)), vec!["-m3"]);
    }

    #[test]
    fn test_equal_to_filter() {
        let node = json!({
            "u1": { "phoneNumber": "+1" },
            "u2": { "phoneNumber": "+2" },
            "u3": { "name": "no phone" },
        });
        let q = Query::new().order_by_child("phoneNumber").equal_to("+2");
        assert_eq!(keys(&q.apply(&node)), vec!["u2"]);
    }

    #[test]
    fn test_missing_values_sort_first() {
        let node = json!({
            "x": { "n": 5 },
            "y": {},
            "z": { "n": "text" },
        });
        let q = Query::new().order_by_child("n");
        assert_eq!(keys(&q.apply(&node)), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_non_object_has_no_children() {
        assert!(Query::new().apply(&json!("leaf")).is_empty());
        assert!(Query::new().apply(&Value::Null).is_empty());
    }
}
