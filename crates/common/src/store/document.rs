//! Dot-delimited path access into a nested JSON document.
//!
//! `a.b.c` addresses `root["a"]["b"]["c"]`. Writes create (or overwrite with)
//! empty objects along the way; reads never create anything.

use serde_json::{Map, Number, Value};

/// The in-memory document held by a [`Store`](super::Store).
///
/// Every mutating call bumps a generation counter, which lets the store tell
/// whether a transaction actually changed anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Map<String, Value>,
    generation: u64,
}

impl From<Map<String, Value>> for Document {
    fn from(root: Map<String, Value>) -> Self {
        Self {
            root,
            generation: 0,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.root)
    }

    /// Number of mutations applied since this document was created.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Read the value at `path`.
    ///
    /// Decimal segments index into arrays (`logs.0`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get_mut(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at `path`, replacing absent or non-object intermediates
    /// with empty objects.
    pub fn set(&mut self, path: &str, value: Value) {
        let keys: Vec<&str> = path.split('.').collect();
        set_in(&mut self.root, &keys, value);
        self.touch();
    }

    /// Remove the value at `path`. Returns `false` if nothing was there.
    pub fn delete(&mut self, path: &str) -> bool {
        let keys: Vec<&str> = path.split('.').collect();
        let removed = delete_in(&mut self.root, &keys);
        if removed {
            self.touch();
        }
        removed
    }

    /// Add `amount` to the number at `path`. A missing or non-numeric value
    /// counts as zero.
    pub fn add(&mut self, path: &str, amount: f64) -> f64 {
        let current = self.get(path).and_then(Value::as_f64).unwrap_or(0.0);
        let next = current + amount;
        self.set(path, number_value(next));
        next
    }

    pub fn subtract(&mut self, path: &str, amount: f64) -> f64 {
        self.add(path, -amount)
    }

    /// Append `value` to the array at `path`, starting a new array if the
    /// current value is missing or not an array. Returns the whole array.
    pub fn push(&mut self, path: &str, value: Value) -> Vec<Value> {
        if let Some(Value::Array(items)) = self.get_mut(path) {
            items.push(value);
            let out = items.clone();
            self.touch();
            return out;
        }

        let items = vec![value];
        self.set(path, Value::Array(items.clone()));
        items
    }
}

fn set_in(map: &mut Map<String, Value>, keys: &[&str], value: Value) {
    match keys {
        [] => {}
        [last] => {
            map.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = entry {
                set_in(child, rest, value);
            } else {
                let mut child = Map::new();
                set_in(&mut child, rest, value);
                *entry = Value::Object(child);
            }
        }
    }
}

fn delete_in(map: &mut Map<String, Value>, keys: &[&str]) -> bool {
    match keys {
        [] => false,
        [last] => map.remove(*last).is_some(),
        [first, rest @ ..] => match map.get_mut(*first) {
            Some(Value::Object(child)) => delete_in(child, rest),
            _ => false,
        },
    }
}

/// Integral results stay JSON integers; NaN and infinities become `null`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creates_intermediates() {
        let mut doc = Document::new();
        doc.set("a.b.c", json!(5));

        assert_eq!(doc.get("a.b"), Some(&json!({"c": 5})));
        assert_eq!(doc.get("a.b.c"), Some(&json!(5)));
    }

    #[test]
    fn test_get_missing_creates_nothing() {
        let doc = Document::new();

        assert_eq!(doc.get("x.y.z"), None);
        assert!(doc.as_map().is_empty());
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut doc = Document::new();
        doc.set("a", json!(1));
        doc.set("a.b", json!("x"));

        assert_eq!(doc.get("a"), Some(&json!({"b": "x"})));
    }

    #[test]
    fn test_delete() {
        let mut doc = Document::new();
        doc.set("a.b.c", json!(5));

        assert!(doc.delete("a.b.c"));
        assert_eq!(doc.get("a.b.c"), None);
        assert!(!doc.delete("a.b.c"));
        assert!(!doc.delete("missing.path"));
        assert_eq!(doc.get("a.b"), Some(&json!({})));
    }

    #[test]
    fn test_has_null_value() {
        let mut doc = Document::new();
        doc.set("flag", Value::Null);

        assert!(doc.has("flag"));
        assert!(!doc.has("other"));
    }

    #[test]
    fn test_add_and_subtract() {
        let mut doc = Document::new();

        assert_eq!(doc.add("counters.hits", 1.0), 1.0);
        assert_eq!(doc.add("counters.hits", 2.0), 3.0);
        assert_eq!(doc.subtract("counters.hits", 1.0), 2.0);
        assert_eq!(doc.get("counters.hits"), Some(&json!(2)));

        doc.set("counters.name", json!("text"));
        assert_eq!(doc.add("counters.name", 4.0), 4.0);

        assert_eq!(doc.add("ratio", 0.5), 0.5);
        assert_eq!(doc.get("ratio"), Some(&json!(0.5)));
    }

    #[test]
    fn test_push() {
        let mut doc = Document::new();

        assert_eq!(doc.push("logs", json!(1)), vec![json!(1)]);
        assert_eq!(doc.push("logs", json!(2)), vec![json!(1), json!(2)]);
        assert_eq!(doc.get("logs.1"), Some(&json!(2)));

        doc.set("scalar", json!(3));
        assert_eq!(doc.push("scalar", json!("x")), vec![json!("x")]);
    }

    #[test]
    fn test_generation_tracks_mutations() {
        let mut doc = Document::new();
        let start = doc.generation();

        doc.get("a");
        doc.delete("a");
        assert_eq!(doc.generation(), start);

        doc.set("a", json!(1));
        doc.push("b", json!(1));
        assert_eq!(doc.generation(), start + 2);
    }

    #[test]
    fn test_dotted_namespace_keys() {
        let mut doc = Document::new();
        doc.set("throttle:ban:127.0.0.1", json!({"banned_until": 10}));

        assert_eq!(
            doc.get("throttle:ban:127.0.0.1.banned_until"),
            Some(&json!(10))
        );
        assert!(doc.has("throttle:ban:127"));
    }
}
