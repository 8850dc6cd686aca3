use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Per-section pin: `true` means a human supplied the value (Manual) and
/// derivation must leave it alone until cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(BTreeMap<String, bool>);

impl Overrides {
    pub fn is_manual(&self, section: &str) -> bool {
        self.0.get(section).copied().unwrap_or(false)
    }

    pub fn set(&mut self, section: &str, manual: bool) {
        self.0.insert(section.to_string(), manual);
    }

    pub fn manual_sections(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, m)| **m).map(|(k, _)| k.as_str())
    }
}

/// Root aggregate of one page: its sections plus the override flags.
///
/// Serialized flat (`{<sections>..., "overrides": {...}}`), which is the
/// shape of cache snapshots, static seed files and the write-back body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageState<S> {
    #[serde(flatten)]
    pub sections: S,
    #[serde(default)]
    pub overrides: Overrides,
}

impl<S: Serialize> PageState<S> {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// sha256 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.to_value())
    }
}

pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Sections serialized as a JSON object (empty map if serialization fails).
pub fn sections_map<S: Serialize>(sections: &S) -> Map<String, Value> {
    match serde_json::to_value(sections) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// True when a value carries no information: null, blank text, empty
/// containers, or an object whose members are all empty or zero.
pub fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.values().all(is_blank_member),
        Value::Number(_) | Value::Bool(_) => false,
    }
}

fn is_blank_member(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.as_f64().map(|x| x == 0.0).unwrap_or(true),
        Value::Bool(b) => !b,
        other => is_empty_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Demo {
        #[serde(default)]
        items: Vec<u32>,
        #[serde(default)]
        title: String,
    }

    #[test]
    fn page_state_serializes_flat() {
        let mut state = PageState {
            sections: Demo { items: vec![1, 2], title: "x".into() },
            overrides: Overrides::default(),
        };
        state.overrides.set("items", true);
        let v = state.to_value();
        assert_eq!(v, json!({"items": [1, 2], "title": "x", "overrides": {"items": true}}));

        let back: PageState<Demo> = serde_json::from_value(v).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_overrides_default_to_auto() {
        let state: PageState<Demo> = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert!(!state.overrides.is_manual("items"));
        assert!(state.sections.items.is_empty());
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = PageState { sections: Demo::default(), overrides: Overrides::default() };
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        let mut b = a.clone();
        b.sections.title = "changed".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn emptiness() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("  ")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!({"categories": [], "total": 0})));
        assert!(is_empty_value(&json!({"grantId": "", "nextDue": ""})));
        assert!(!is_empty_value(&json!({"totalAwarded": 5, "availableBudget": 0})));
        assert!(!is_empty_value(&json!([{"title": ""}])));
        assert!(!is_empty_value(&json!(0)));
    }
}
