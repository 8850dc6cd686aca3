//! Permissive coercion of loosely-typed payload values.
//!
//! Payloads come from hand-edited seed files, CV extraction and older cache
//! snapshots, so nothing here ever fails: bad input collapses to a named
//! default. Every record type deserializes its fields through these helpers.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Non-negative finite amount; anything else is 0.
///
/// Strings may carry currency symbols, thousands separators and whitespace
/// (`"$1,200"`) or a trailing percent sign.
pub fn money(v: &Value) -> f64 {
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '_' | '%') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    non_negative(n)
}

pub fn non_negative(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// Whole non-negative count (citations, scores, days). Fractions truncate.
pub fn count(v: &Value) -> u64 {
    money(v).trunc() as u64
}

/// Text field; numbers are rendered, everything else is empty.
pub fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Best-effort text for list entries that may be strings or objects.
pub fn entry_text(v: &Value) -> String {
    match v {
        Value::Object(map) => {
            for key in ["title", "name", "label", "text", "degree", "role"] {
                if let Some(s) = map.get(key).map(text).filter(|s| !s.trim().is_empty()) {
                    return s;
                }
            }
            String::new()
        }
        other => text(other),
    }
}

/// Tags given as strings or `{label}` / `{name}` objects. Blank tags drop.
pub fn tags(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(entry_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// First non-null value among `keys`, each of which may be a dotted path
/// (`budget.total`). Records carry several historical spellings per field.
pub fn pick<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> &'a Value {
    for key in keys {
        let mut parts = key.split('.');
        let mut cur = parts.next().and_then(|k| map.get(k));
        for part in parts {
            cur = cur.and_then(|v| v.get(part));
        }
        if let Some(v) = cur.filter(|v| !v.is_null()) {
            return v;
        }
    }
    &NULL
}

static NULL: Value = Value::Null;

/// Parse dates: RFC 3339, `YYYY-MM-DD`, `YYYY-MM`, `Mon YYYY`, `YYYY`.
/// Unparsable input is `None`, which sorts as earliest-possible.
pub fn date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Some(d);
    }
    // "Mar 2021", "March 2021"
    for fmt in ["%d %b %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("1 {}", s), fmt) {
            return Some(d);
        }
    }
    if s.len() == 4 {
        if let Ok(year) = s.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

// =============================================================================
// Status normalization
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ComplianceStatus {
    Compliant,
    #[default]
    Pending,
    Noncompliant,
}

impl ComplianceStatus {
    pub fn from_text(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "compliant" | "pass" | "passed" | "ok" | "done" => ComplianceStatus::Compliant,
            "noncompliant" | "non_compliant" | "fail" | "failed" => ComplianceStatus::Noncompliant,
            _ => ComplianceStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::Pending => "pending",
            ComplianceStatus::Noncompliant => "noncompliant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProjectStatus {
    #[default]
    Active,
    OnHold,
    Stopped,
    Completed,
}

impl ProjectStatus {
    pub fn from_text(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "on_hold" | "onhold" | "hold" | "paused" => ProjectStatus::OnHold,
            "stopped" | "cancelled" | "canceled" => ProjectStatus::Stopped,
            "completed" | "complete" | "done" | "finished" => ProjectStatus::Completed,
            _ => ProjectStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Completed => "completed",
        }
    }
}

macro_rules! text_enum_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let v = Value::deserialize(d)?;
                Ok(<$ty>::from_text(&text(&v)))
            }
        }
    };
}

text_enum_serde!(ComplianceStatus);
text_enum_serde!(ProjectStatus);

// =============================================================================
// serde adapters
// =============================================================================

pub fn de_money<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(money(&Value::deserialize(d)?))
}

pub fn de_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(count(&Value::deserialize(d)?))
}

pub fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(text(&Value::deserialize(d)?))
}

pub fn de_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(tags(&Value::deserialize(d)?))
}

/// List of free-form entries (strings or objects) flattened to text.
pub fn de_entries<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Array(items) => items.iter().map(entry_text).collect(),
        Value::Null => Vec::new(),
        other => vec![entry_text(&other)],
    })
}

/// String-to-string map (social links, partners); non-object input is empty.
pub fn de_text_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), entry_text(v))).collect(),
        _ => BTreeMap::new(),
    })
}

/// Optional amount; empty string and null are `None`.
pub fn de_opt_money<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match &v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(money(other)),
    })
}

/// Optional percentage clamped to 0..=100; empty string and null are `None`.
pub fn opt_percent(v: &Value) -> Option<u8> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(money(other).round().min(100.0) as u8),
    }
}

/// `true`, non-zero numbers and "1"/"true"/"yes".
pub fn flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn money_collapses_bad_input_to_zero() {
        assert_eq!(money(&json!(1500)), 1500.0);
        assert_eq!(money(&json!("$1,200")), 1200.0);
        assert_eq!(money(&json!(-5)), 0.0);
        assert_eq!(money(&json!("abc")), 0.0);
        assert_eq!(money(&json!(null)), 0.0);
        assert_eq!(money(&json!([1])), 0.0);
        assert_eq!(non_negative(f64::NAN), 0.0);
        assert_eq!(non_negative(f64::INFINITY), 0.0);
    }

    #[test]
    fn count_truncates() {
        assert_eq!(count(&json!("12")), 12);
        assert_eq!(count(&json!(3.9)), 3);
        assert_eq!(count(&json!(-2)), 0);
    }

    #[test]
    fn date_formats() {
        let d = |y, m, dd| NaiveDate::from_ymd_opt(y, m, dd);
        assert_eq!(date("2024-03-15"), d(2024, 3, 15));
        assert_eq!(date("2024-03-15T10:00:00Z"), d(2024, 3, 15));
        assert_eq!(date("2024-03-15T10:00:00"), d(2024, 3, 15));
        assert_eq!(date("2024-03"), d(2024, 3, 1));
        assert_eq!(date("2021"), d(2021, 1, 1));
        assert_eq!(date("Mar 2021"), d(2021, 3, 1));
        assert_eq!(date("September 2019"), d(2019, 9, 1));
        assert_eq!(date("soon"), None);
        assert_eq!(date(""), None);
    }

    #[test]
    fn tags_accept_strings_and_labels() {
        assert_eq!(
            tags(&json!(["AI", {"label": "ML"}, "", {"other": 1}])),
            vec!["AI".to_string(), "ML".to_string()]
        );
        assert!(tags(&json!(null)).is_empty());
    }

    #[test]
    fn pick_prefers_first_spelling_and_follows_paths() {
        let m = json!({"amount": 5, "amountAwarded": null, "budget": {"total": 9}});
        let m = m.as_object().unwrap();
        assert_eq!(pick(m, &["amountAwarded", "amount"]), &json!(5));
        assert_eq!(pick(m, &["awarded", "budget.total"]), &json!(9));
        assert_eq!(pick(m, &["nope", "budget.nope"]), &Value::Null);
    }

    #[test]
    fn status_normalization() {
        assert_eq!(ComplianceStatus::from_text("pass"), ComplianceStatus::Compliant);
        assert_eq!(ComplianceStatus::from_text("Non-Compliant"), ComplianceStatus::Noncompliant);
        assert_eq!(ComplianceStatus::from_text("in review"), ComplianceStatus::Pending);
        assert_eq!(ProjectStatus::from_text("On Hold"), ProjectStatus::OnHold);
        assert_eq!(ProjectStatus::from_text(""), ProjectStatus::Active);
    }

    #[test]
    fn status_serde_round_trip_uses_canonical_names() {
        let s: ProjectStatus = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(serde_json::to_value(s).unwrap(), json!("on_hold"));
    }
}
