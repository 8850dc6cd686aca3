//! Aggregate figures over record collections.
//!
//! All functions are total: missing or invalid numbers count as 0, invalid
//! dates never win a max-selection, and empty input yields the identity
//! (0, empty, or `None`).

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::coerce;

pub const DEFAULT_TOP_K: usize = 5;
/// Citation threshold for the i10-index.
pub const I10_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Largest,
    Smallest,
}

fn finite(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

pub fn sum<R>(records: &[R], field: impl Fn(&R) -> f64) -> f64 {
    records.iter().map(|r| finite(field(r))).sum()
}

/// The `k` records with the largest (or smallest) field value. Stable: ties
/// keep input order.
pub fn top_k<R: Clone>(records: &[R], field: impl Fn(&R) -> f64, k: usize, dir: Direction) -> Vec<R> {
    let mut indexed: Vec<(usize, f64)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, finite(field(r))))
        .collect();
    indexed.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match dir {
            Direction::Largest => ord.reverse(),
            Direction::Smallest => ord,
        }
    });
    indexed
        .into_iter()
        .take(k)
        .map(|(i, _)| records[i].clone())
        .collect()
}

/// Record with the latest date. Missing/unparsable dates are excluded; ties
/// go to the first occurrence.
pub fn last_by_date<'a, R>(records: &'a [R], field: impl Fn(&R) -> Option<&str>) -> Option<&'a R> {
    let mut best: Option<(NaiveDate, &R)> = None;
    for r in records {
        let Some(d) = field(r).and_then(coerce::date) else {
            continue;
        };
        match best {
            Some((cur, _)) if d <= cur => {}
            _ => best = Some((d, r)),
        }
    }
    best.map(|(_, r)| r)
}

/// Flatten tag lists, dedupe (case-sensitive) keeping first-seen order,
/// truncate to `cap`.
pub fn frequency_tags<R>(records: &[R], field: impl Fn(&R) -> &[String], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in records.iter().flat_map(|r| field(r).iter()) {
        if out.len() >= cap {
            break;
        }
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.as_str()) {
            out.push(tag.clone());
        }
    }
    out
}

/// Largest h such that h papers have at least h citations each.
pub fn h_index(citations: &[u64]) -> u64 {
    let mut sorted = citations.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let mut h = 0;
    for (i, c) in sorted.iter().enumerate() {
        let rank = i as u64 + 1;
        if *c >= rank {
            h = rank;
        } else {
            break;
        }
    }
    h
}

pub fn count_at_least<R>(records: &[R], field: impl Fn(&R) -> f64, threshold: f64) -> usize {
    records.iter().filter(|r| finite(field(r)) >= threshold).count()
}

/// `value / total * 100` rounded; 0 when total is 0.
pub fn percent_of(value: f64, total: f64) -> i64 {
    if total == 0.0 || !total.is_finite() || !value.is_finite() {
        return 0;
    }
    (value / total * 100.0).round() as i64
}

/// Mean rounded to `decimals` places; 0 for an empty collection.
pub fn average(total: f64, count: usize, decimals: u32) -> f64 {
    if count == 0 || !total.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(decimals as i32);
    (total / count as f64 * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub label: String,
    #[serde(default, deserialize_with = "coerce::de_money")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default, deserialize_with = "coerce::de_money")]
    pub total: f64,
}

impl Breakdown {
    pub fn from_categories(categories: Vec<Category>) -> Self {
        let total = sum(&categories, |c| c.value);
        Self { categories, total }
    }
}

/// Sum `value` per `label`, labels in first-appearance order. Blank labels
/// fold into `fallback_label`.
pub fn breakdown<R>(
    records: &[R],
    label: impl Fn(&R) -> &str,
    value: impl Fn(&R) -> f64,
    fallback_label: &str,
) -> Breakdown {
    let mut categories: Vec<Category> = Vec::new();
    for r in records {
        let l = label(r).trim();
        let l = if l.is_empty() { fallback_label } else { l };
        let v = finite(value(r));
        match categories.iter_mut().find(|c| c.label == l) {
            Some(c) => c.value += v,
            None => categories.push(Category { label: l.to_string(), value: v }),
        }
    }
    Breakdown::from_categories(categories)
}

pub fn count_by<R, K: Ord>(records: &[R], key: impl Fn(&R) -> K) -> BTreeMap<K, usize> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(key(r)).or_insert(0) += 1;
    }
    out
}
