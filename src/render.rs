//! Display model: what a page shows, independent of how it is drawn.
//!
//! Projections are pure functions of a `PageState`; the formatting helpers
//! below are shared by all pages so "—" and currency look the same everywhere.

use chrono::NaiveDate;
use serde::Serialize;

use crate::coerce;

pub const DASH: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Positive,
    Warning,
    Negative,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tile {
    pub id: &'static str,
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub tone: Tone,
    /// Pinned by a human rather than derived.
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub tone: Tone,
}

impl ListItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), detail: None, badge: None, tone: Tone::Neutral }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    pub fn badge(mut self, badge: impl Into<String>, tone: Tone) -> Self {
        self.badge = Some(badge.into());
        self.tone = tone;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListBlock {
    pub id: &'static str,
    pub title: String,
    pub items: Vec<ListItem>,
    /// Shown instead of items when there are none.
    pub empty_text: String,
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayModel {
    pub page: &'static str,
    pub tiles: Vec<Tile>,
    pub lists: Vec<ListBlock>,
}

impl DisplayModel {
    pub fn new(page: &'static str) -> Self {
        Self { page, tiles: Vec::new(), lists: Vec::new() }
    }

    pub fn tile(&mut self, id: &'static str, label: &str, value: String, tone: Tone) -> &mut Tile {
        self.tiles.push(Tile { id, label: label.to_string(), value, detail: None, tone, manual: false });
        let last = self.tiles.len() - 1;
        &mut self.tiles[last]
    }

    pub fn list(&mut self, id: &'static str, title: &str, items: Vec<ListItem>) -> &mut ListBlock {
        self.lists.push(ListBlock {
            id,
            title: title.to_string(),
            items,
            empty_text: "No data".to_string(),
            manual: false,
        });
        let last = self.lists.len() - 1;
        &mut self.lists[last]
    }

    pub fn find_tile(&self, id: &str) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.id == id)
    }

    pub fn find_list(&self, id: &str) -> Option<&ListBlock> {
        self.lists.iter().find(|l| l.id == id)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// USD without cents: `$1,234,567`. Absent or non-finite is "—".
pub fn fmt_money(amount: Option<f64>) -> String {
    match amount {
        Some(n) if n.is_finite() => {
            let rounded = format!("{:.0}", n.abs());
            let sign = if n < -0.5 { "-" } else { "" };
            format!("{}${}", sign, group_thousands(&rounded))
        }
        _ => DASH.to_string(),
    }
}

pub fn fmt_count(n: u64) -> String {
    group_thousands(&n.to_string())
}

pub fn fmt_pct(pct: i64) -> String {
    format!("{}%", pct)
}

/// `Mar 15, 2024`; dates that do not parse are shown verbatim.
pub fn fmt_date(raw: &str) -> String {
    if raw.trim().is_empty() {
        return DASH.to_string();
    }
    match coerce::date(raw) {
        Some(d) => format_day(d),
        None => raw.trim().to_string(),
    }
}

fn format_day(d: NaiveDate) -> String {
    d.format("%b %-d, %Y").to_string()
}

pub fn or_dash(text: &str) -> String {
    if text.trim().is_empty() {
        DASH.to_string()
    } else {
        text.trim().to_string()
    }
}
