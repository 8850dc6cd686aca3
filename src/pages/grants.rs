//! Grants page: awards, money totals, the most recent award, funding
//! breakdown, reporting dates and keywords.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::coerce::{self, money, pick, text};
use crate::config::Limits;
use crate::metrics::{self, Breakdown};
use crate::pages::{Derived, Page};
use crate::render::{fmt_date, fmt_money, fmt_pct, or_dash, DisplayModel, ListItem, Tone};
use crate::source::{Endpoints, Extractor, SourceSpec, OVERRIDES_FIELD};
use crate::state::PageState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", rename_all = "camelCase")]
pub struct Grant {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub agency: String,
    pub amount_awarded: f64,
    pub amount_received: f64,
    pub amount_spent: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub awarded_at: String,
    pub tags: Vec<String>,
}

impl From<Map<String, Value>> for Grant {
    fn from(m: Map<String, Value>) -> Self {
        Grant {
            id: text(pick(&m, &["id", "grantId", "grant_id"])),
            title: text(pick(&m, &["title", "name"])).trim().to_string(),
            agency: text(pick(&m, &["agency", "sponsor", "funder"])).trim().to_string(),
            amount_awarded: money(pick(
                &m,
                &["amountAwarded", "amount_awarded", "awarded", "amount", "total_amount", "value", "budget.total"],
            )),
            amount_received: money(pick(&m, &["amountReceived", "amount_received", "received", "budget.received"])),
            amount_spent: money(pick(&m, &["amountSpent", "amount_spent", "spent", "budget.spent"])),
            awarded_at: text(pick(&m, &["awardedAt", "awarded_at"])),
            tags: coerce::tags(pick(&m, &["tags", "keywords"])),
        }
    }
}

impl Grant {
    /// Money has started flowing.
    pub fn is_active(&self) -> bool {
        self.amount_received > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    #[serde(default, deserialize_with = "coerce::de_money")]
    pub total_awarded: f64,
    #[serde(default, deserialize_with = "coerce::de_money")]
    pub available_budget: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reports {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub grant_id: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub next_due: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub last_submitted: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantsSections {
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub totals: Totals,
    #[serde(default)]
    pub last_awarded: Option<Grant>,
    #[serde(default)]
    pub breakdown: Breakdown,
    #[serde(default)]
    pub reports: Reports,
    #[serde(default, deserialize_with = "coerce::de_tags")]
    pub keywords: Vec<String>,
}

pub fn derive_totals(grants: &[Grant]) -> Totals {
    let received = metrics::sum(grants, |g| g.amount_received);
    let spent = metrics::sum(grants, |g| g.amount_spent);
    Totals {
        total_awarded: metrics::sum(grants, |g| g.amount_awarded),
        available_budget: (received - spent).max(0.0),
    }
}

/// `/grants/summary` only counts when it carries both totals.
fn summary_totals(payload: &Value) -> Option<Value> {
    let awarded = payload.get("totalAwarded").filter(|v| !v.is_null())?;
    let available = payload.get("availableBudget").filter(|v| !v.is_null())?;
    Some(json!({"totalAwarded": awarded, "availableBudget": available}))
}

fn root_totals(payload: &Value) -> Option<Value> {
    let awarded = payload.pointer("/total_grants_awarded/amount").filter(|v| !v.is_null())?;
    let available = payload.pointer("/available_budget/amount").filter(|v| !v.is_null())?;
    Some(json!({"totalAwarded": awarded, "availableBudget": available}))
}

#[derive(Debug, Clone, Default)]
pub struct GrantsPage {
    limits: Limits,
}

impl GrantsPage {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

impl Page for GrantsPage {
    type Sections = GrantsSections;

    const DOMAIN: &'static str = "grants";
    const FIELDS: &'static [&'static str] =
        &["grants", "totals", "lastAwarded", "breakdown", "reports", "keywords"];
    const DERIVED: &'static [Derived] = &[
        Derived { section: "totals", depends_on: "grants" },
        Derived { section: "lastAwarded", depends_on: "grants" },
        Derived { section: "breakdown", depends_on: "grants" },
        Derived { section: "keywords", depends_on: "grants" },
    ];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec> {
        vec![
            ep.remote("grants/summary", 0, "grants/summary")
                .rule("totals", Extractor::Custom(summary_totals))
                .rule("lastAwarded", Extractor::Key("lastAwarded")),
            ep.remote("grants/breakdown", 0, "grants/breakdown")
                .rule("breakdown", Extractor::Key("breakdown"))
                .rule("breakdown", Extractor::Whole),
            ep.remote("grants/reports", 0, "grants/reports")
                .rule("reports", Extractor::Key("reports"))
                .rule("reports", Extractor::Whole),
            ep.remote("grants/keywords", 0, "grants/keywords")
                .rule("keywords", Extractor::KeyOrBare("keywords")),
            ep.remote("grants", 1, "grants")
                .rule("grants", Extractor::KeyOrBare("grants"))
                .rule("totals", Extractor::Key("totals"))
                .rule("totals", Extractor::Custom(root_totals))
                .rule("lastAwarded", Extractor::AnyKey(&["lastAwarded", "last_awarded_grant"]))
                .rule("breakdown", Extractor::Key("breakdown"))
                .rule("reports", Extractor::Key("reports"))
                .rule("keywords", Extractor::Key("keywords"))
                .rule(OVERRIDES_FIELD, Extractor::Key(OVERRIDES_FIELD)),
            ep.cache(Self::DOMAIN, 2).mirror_fields(Self::FIELDS),
            ep.static_file(Self::DOMAIN, 3)
                .rule("grants", Extractor::KeyOrBare("grants"))
                .mirror_fields(Self::FIELDS),
        ]
    }

    fn recompute(&self, s: &mut GrantsSections, section: &str) {
        match section {
            "totals" => s.totals = derive_totals(&s.grants),
            "lastAwarded" => {
                // undated records: the first grant stands in
                s.last_awarded = metrics::last_by_date(&s.grants, |g| Some(g.awarded_at.as_str()))
                    .or_else(|| s.grants.first())
                    .cloned()
            }
            "breakdown" => {
                s.breakdown = metrics::breakdown(&s.grants, |g| g.agency.as_str(), |g| g.amount_awarded, "Other")
            }
            "keywords" => {
                s.keywords = metrics::frequency_tags(&s.grants, |g| &g.tags, self.limits.keyword_cap)
            }
            _ => {}
        }
    }

    fn validate(&self, s: &mut GrantsSections) {
        s.grants.retain(|g| !g.title.is_empty());
        s.breakdown.categories.retain(|c| !c.label.trim().is_empty());
        s.breakdown.total = metrics::sum(&s.breakdown.categories, |c| c.value);
        s.keywords.retain(|k| !k.trim().is_empty());
    }

    fn project(&self, state: &PageState<GrantsSections>) -> DisplayModel {
        let s = &state.sections;
        let manual = |section: &str| state.overrides.is_manual(section);
        let mut m = DisplayModel::new(Self::DOMAIN);

        m.tile("total_awarded", "Total Grants Awarded", fmt_money(Some(s.totals.total_awarded)), Tone::Info)
            .manual = manual("totals");
        m.tile("available_budget", "Available Budget", fmt_money(Some(s.totals.available_budget)), Tone::Positive)
            .manual = manual("totals");

        let last = m.tile(
            "last_awarded",
            "Last Awarded Grant",
            s.last_awarded.as_ref().map(|g| or_dash(&g.title)).unwrap_or_else(|| or_dash("")),
            Tone::Neutral,
        );
        last.detail = s.last_awarded.as_ref().map(|g| {
            format!("{} · {} · {}", or_dash(&g.agency), fmt_money(Some(g.amount_awarded)), fmt_date(&g.awarded_at))
        });
        last.manual = manual("lastAwarded");

        m.tile("report_grant", "Grant ID", or_dash(&s.reports.grant_id), Tone::Neutral);
        m.tile("report_next_due", "Next Report Due", fmt_date(&s.reports.next_due), Tone::Warning);
        m.tile("report_last_submitted", "Last Submitted", fmt_date(&s.reports.last_submitted), Tone::Neutral);

        let grants = s
            .grants
            .iter()
            .map(|g| {
                let (badge, tone) = if g.is_active() { ("Active", Tone::Positive) } else { ("Pending", Tone::Warning) };
                ListItem::text(or_dash(&g.title))
                    .detail(format!(
                        "{} · awarded {} · received {} · spent {}",
                        or_dash(&g.agency),
                        fmt_money(Some(g.amount_awarded)),
                        fmt_money(Some(g.amount_received)),
                        fmt_money(Some(g.amount_spent)),
                    ))
                    .badge(badge, tone)
            })
            .collect();
        m.list("grants", "Grants", grants).empty_text = "No grants yet".to_string();

        let categories = s
            .breakdown
            .categories
            .iter()
            .map(|c| {
                ListItem::text(or_dash(&c.label))
                    .detail(fmt_money(Some(c.value)))
                    .badge(fmt_pct(metrics::percent_of(c.value, s.breakdown.total)), Tone::Info)
            })
            .collect();
        m.list("breakdown", "Funding Breakdown", categories).manual = manual("breakdown");

        let keywords = s.keywords.iter().map(ListItem::text).collect();
        m.list("keywords", "Keywords", keywords).manual = manual("keywords");
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn grants(v: Value) -> Vec<Grant> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn grant_accepts_historical_spellings() {
        let g: Grant = serde_json::from_value(json!({
            "grant_id": "G-1",
            "title": "  Ocean Sensors ",
            "sponsor": "NOAA",
            "amount": "$1,500",
            "budget": {"received": 700, "spent": "250"},
            "keywords": ["oceans", {"label": "sensors"}],
        }))
        .unwrap();
        assert_eq!(g.id, "G-1");
        assert_eq!(g.title, "Ocean Sensors");
        assert_eq!(g.agency, "NOAA");
        assert_eq!(g.amount_awarded, 1500.0);
        assert_eq!(g.amount_received, 700.0);
        assert_eq!(g.amount_spent, 250.0);
        assert_eq!(g.tags, vec!["oceans", "sensors"]);

        let canonical = serde_json::to_value(&g).unwrap();
        assert_eq!(canonical["amountAwarded"], json!(1500.0));
        let back: Grant = serde_json::from_value(canonical).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn grant_rejects_non_object_entries() {
        assert!(serde_json::from_value::<Vec<Grant>>(json!(["just a string"])).is_err());
    }

    #[test]
    fn totals_match_reference_example() {
        let gs = grants(json!([
            {"agency": "NSF", "amountAwarded": 100000, "amountReceived": 50000, "amountSpent": 20000},
            {"agency": "NIH", "amountAwarded": 200000, "amountReceived": 150000, "amountSpent": 150000},
        ]));
        let t = derive_totals(&gs);
        assert_eq!(t.total_awarded, 300000.0);
        assert_eq!(t.available_budget, 30000.0);
    }

    #[test]
    fn available_budget_never_negative() {
        let gs = grants(json!([
            {"amountReceived": 10, "amountSpent": 5000},
            {"amountReceived": -300, "amountSpent": "lots"},
            {"amountReceived": "n/a", "amountSpent": 1},
        ]));
        assert_eq!(derive_totals(&gs).available_budget, 0.0);
        assert_eq!(derive_totals(&[]).available_budget, 0.0);
    }

    #[test]
    fn derivations_from_records() {
        let page = GrantsPage::new(Limits { keyword_cap: 3, ..Limits::default() });
        let mut s = GrantsSections {
            grants: grants(json!([
                {"title": "A", "agency": "NSF", "amountAwarded": 10, "awardedAt": "2022-01-01", "tags": ["x", "y"]},
                {"title": "B", "agency": "NIH", "amountAwarded": 20, "awardedAt": "2024-05-01", "tags": ["y", "z", "w"]},
                {"title": "C", "agency": "NSF", "amountAwarded": 5, "tags": ["q"]},
            ])),
            ..Default::default()
        };
        let missing: BTreeSet<&'static str> = GrantsPage::DERIVED.iter().map(|d| d.section).collect();
        let derived = page.derive_missing(&mut s, &missing);
        assert_eq!(derived.len(), 4);
        assert_eq!(s.last_awarded.as_ref().map(|g| g.title.as_str()), Some("B"));
        assert_eq!(s.keywords, vec!["x", "y", "z"]);
        assert_eq!(s.breakdown.categories.len(), 2);
        assert_eq!(s.breakdown.categories[0].value, 15.0);
        assert_eq!(s.breakdown.total, 35.0);
    }

    #[test]
    fn last_awarded_falls_back_to_first_undated_grant() {
        let page = GrantsPage::default();
        let mut s = GrantsSections { grants: grants(json!([{"title": "A"}, {"title": "B"}])), ..Default::default() };
        page.recompute(&mut s, "lastAwarded");
        assert_eq!(s.last_awarded.as_ref().map(|g| g.title.as_str()), Some("A"));

        s.grants.clear();
        page.recompute(&mut s, "lastAwarded");
        assert_eq!(s.last_awarded, None);
    }

    #[test]
    fn validate_drops_untitled_and_retotals_breakdown() {
        let page = GrantsPage::default();
        let mut s: GrantsSections = serde_json::from_value(json!({
            "grants": [{"title": ""}, {"title": "Kept"}],
            "breakdown": {"categories": [{"label": "A", "value": 3}, {"label": " ", "value": 9}], "total": 100},
        }))
        .unwrap();
        page.validate(&mut s);
        assert_eq!(s.grants.len(), 1);
        assert_eq!(s.breakdown.total, 3.0);
    }

    #[test]
    fn summary_totals_need_both_figures() {
        assert!(summary_totals(&json!({"totalAwarded": 5})).is_none());
        assert_eq!(
            summary_totals(&json!({"totalAwarded": 5, "availableBudget": 2})),
            Some(json!({"totalAwarded": 5, "availableBudget": 2}))
        );
        assert_eq!(
            root_totals(&json!({"total_grants_awarded": {"amount": 9}, "available_budget": {"amount": 1}})),
            Some(json!({"totalAwarded": 9, "availableBudget": 1}))
        );
    }

    #[test]
    fn projection_is_deterministic_and_flags_manual_tiles() {
        let page = GrantsPage::default();
        let mut state = PageState::<GrantsSections>::default();
        state.sections.grants = grants(json!([{"title": "A", "amountReceived": 1}]));
        state.sections.totals.total_awarded = 1234.0;
        state.overrides.set("totals", true);
        let a = page.project(&state);
        assert_eq!(a, page.project(&state));
        let tile = a.find_tile("total_awarded").unwrap();
        assert_eq!(tile.value, "$1,234");
        assert!(tile.manual);
        assert_eq!(a.find_tile("last_awarded").unwrap().value, "—");
        assert_eq!(a.find_list("grants").unwrap().items[0].badge.as_deref(), Some("Active"));
    }
}
