//! Compliance page: checkpoints, audits, notes, the status summary,
//! quick actions and key contacts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{self, count, entry_text, pick, text, ComplianceStatus};
use crate::metrics;
use crate::pages::{Derived, Page};
use crate::render::{fmt_count, fmt_date, or_dash, DisplayModel, ListItem, Tone};
use crate::source::{Endpoints, Extractor, SourceSpec, OVERRIDES_FIELD};
use crate::state::PageState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub status: ComplianceStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_reviewed: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub link: String,
}

impl From<Map<String, Value>> for Checkpoint {
    fn from(m: Map<String, Value>) -> Self {
        Checkpoint {
            id: text(pick(&m, &["id"])),
            title: text(pick(&m, &["title", "name"])).trim().to_string(),
            status: ComplianceStatus::from_text(&text(pick(&m, &["status"]))),
            last_reviewed: text(pick(&m, &["lastReviewed", "last_reviewed"])),
            link: text(pick(&m, &["link", "href", "url"])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Audit {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub date: String,
    pub score: Option<u64>,
    pub tags: Vec<String>,
}

impl From<Map<String, Value>> for Audit {
    fn from(m: Map<String, Value>) -> Self {
        let score = pick(&m, &["score"]);
        Audit {
            id: text(pick(&m, &["id"])),
            name: text(pick(&m, &["name", "title"])).trim().to_string(),
            date: text(pick(&m, &["date"])),
            score: (!score.is_null() && !text(score).trim().is_empty()).then(|| count(score)),
            tags: coerce::tags(pick(&m, &["tags"])),
        }
    }
}

/// A note given either as bare text or as `{text, date}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Note {
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
}

impl From<Value> for Note {
    fn from(v: Value) -> Self {
        match &v {
            Value::Object(m) => Note {
                text: text(pick(m, &["text", "note", "body"])).trim().to_string(),
                date: text(pick(m, &["date"])),
            },
            other => Note { text: text(other).trim().to_string(), date: String::new() },
        }
    }
}

/// Label plus optional link; bare strings are label-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct QuickAction {
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub href: String,
}

impl From<Value> for QuickAction {
    fn from(v: Value) -> Self {
        match &v {
            Value::Object(m) => QuickAction {
                label: entry_text(&v).trim().to_string(),
                href: text(pick(m, &["href", "link", "url"])),
            },
            other => QuickAction { label: text(other).trim().to_string(), href: String::new() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Contact {
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub avatar: String,
}

impl From<Map<String, Value>> for Contact {
    fn from(m: Map<String, Value>) -> Self {
        Contact {
            name: text(pick(&m, &["name"])).trim().to_string(),
            role: text(pick(&m, &["role", "title"])).trim().to_string(),
            avatar: text(pick(&m, &["avatar", "photo", "photo_url"])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct StatusSummary {
    pub compliant: u64,
    pub pending: u64,
    pub noncompliant: u64,
}

impl From<Map<String, Value>> for StatusSummary {
    fn from(m: Map<String, Value>) -> Self {
        StatusSummary {
            compliant: count(pick(&m, &["compliant"])),
            pending: count(pick(&m, &["pending"])),
            noncompliant: count(pick(&m, &["noncompliant", "non_compliant", "nonCompliant"])),
        }
    }
}

pub fn derive_summary(checkpoints: &[Checkpoint]) -> StatusSummary {
    let counts = metrics::count_by(checkpoints, |c| c.status);
    let get = |s: ComplianceStatus| counts.get(&s).copied().unwrap_or(0) as u64;
    StatusSummary {
        compliant: get(ComplianceStatus::Compliant),
        pending: get(ComplianceStatus::Pending),
        noncompliant: get(ComplianceStatus::Noncompliant),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSections {
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub audits: Vec<Audit>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub summary: StatusSummary,
    #[serde(default)]
    pub quick_actions: Vec<QuickAction>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

pub fn status_tone(status: ComplianceStatus) -> Tone {
    match status {
        ComplianceStatus::Compliant => Tone::Positive,
        ComplianceStatus::Pending => Tone::Warning,
        ComplianceStatus::Noncompliant => Tone::Negative,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompliancePage;

impl Page for CompliancePage {
    type Sections = ComplianceSections;

    const DOMAIN: &'static str = "compliance";
    const FIELDS: &'static [&'static str] =
        &["checkpoints", "audits", "notes", "summary", "quickActions", "contacts"];
    const DERIVED: &'static [Derived] = &[Derived { section: "summary", depends_on: "checkpoints" }];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec> {
        vec![
            ep.remote("compliance/checkpoints", 0, "compliance/checkpoints").rule("checkpoints", Extractor::Items),
            ep.remote("compliance/audits", 0, "compliance/audits").rule("audits", Extractor::Items),
            ep.remote("compliance/notes", 0, "compliance/notes").rule("notes", Extractor::Items),
            ep.remote("compliance/summary", 0, "compliance/summary")
                .rule("summary", Extractor::Key("summary"))
                .rule("summary", Extractor::Whole),
            ep.remote("compliance/quick-actions", 0, "compliance/quick-actions")
                .rule("quickActions", Extractor::Items),
            ep.remote("compliance/contacts", 0, "compliance/contacts").rule("contacts", Extractor::Items),
            ep.remote("compliance", 1, "compliance")
                .rule("checkpoints", Extractor::Key("checkpoints"))
                .rule("audits", Extractor::Key("audits"))
                .rule("notes", Extractor::Key("notes"))
                .rule("summary", Extractor::Key("summary"))
                .rule("quickActions", Extractor::AnyKey(&["quickActions", "quick_actions"]))
                .rule("contacts", Extractor::AnyKey(&["contacts", "key_contacts"]))
                .rule(OVERRIDES_FIELD, Extractor::Key(OVERRIDES_FIELD)),
            ep.cache(Self::DOMAIN, 2).mirror_fields(Self::FIELDS),
            ep.static_file(Self::DOMAIN, 3).mirror_fields(Self::FIELDS),
        ]
    }

    fn recompute(&self, s: &mut ComplianceSections, section: &str) {
        if section == "summary" {
            s.summary = derive_summary(&s.checkpoints);
        }
    }

    fn validate(&self, s: &mut ComplianceSections) {
        s.checkpoints.retain(|c| !c.title.is_empty());
        s.audits.retain(|a| !a.name.is_empty());
        s.notes.retain(|n| !n.text.is_empty());
        s.quick_actions.retain(|q| !q.label.is_empty());
        s.contacts.retain(|c| !c.name.is_empty());
    }

    fn project(&self, state: &PageState<ComplianceSections>) -> DisplayModel {
        let s = &state.sections;
        let pinned = state.overrides.is_manual("summary");
        let mut m = DisplayModel::new(Self::DOMAIN);

        m.tile("summary_compliant", "Compliant", fmt_count(s.summary.compliant), Tone::Positive).manual = pinned;
        m.tile("summary_pending", "Pending", fmt_count(s.summary.pending), Tone::Warning).manual = pinned;
        m.tile("summary_noncompliant", "Non-compliant", fmt_count(s.summary.noncompliant), Tone::Negative)
            .manual = pinned;

        let latest = metrics::last_by_date(&s.audits, |a| Some(a.date.as_str()));
        m.tile(
            "latest_audit",
            "Latest Audit",
            latest.map(|a| or_dash(&a.name)).unwrap_or_else(|| or_dash("")),
            Tone::Neutral,
        )
        .detail = latest.map(|a| fmt_date(&a.date));

        let checkpoints = s
            .checkpoints
            .iter()
            .map(|c| {
                ListItem::text(or_dash(&c.title))
                    .detail(format!("Last Reviewed: {}", fmt_date(&c.last_reviewed)))
                    .badge(c.status.as_str(), status_tone(c.status))
            })
            .collect();
        m.list("checkpoints", "Compliance Checkpoints", checkpoints);

        let audits = s
            .audits
            .iter()
            .map(|a| {
                let score = a.score.map(|x| x.to_string()).unwrap_or_else(|| or_dash(""));
                let mut detail = format!("Date: {}  |  Score: {}", fmt_date(&a.date), score);
                if !a.tags.is_empty() {
                    detail.push_str(&format!("  |  Tags: {}", a.tags.join(", ")));
                }
                ListItem::text(if a.name.is_empty() { "Audit".to_string() } else { a.name.clone() }).detail(detail)
            })
            .collect();
        m.list("audits", "Recent Audits & Reviews", audits);

        let notes = s
            .notes
            .iter()
            .map(|n| {
                let item = ListItem::text(or_dash(&n.text));
                if n.date.is_empty() {
                    item
                } else {
                    item.detail(fmt_date(&n.date))
                }
            })
            .collect();
        m.list("notes", "Compliance Notes", notes);

        let actions = s
            .quick_actions
            .iter()
            .map(|q| ListItem::text(if q.label.is_empty() { "Action".to_string() } else { q.label.clone() }).detail(q.href.clone()))
            .collect();
        m.list("quick_actions", "Quick Actions", actions);

        let contacts = s.contacts.iter().map(|c| ListItem::text(or_dash(&c.name)).detail(or_dash(&c.role))).collect();
        m.list("contacts", "Key Contacts", contacts);
        m
    }
}
