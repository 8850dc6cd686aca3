//! Projects page. Wire names are snake_case throughout, matching what the
//! CV ingest produces.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::coerce::{self, count, pick, text, ProjectStatus};
use crate::metrics;
use crate::pages::{Derived, Page};
use crate::render::{fmt_date, fmt_money, fmt_pct, or_dash, DisplayModel, ListItem, Tone};
use crate::source::{Endpoints, Extractor, SourceSpec, OVERRIDES_FIELD};
use crate::state::{is_empty_value, PageState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactPoints {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub total: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub change: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalBudget {
    #[serde(default, deserialize_with = "coerce::de_opt_money")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub change: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Project {
    pub status: ProjectStatus,
    pub days_remaining: u64,
    pub title: String,
    pub description: String,
    pub donut_percentage: Option<u8>,
    pub tags: Vec<String>,
}

impl From<Map<String, Value>> for Project {
    fn from(m: Map<String, Value>) -> Self {
        Project {
            status: ProjectStatus::from_text(&text(pick(&m, &["status"]))),
            days_remaining: count(pick(&m, &["days_remaining", "days"])),
            title: text(pick(&m, &["title"])).trim().to_string(),
            description: text(pick(&m, &["description", "desc"])),
            donut_percentage: coerce::opt_percent(pick(&m, &["donut_percentage", "donut"])),
            tags: coerce::tags(pick(&m, &["tags"])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextDeadline {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub label: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub name: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub time_ago: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub subject: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Activity {
    pub name: String,
    pub action: String,
    pub time_ago: String,
    pub avatar: String,
    pub approved: bool,
}

impl From<Map<String, Value>> for Activity {
    fn from(m: Map<String, Value>) -> Self {
        Activity {
            name: text(pick(&m, &["name"])),
            action: text(pick(&m, &["action"])),
            time_ago: text(pick(&m, &["time_ago", "when"])),
            avatar: text(pick(&m, &["avatar"])),
            approved: coerce::flag(pick(&m, &["approved"])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub active: u64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub on_hold: u64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub stopped: u64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub completed: u64,
}

pub fn derive_status_counts(projects: &[Project]) -> StatusCounts {
    let counts = metrics::count_by(projects, |p| p.status);
    let get = |s: ProjectStatus| counts.get(&s).copied().unwrap_or(0) as u64;
    StatusCounts {
        active: get(ProjectStatus::Active),
        on_hold: get(ProjectStatus::OnHold),
        stopped: get(ProjectStatus::Stopped),
        completed: get(ProjectStatus::Completed),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectsSections {
    #[serde(default)]
    pub impact_points: ImpactPoints,
    #[serde(default)]
    pub total_budget: TotalBudget,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub next_deadline: NextDeadline,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub latest_activity: Vec<Activity>,
    #[serde(default)]
    pub status_counts: StatusCounts,
}

/// A lone snapshot project stands in for the list only when it says something.
fn snapshot_as_list(payload: &Value) -> Option<Value> {
    let snap = payload.get("project_snapshot").unwrap_or(payload);
    (snap.is_object() && !is_empty_value(snap)).then(|| json!([snap]))
}

pub fn status_tone(status: ProjectStatus) -> Tone {
    match status {
        ProjectStatus::Active => Tone::Positive,
        ProjectStatus::OnHold => Tone::Warning,
        ProjectStatus::Stopped => Tone::Neutral,
        ProjectStatus::Completed => Tone::Info,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectsPage;

impl Page for ProjectsPage {
    type Sections = ProjectsSections;

    const DOMAIN: &'static str = "projects";
    const FIELDS: &'static [&'static str] = &[
        "impact_points",
        "total_budget",
        "projects",
        "next_deadline",
        "messages",
        "latest_activity",
        "status_counts",
    ];
    const DERIVED: &'static [Derived] = &[Derived { section: "status_counts", depends_on: "projects" }];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec> {
        vec![
            ep.remote("projects/tiles", 0, "projects/tiles")
                .rule("impact_points", Extractor::Key("impact"))
                .rule("total_budget", Extractor::Key("budget")),
            ep.remote("projects/activity", 0, "projects/activity").rule("latest_activity", Extractor::Items),
            ep.remote("projects/messages", 0, "projects/messages").rule("messages", Extractor::Items),
            ep.remote("projects/deadline", 0, "projects/deadline")
                .rule("next_deadline", Extractor::Key("next_deadline"))
                .rule("next_deadline", Extractor::Whole),
            ep.remote("projects", 1, "projects")
                .rule("impact_points", Extractor::AnyKey(&["impact_points", "impact"]))
                .rule("total_budget", Extractor::AnyKey(&["total_budget", "budget"]))
                .rule("projects", Extractor::KeyOrBare("projects"))
                .rule("projects", Extractor::Pointer("/project_status/projects"))
                .rule("next_deadline", Extractor::AnyKey(&["next_deadline", "deadline"]))
                .rule("messages", Extractor::Key("messages"))
                .rule("latest_activity", Extractor::Key("latest_activity"))
                .rule("status_counts", Extractor::Key("status_counts"))
                .rule("status_counts", Extractor::Pointer("/project_status/counts"))
                .rule(OVERRIDES_FIELD, Extractor::Key(OVERRIDES_FIELD)),
            ep.remote("projects/snapshot", 2, "projects/snapshot")
                .rule("projects", Extractor::Custom(snapshot_as_list)),
            ep.cache(Self::DOMAIN, 3).mirror_fields(Self::FIELDS),
            ep.static_file(Self::DOMAIN, 4)
                .rule("projects", Extractor::KeyOrBare("projects"))
                .mirror_fields(Self::FIELDS),
        ]
    }

    fn recompute(&self, s: &mut ProjectsSections, section: &str) {
        if section == "status_counts" {
            s.status_counts = derive_status_counts(&s.projects);
        }
    }

    fn validate(&self, s: &mut ProjectsSections) {
        s.projects.retain(|p| !p.title.is_empty());
        for p in &mut s.projects {
            p.donut_percentage = p.donut_percentage.map(|d| d.min(100));
        }
        s.messages.retain(|m| !m.subject.trim().is_empty() || !m.name.trim().is_empty());
        s.latest_activity.retain(|a| !a.name.trim().is_empty() || !a.action.trim().is_empty());
    }

    fn project(&self, state: &PageState<ProjectsSections>) -> DisplayModel {
        let s = &state.sections;
        let mut m = DisplayModel::new(Self::DOMAIN);

        let impact = m.tile("impact_points", "Impact Points", or_dash(&s.impact_points.total), Tone::Info);
        impact.detail = Some(format!("{} {}", or_dash(&s.impact_points.change), s.impact_points.note).trim().to_string());

        let budget = m.tile("total_budget", "Total Budget", fmt_money(s.total_budget.amount), Tone::Info);
        budget.detail = Some(format!("{} {}", or_dash(&s.total_budget.change), s.total_budget.note).trim().to_string());

        m.tile("next_deadline", "Next Deadline", or_dash(&s.next_deadline.label), Tone::Warning).detail =
            Some(fmt_date(&s.next_deadline.date));

        let counts_manual = state.overrides.is_manual("status_counts");
        for (id, label, n, status) in [
            ("count_active", "Active", s.status_counts.active, ProjectStatus::Active),
            ("count_on_hold", "On Hold", s.status_counts.on_hold, ProjectStatus::OnHold),
            ("count_stopped", "Stopped", s.status_counts.stopped, ProjectStatus::Stopped),
            ("count_completed", "Completed", s.status_counts.completed, ProjectStatus::Completed),
        ] {
            m.tile(id, label, n.to_string(), status_tone(status)).manual = counts_manual;
        }

        let snapshot = s.projects.first();
        let snap = m.tile(
            "snapshot",
            "Project Snapshot",
            snapshot.map(|p| or_dash(&p.title)).unwrap_or_else(|| or_dash("")),
            snapshot.map(|p| status_tone(p.status)).unwrap_or(Tone::Neutral),
        );
        snap.detail = snapshot.map(|p| {
            format!(
                "{} · {} days remaining · {}",
                p.status.as_str(),
                p.days_remaining,
                fmt_pct(p.donut_percentage.unwrap_or(0) as i64)
            )
        });

        let projects = s
            .projects
            .iter()
            .map(|p| {
                let mut detail = or_dash(&p.description);
                if !p.tags.is_empty() {
                    detail = format!("{} · {}", detail, p.tags.join(", "));
                }
                ListItem::text(if p.title.is_empty() { "Untitled".to_string() } else { p.title.clone() })
                    .detail(detail)
                    .badge(p.status.as_str(), status_tone(p.status))
            })
            .collect();
        m.list("projects", "Projects", projects);

        let messages = s
            .messages
            .iter()
            .map(|msg| ListItem::text(or_dash(&msg.subject)).detail(format!("{} · {}", or_dash(&msg.name), or_dash(&msg.time_ago))))
            .collect();
        m.list("messages", "Messages", messages);

        let activity = s
            .latest_activity
            .iter()
            .map(|a| {
                let item = ListItem::text(format!("{} {}", or_dash(&a.name), a.action).trim().to_string())
                    .detail(a.time_ago.clone());
                if a.approved {
                    item.badge("approved", Tone::Positive)
                } else {
                    item
                }
            })
            .collect();
        m.list("latest_activity", "Latest Activity", activity);
        m
    }
}
