//! Researcher profile. Plain lists and maps; nothing here is derived.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::{self, entry_text, pick, text};
use crate::pages::{Derived, Page};
use crate::render::{or_dash, DisplayModel, ListItem, Tone};
use crate::source::{Endpoints, SourceSpec};
use crate::state::PageState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Award {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub year: String,
    pub title: String,
}

impl From<Value> for Award {
    fn from(v: Value) -> Self {
        match &v {
            Value::Object(m) => Award {
                year: text(pick(m, &["year", "date"])),
                title: entry_text(&v).trim().to_string(),
            },
            other => Award { year: String::new(), title: text(other).trim().to_string() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Patent {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub number: String,
    pub inventors: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filed: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
}

impl From<Value> for Patent {
    fn from(v: Value) -> Self {
        let Value::Object(m) = &v else {
            return Patent { title: text(&v).trim().to_string(), ..Default::default() };
        };
        Patent {
            title: text(pick(m, &["title", "name"])).trim().to_string(),
            number: text(pick(m, &["number", "patent_number"])),
            inventors: coerce::tags(pick(m, &["inventors"])),
            filed: text(pick(m, &["filed", "filed_at", "date"])),
            status: text(pick(m, &["status"])),
        }
    }
}

impl Patent {
    pub fn is_pending(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("pending")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSections {
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub name: String,
    #[serde(default, deserialize_with = "coerce::de_text")]
    pub photo_url: String,
    #[serde(default, deserialize_with = "coerce::de_text_map")]
    pub social_media: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub media_mentions: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub research_areas: Vec<String>,
    #[serde(default)]
    pub awards: Vec<Award>,
    #[serde(default)]
    pub patents: Vec<Patent>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub mentors: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub colleagues: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_text_map")]
    pub partners: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub positions: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub affiliations: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub education: Vec<String>,
    #[serde(default, deserialize_with = "coerce::de_entries")]
    pub memberships: Vec<String>,
}

fn tidy(list: &mut Vec<String>) {
    for item in list.iter_mut() {
        *item = item.trim().to_string();
    }
    list.retain(|s| !s.is_empty());
}

fn tidy_map(map: &mut BTreeMap<String, String>) {
    let cleaned: BTreeMap<String, String> = std::mem::take(map)
        .into_iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();
    *map = cleaned;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfilePage;

impl Page for ProfilePage {
    type Sections = ProfileSections;

    const DOMAIN: &'static str = "profile";
    const FIELDS: &'static [&'static str] = &[
        "name",
        "photo_url",
        "social_media",
        "media_mentions",
        "research_areas",
        "awards",
        "patents",
        "mentors",
        "colleagues",
        "partners",
        "positions",
        "affiliations",
        "education",
        "memberships",
    ];
    const DERIVED: &'static [Derived] = &[];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec> {
        vec![
            ep.remote("profile", 0, "profile").mirror_fields(Self::FIELDS),
            ep.cache(Self::DOMAIN, 1).mirror_fields(Self::FIELDS),
            ep.static_file(Self::DOMAIN, 2).mirror_fields(Self::FIELDS),
        ]
    }

    fn recompute(&self, _sections: &mut ProfileSections, _section: &str) {}

    fn validate(&self, s: &mut ProfileSections) {
        s.name = s.name.trim().to_string();
        s.photo_url = s.photo_url.trim().to_string();
        for list in [
            &mut s.media_mentions,
            &mut s.research_areas,
            &mut s.mentors,
            &mut s.colleagues,
            &mut s.positions,
            &mut s.affiliations,
            &mut s.education,
            &mut s.memberships,
        ] {
            tidy(list);
        }
        tidy_map(&mut s.social_media);
        tidy_map(&mut s.partners);
        s.awards.retain(|a| !a.title.is_empty());
        s.patents.retain(|p| !p.title.is_empty());
    }

    fn project(&self, state: &PageState<ProfileSections>) -> DisplayModel {
        let s = &state.sections;
        let mut m = DisplayModel::new(Self::DOMAIN);
        m.tile("name", "Name", or_dash(&s.name), Tone::Neutral).detail =
            (!s.photo_url.is_empty()).then(|| s.photo_url.clone());

        let plain = |items: &[String]| items.iter().map(ListItem::text).collect::<Vec<_>>();
        for (id, title, items) in [
            ("positions", "Positions", &s.positions),
            ("affiliations", "Affiliations", &s.affiliations),
            ("education", "Education", &s.education),
            ("memberships", "Memberships", &s.memberships),
            ("mentors", "Mentors", &s.mentors),
            ("colleagues", "Colleagues", &s.colleagues),
            ("research_areas", "Research Areas", &s.research_areas),
            ("media_mentions", "Media Mentions", &s.media_mentions),
        ] {
            m.list(id, title, plain(items.as_slice()));
        }

        let social = s.social_media.iter().map(|(k, v)| ListItem::text(k).detail(v.clone())).collect();
        m.list("social_media", "Social Media", social);

        let awards = s.awards.iter().map(|a| ListItem::text(&a.title).detail(a.year.clone())).collect();
        m.list("awards", "Awards", awards);

        let patents = s
            .patents
            .iter()
            .map(|p| {
                let tone = if p.is_pending() { Tone::Warning } else { Tone::Positive };
                let item = ListItem::text(&p.title).detail(format!(
                    "No: {} · Inventors: {} · Filed: {}",
                    or_dash(&p.number),
                    or_dash(&p.inventors.join(", ")),
                    or_dash(&p.filed)
                ));
                if p.status.is_empty() {
                    item
                } else {
                    item.badge(p.status.clone(), tone)
                }
            })
            .collect();
        m.list("patents", "Patents", patents);

        let partners = s.partners.iter().map(|(k, v)| ListItem::text(format!("{} {}", v, k))).collect();
        m.list("partners", "Partners", partners);
        m
    }
}
