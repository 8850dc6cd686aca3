//! The five dashboard pages.
//!
//! Each page declares its typed sections, its sources, and which sections
//! are derived from which record collection. The resolver, store and session
//! are generic over [`Page`].

use std::collections::BTreeSet;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::render::DisplayModel;
use crate::source::{Endpoints, SourceSpec};
use crate::state::{sections_map, PageState};

pub mod compliance;
pub mod grants;
pub mod profile;
pub mod projects;
pub mod publications;

pub use compliance::CompliancePage;
pub use grants::GrantsPage;
pub use profile::ProfilePage;
pub use projects::ProjectsPage;
pub use publications::PublicationsPage;

/// A summary section recomputed from one record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub section: &'static str,
    pub depends_on: &'static str,
}

pub trait Page: Send + Sync {
    type Sections: Serialize + DeserializeOwned + Default + Clone + Debug + PartialEq + Send + Sync;

    /// Page name on the wire (`/api/<domain>`, `POST /api/page {page}`).
    const DOMAIN: &'static str;
    /// Section names in wire spelling.
    const FIELDS: &'static [&'static str];
    const DERIVED: &'static [Derived];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec>;

    /// Recompute one derived section from the current records. Unknown or
    /// non-derived sections are left untouched.
    fn recompute(&self, sections: &mut Self::Sections, section: &str);

    /// Edit-time validation: drop records missing required text and
    /// re-establish internal totals. Never fails.
    fn validate(&self, _sections: &mut Self::Sections) {}

    fn project(&self, state: &PageState<Self::Sections>) -> DisplayModel;

    fn is_field(section: &str) -> bool {
        Self::FIELDS.contains(&section)
    }

    fn is_derived(section: &str) -> bool {
        Self::DERIVED.iter().any(|d| d.section == section)
    }

    fn dependents(collection: &str) -> Vec<&'static str> {
        Self::DERIVED
            .iter()
            .filter(|d| d.depends_on == collection)
            .map(|d| d.section)
            .collect()
    }

    /// Fill derivable sections no source supplied. Returns what was derived.
    fn derive_missing(&self, sections: &mut Self::Sections, missing: &BTreeSet<&'static str>) -> Vec<&'static str> {
        let mut derived = Vec::new();
        for d in Self::DERIVED {
            if missing.contains(d.section) {
                self.recompute(sections, d.section);
                derived.push(d.section);
            }
        }
        derived
    }

    /// Replace one section with `value` if it fits the section's type.
    fn with_section(sections: &Self::Sections, field: &str, value: Value) -> Result<Self::Sections, String> {
        let mut map = sections_map(sections);
        map.insert(field.to_string(), value);
        serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Compliance,
    Grants,
    Profile,
    Projects,
    Publications,
}

impl PageKind {
    pub const ALL: [PageKind; 5] = [
        PageKind::Compliance,
        PageKind::Grants,
        PageKind::Profile,
        PageKind::Projects,
        PageKind::Publications,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "compliance" => Some(PageKind::Compliance),
            "grants" => Some(PageKind::Grants),
            "profile" => Some(PageKind::Profile),
            "projects" => Some(PageKind::Projects),
            "publications" => Some(PageKind::Publications),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Compliance => CompliancePage::DOMAIN,
            PageKind::Grants => GrantsPage::DOMAIN,
            PageKind::Profile => ProfilePage::DOMAIN,
            PageKind::Projects => ProjectsPage::DOMAIN,
            PageKind::Publications => PublicationsPage::DOMAIN,
        }
    }
}
