//! Field-level source reconciliation.
//!
//! Every source is fetched concurrently and the resolver waits for all of
//! them. Sources are then walked in rank order per field: the first source
//! that answered, offers a non-empty value for the field, and whose value fits
//! the section type wins. Nothing is merged across sources within a field.
//!
//! Two exceptions keep summaries honest. A section pinned Manual is read
//! only from sources that serve the persisted page, starting with the one
//! that supplied the flags. An Auto summary that arrived from an older
//! source than its records is re-derived from those records.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::error::SourceError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::pages::Page;
use crate::source::{SourceKind, SourceSpec, OVERRIDES_FIELD};
use crate::state::{is_empty_value, sections_map, Overrides, PageState};

/// Where a resolved section came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "source", rename_all = "snake_case")]
pub enum Origin {
    Source(String),
    Derived,
    Default,
}

#[derive(Debug, Clone)]
pub struct Resolution<S> {
    pub state: PageState<S>,
    pub provenance: BTreeMap<&'static str, Origin>,
}

impl<S> Resolution<S> {
    pub fn origin(&self, field: &str) -> Option<&Origin> {
        self.provenance.get(field)
    }

    /// Labels of sources that contributed at least one field.
    pub fn contributing_sources(&self) -> BTreeSet<&str> {
        self.provenance
            .values()
            .filter_map(|o| match o {
                Origin::Source(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }
}

async fn fetch_one(spec: &SourceSpec, timeout: Duration) -> Result<Value, SourceError> {
    match tokio::time::timeout(timeout, spec.fetcher.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Build the best achievable state for `page` from `sources`. Never fails:
/// a field no source can supply is derived when derivable, else defaulted.
pub async fn resolve<P: Page>(
    page: &P,
    sources: Vec<SourceSpec>,
    timeout: Duration,
) -> Resolution<P::Sections> {
    let _scope = ProfileScope::with_context(
        "resolve",
        &[("page", v_str(P::DOMAIN)), ("sources", v_num(sources.len() as f64))],
    );

    let results = join_all(sources.iter().map(|s| fetch_one(s, timeout))).await;
    let mut outcomes: Vec<(SourceSpec, Result<Value, SourceError>)> =
        sources.into_iter().zip(results).collect();
    // stable: equal ranks keep declaration order
    outcomes.sort_by_key(|(spec, _)| spec.rank);

    let mut answered: Vec<(&SourceSpec, &Value)> = Vec::new();
    for (spec, result) in &outcomes {
        match result {
            Ok(payload) => {
                log(
                    Level::Debug,
                    Domain::Source,
                    "source_ok",
                    obj(&[
                        ("page", v_str(P::DOMAIN)),
                        ("source", v_str(&spec.label)),
                        ("kind", v_str(spec.kind.as_str())),
                        ("rank", v_num(spec.rank as f64)),
                        ("target", v_str(&spec.fetcher.describe())),
                    ]),
                );
                answered.push((spec, payload));
            }
            Err(e) => log(
                Level::Debug,
                Domain::Source,
                "source_failed",
                obj(&[
                    ("page", v_str(P::DOMAIN)),
                    ("source", v_str(&spec.label)),
                    ("kind", v_str(spec.kind.as_str())),
                    ("error_kind", v_str(e.kind())),
                    ("error", v_str(&e.to_string())),
                    ("target", v_str(&spec.fetcher.describe())),
                ]),
            ),
        }
    }

    let (overrides, holder) = pick_overrides(&answered);

    let mut sections = P::Sections::default();
    let mut provenance = BTreeMap::new();
    let mut picked: BTreeMap<&'static str, &SourceSpec> = BTreeMap::new();
    let mut missing = BTreeSet::new();

    for &field in P::FIELDS {
        let found = if P::is_derived(field) && overrides.is_manual(field) {
            pick_field::<P>(&mut sections, field, &pinned_order(&answered, holder))
        } else {
            pick_field::<P>(&mut sections, field, &answered)
        };
        match found {
            Some(spec) => {
                provenance.insert(field, Origin::Source(spec.label.clone()));
                picked.insert(field, spec);
            }
            None => {
                missing.insert(field);
                provenance.insert(field, Origin::Default);
            }
        }
    }

    for field in page.derive_missing(&mut sections, &missing) {
        provenance.insert(field, Origin::Derived);
    }

    // An Auto summary is only trusted when it is at least as fresh as its records.
    for d in P::DERIVED {
        if overrides.is_manual(d.section) {
            continue;
        }
        let (Some(summary), Some(records)) = (picked.get(d.section), picked.get(d.depends_on)) else {
            continue;
        };
        if older_than(summary, records) {
            page.recompute(&mut sections, d.section);
            provenance.insert(d.section, Origin::Derived);
            log(
                Level::Debug,
                Domain::Resolve,
                "summary_rederived",
                obj(&[
                    ("page", v_str(P::DOMAIN)),
                    ("section", v_str(d.section)),
                    ("summary_source", v_str(&summary.label)),
                    ("records_source", v_str(&records.label)),
                ]),
            );
        }
    }

    for (field, origin) in &provenance {
        log(
            Level::Debug,
            Domain::Resolve,
            "field_resolved",
            obj(&[
                ("page", v_str(P::DOMAIN)),
                ("section", v_str(field)),
                ("origin", serde_json::to_value(origin).unwrap_or(Value::Null)),
            ]),
        );
    }

    Resolution { state: PageState { sections, overrides }, provenance }
}

fn pick_field<'a, P: Page>(
    sections: &mut P::Sections,
    field: &'static str,
    answered: &[(&'a SourceSpec, &'a Value)],
) -> Option<&'a SourceSpec> {
    for (spec, payload) in answered {
        for candidate in spec.candidates(field, payload) {
            match P::with_section(sections, field, candidate) {
                Ok(next) if coerced_empty(&next, field) => log(
                    Level::Debug,
                    Domain::Resolve,
                    "candidate_rejected",
                    obj(&[
                        ("page", v_str(P::DOMAIN)),
                        ("section", v_str(field)),
                        ("source", v_str(&spec.label)),
                        ("reason", v_str("empty after coercion")),
                    ]),
                ),
                Ok(next) => {
                    *sections = next;
                    return Some(*spec);
                }
                Err(reason) => log(
                    Level::Debug,
                    Domain::Resolve,
                    "candidate_rejected",
                    obj(&[
                        ("page", v_str(P::DOMAIN)),
                        ("section", v_str(field)),
                        ("source", v_str(&spec.label)),
                        ("reason", v_str(&reason)),
                    ]),
                ),
            }
        }
    }
    None
}

/// A payload such as `{"error": "..."}` type-checks as a default section.
fn coerced_empty<S: Serialize>(sections: &S, field: &str) -> bool {
    sections_map(sections).get(field).map(is_empty_value).unwrap_or(true)
}

/// Override flags and the index of the source that supplied them.
fn pick_overrides(answered: &[(&SourceSpec, &Value)]) -> (Overrides, Option<usize>) {
    answered
        .iter()
        .enumerate()
        .find_map(|(i, (spec, payload))| {
            spec.candidates(OVERRIDES_FIELD, payload)
                .into_iter()
                .find_map(|v| serde_json::from_value::<Overrides>(v).ok())
                .map(|o| (o, Some(i)))
        })
        .unwrap_or_default()
}

/// Sources eligible for a pinned section: the one holding the flags first,
/// then any other persisted-state source. Computed views are skipped.
fn pinned_order<'a>(
    answered: &[(&'a SourceSpec, &'a Value)],
    holder: Option<usize>,
) -> Vec<(&'a SourceSpec, &'a Value)> {
    let first = holder.and_then(|i| answered.get(i)).copied();
    first
        .into_iter()
        .chain(
            answered
                .iter()
                .enumerate()
                .filter(|(i, (spec, _))| Some(*i) != holder && spec.carries_page_state())
                .map(|(_, entry)| *entry),
        )
        .collect()
}

/// A summary from a lower-ranked source, or from a local copy while the
/// records came from a remote, predates those records.
fn older_than(summary: &SourceSpec, records: &SourceSpec) -> bool {
    summary.rank > records.rank || (summary.kind != SourceKind::Remote && records.kind == SourceKind::Remote)
}
