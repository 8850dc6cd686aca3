//! Publications page: the bibliography plus citation metrics, the most
//! cited papers and research topics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{self, count, pick, text};
use crate::config::Limits;
use crate::metrics::{self, Direction, I10_THRESHOLD};
use crate::pages::{Derived, Page};
use crate::render::{fmt_count, or_dash, DisplayModel, ListItem, Tone};
use crate::source::{Endpoints, Extractor, SourceSpec};
use crate::state::PageState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Publication {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub journal: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub year: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doi: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub tags: Vec<String>,
    pub citations: u64,
}

/// Authors arrive as a list or as one comma-separated string.
fn authors(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        other => coerce::tags(other),
    }
}

impl From<Map<String, Value>> for Publication {
    fn from(m: Map<String, Value>) -> Self {
        Publication {
            title: text(pick(&m, &["title"])).trim().to_string(),
            authors: authors(pick(&m, &["authors", "author"])),
            journal: text(pick(&m, &["journal", "venue", "conference"])).trim().to_string(),
            year: text(pick(&m, &["year"])),
            doi: text(pick(&m, &["doi"])).trim().to_string(),
            url: text(pick(&m, &["url", "link"])).trim().to_string(),
            tags: coerce::tags(pick(&m, &["tags", "topics"])),
            citations: count(pick(&m, &["citations", "cited_by", "citedBy"])),
        }
    }
}

impl Publication {
    pub fn link(&self) -> Option<String> {
        if !self.url.is_empty() {
            Some(self.url.clone())
        } else if !self.doi.is_empty() {
            Some(format!("https://doi.org/{}", self.doi))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationMetrics {
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub total_pubs: u64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub total_cites: u64,
    #[serde(default, deserialize_with = "coerce::de_money")]
    pub avg_cites: f64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub h_index: u64,
    #[serde(default, deserialize_with = "coerce::de_count")]
    pub i10_index: u64,
}

pub fn derive_metrics(pubs: &[Publication]) -> CitationMetrics {
    let cites: Vec<u64> = pubs.iter().map(|p| p.citations).collect();
    let total_cites: u64 = cites.iter().sum();
    CitationMetrics {
        total_pubs: pubs.len() as u64,
        total_cites,
        avg_cites: metrics::average(total_cites as f64, pubs.len(), 1),
        h_index: metrics::h_index(&cites),
        i10_index: metrics::count_at_least(pubs, |p| p.citations as f64, I10_THRESHOLD) as u64,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationsSections {
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub metrics: CitationMetrics,
    #[serde(default)]
    pub top_cited: Vec<Publication>,
    #[serde(default, deserialize_with = "coerce::de_tags")]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublicationsPage {
    limits: Limits,
}

impl PublicationsPage {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

impl Page for PublicationsPage {
    type Sections = PublicationsSections;

    const DOMAIN: &'static str = "publications";
    const FIELDS: &'static [&'static str] = &["publications", "metrics", "topCited", "topics"];
    const DERIVED: &'static [Derived] = &[
        Derived { section: "metrics", depends_on: "publications" },
        Derived { section: "topCited", depends_on: "publications" },
        Derived { section: "topics", depends_on: "publications" },
    ];

    fn sources(&self, ep: &Endpoints) -> Vec<SourceSpec> {
        vec![
            ep.remote("publications", 0, "publications")
                .rule("publications", Extractor::KeyOrBare("publications"))
                .mirror_fields(&["metrics", "topCited", "topics"]),
            ep.cache(Self::DOMAIN, 1).mirror_fields(Self::FIELDS),
            ep.static_file(Self::DOMAIN, 2)
                .rule("publications", Extractor::KeyOrBare("publications"))
                .mirror_fields(Self::FIELDS),
        ]
    }

    fn recompute(&self, s: &mut PublicationsSections, section: &str) {
        match section {
            "metrics" => s.metrics = derive_metrics(&s.publications),
            "topCited" => {
                s.top_cited =
                    metrics::top_k(&s.publications, |p| p.citations as f64, self.limits.top_k, Direction::Largest)
            }
            "topics" => s.topics = metrics::frequency_tags(&s.publications, |p| &p.tags, self.limits.topic_cap),
            _ => {}
        }
    }

    fn validate(&self, s: &mut PublicationsSections) {
        s.publications.retain(|p| !p.title.is_empty());
        s.top_cited.retain(|p| !p.title.is_empty());
        s.topics.retain(|t| !t.trim().is_empty());
    }

    fn project(&self, state: &PageState<PublicationsSections>) -> DisplayModel {
        let s = &state.sections;
        let pinned = state.overrides.is_manual("metrics");
        let mut m = DisplayModel::new(Self::DOMAIN);

        m.tile("total_pubs", "Publications", fmt_count(s.metrics.total_pubs), Tone::Info).manual = pinned;
        m.tile("total_cites", "Citations", fmt_count(s.metrics.total_cites), Tone::Info).manual = pinned;
        m.tile("avg_cites", "Avg. Citations", format!("{:.1}", s.metrics.avg_cites), Tone::Neutral).manual = pinned;
        m.tile("h_index", "h-index", s.metrics.h_index.to_string(), Tone::Positive).manual = pinned;
        m.tile("i10_index", "i10-index", s.metrics.i10_index.to_string(), Tone::Positive).manual = pinned;

        let entry = |p: &Publication| {
            let meta: Vec<String> = [p.authors.join(", "), p.journal.clone(), p.year.clone()]
                .into_iter()
                .filter(|x| !x.is_empty())
                .collect();
            let badge = if p.citations > 0 { format!("{} citations", p.citations) } else { or_dash("") };
            let mut item = ListItem::text(if p.title.is_empty() { "Untitled".to_string() } else { p.title.clone() })
                .detail(meta.join(" • "))
                .badge(badge, Tone::Info);
            if let Some(link) = p.link() {
                item.detail = Some(match item.detail.take() {
                    Some(d) => format!("{} • {}", d, link),
                    None => link,
                });
            }
            item
        };

        m.list("publications", "Publications", s.publications.iter().map(entry).collect());
        m.list("top_cited", "Top Cited", s.top_cited.iter().map(entry).collect()).manual =
            state.overrides.is_manual("topCited");
        m.list("topics", "Research Topics", s.topics.iter().map(ListItem::text).collect()).manual =
            state.overrides.is_manual("topics");
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pubs(cites: &[u64]) -> Vec<Publication> {
        cites
            .iter()
            .enumerate()
            .map(|(i, c)| Publication { title: format!("P{}", i), citations: *c, ..Default::default() })
            .collect()
    }

    #[test]
    fn metrics_reference_example() {
        let m = derive_metrics(&pubs(&[10, 8, 5, 4, 3, 2, 1]));
        assert_eq!(m.h_index, 4);
        assert_eq!(m.i10_index, 1);
        assert_eq!(m.total_pubs, 7);
        assert_eq!(m.total_cites, 33);
        assert_eq!(m.avg_cites, 4.7);
    }

    #[test]
    fn metrics_of_nothing_are_zero() {
        assert_eq!(derive_metrics(&[]), CitationMetrics::default());
    }

    #[test]
    fn publication_wire_variants() {
        let p: Publication = serde_json::from_value(json!({
            "title": "Deep Reefs",
            "authors": "A. Lovelace, C. Babbage",
            "venue": "Nature",
            "year": 2021,
            "doi": "10.1/xyz",
            "topics": ["reefs"],
            "citations": "12",
        }))
        .unwrap();
        assert_eq!(p.authors, vec!["A. Lovelace", "C. Babbage"]);
        assert_eq!(p.journal, "Nature");
        assert_eq!(p.year, "2021");
        assert_eq!(p.tags, vec!["reefs"]);
        assert_eq!(p.citations, 12);
        assert_eq!(p.link().as_deref(), Some("https://doi.org/10.1/xyz"));
    }

    #[test]
    fn top_cited_and_topics_follow_limits() {
        let page = PublicationsPage::new(Limits { top_k: 2, topic_cap: 2, ..Limits::default() });
        let mut s = PublicationsSections { publications: pubs(&[1, 9, 9, 4]), ..Default::default() };
        s.publications[0].tags = vec!["a".into(), "b".into()];
        s.publications[1].tags = vec!["b".into(), "c".into()];
        page.recompute(&mut s, "topCited");
        page.recompute(&mut s, "topics");
        let titles: Vec<_> = s.top_cited.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["P1", "P2"]);
        assert_eq!(s.topics, vec!["a", "b"]);
    }

    #[test]
    fn projection_shows_metrics() {
        let page = PublicationsPage::default();
        let mut state = PageState::<PublicationsSections>::default();
        state.sections.publications = pubs(&[10, 8, 5, 4, 3, 2, 1]);
        page.recompute(&mut state.sections, "metrics");
        let model = page.project(&state);
        assert_eq!(model.find_tile("h_index").unwrap().value, "4");
        assert_eq!(model.find_tile("avg_cites").unwrap().value, "4.7");
        assert_eq!(model.find_list("publications").unwrap().items.len(), 7);
    }
}
