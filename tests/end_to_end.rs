//! End-to-end page flows: real source declarations with canned payloads,
//! the sqlite cache, and the edit/commit cycle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use scholardash::config::{Config, Limits};
use scholardash::error::{PersistError, SourceError};
use scholardash::pages::{GrantsPage, Page, ProjectsPage, PublicationsPage};
use scholardash::persist::{NullSink, PersistSink};
use scholardash::resolver::Origin;
use scholardash::session::{Context, Session};
use scholardash::source::{Fetch, SourceSpec};
use scholardash::storage::CacheStore;
use scholardash::store::CommitOutcome;

struct Canned(Option<Value>);

#[async_trait]
impl Fetch for Canned {
    async fn fetch(&self) -> Result<Value, SourceError> {
        self.0.clone().ok_or_else(|| SourceError::Unavailable("canned failure".into()))
    }

    fn describe(&self) -> String {
        "canned".into()
    }
}

/// Replace every remote fetcher with a canned answer keyed by source label.
/// Remote sources without an entry fail; cache and static sources keep
/// their real fetchers.
fn with_remotes(sources: Vec<SourceSpec>, answers: &HashMap<&str, Value>) -> Vec<SourceSpec> {
    sources
        .into_iter()
        .map(|mut spec| {
            if spec.label != "cache" && spec.label != "static" {
                spec.fetcher = Arc::new(Canned(answers.get(spec.label.as_str()).cloned()));
            }
            spec
        })
        .collect()
}

fn context(static_dir: &Path, sink: Arc<dyn PersistSink>) -> Context {
    let config = Config {
        api_base: "http://127.0.0.1:9/api".into(),
        static_base: static_dir.display().to_string(),
        fetch_timeout_ms: 1_000,
        ..Config::default()
    };
    Context::with_parts(config, CacheStore::in_memory("galaxy").unwrap(), sink).unwrap()
}

fn scenario_grants() -> Value {
    json!([
        {"title": "Reef survey", "agency": "NSF", "amountAwarded": 100000, "amountReceived": 50000, "amountSpent": 20000, "awardedAt": "2021-09-01"},
        {"title": "Clinical cohort", "agency": "NIH", "amountAwarded": 200000, "amountReceived": 150000, "amountSpent": 150000, "awardedAt": "2023-02-15"},
    ])
}

async fn grants_session<'a>(ctx: &'a Context, answers: HashMap<&str, Value>) -> Session<'a, GrantsPage> {
    let page = GrantsPage::new(Limits::default());
    let sources = with_remotes(page.sources(&ctx.endpoints().unwrap()), &answers);
    Session::load_from(ctx, page, sources).await
}

#[tokio::test]
async fn grant_totals_from_root_records() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(&ctx, HashMap::from([("grants", json!({"grants": scenario_grants()}))])).await;

    let totals = &session.state().sections.totals;
    assert_eq!(totals.total_awarded, 300000.0);
    assert_eq!(totals.available_budget, 30000.0);
    assert_eq!(session.provenance().get("totals"), Some(&Origin::Derived));
    assert_eq!(session.provenance().get("grants"), Some(&Origin::Source("grants".into())));
}

#[tokio::test]
async fn static_only_grants_still_get_derived_sections() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("grants.json"), json!({"grants": scenario_grants()}).to_string()).unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(&ctx, HashMap::new()).await;

    let s = &session.state().sections;
    assert_eq!(s.grants.len(), 2);
    assert_eq!(s.totals.total_awarded, 300000.0);
    assert_eq!(s.last_awarded.as_ref().map(|g| g.title.as_str()), Some("Clinical cohort"));
    assert_eq!(s.breakdown.total, 300000.0);

    let model = session.display();
    assert_eq!(model.find_tile("total_awarded").unwrap().value, "$300,000");
}

#[tokio::test]
async fn nothing_reachable_gives_empty_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(&ctx, HashMap::new()).await;

    let s = &session.state().sections;
    assert!(s.grants.is_empty());
    assert_eq!(s.totals.total_awarded, 0.0);
    assert!(s.last_awarded.is_none());
    assert!(s.keywords.is_empty());
    assert!(session.display().find_list("grants").unwrap().items.is_empty());
}

#[tokio::test]
async fn granular_endpoint_beats_root() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(
        &ctx,
        HashMap::from([
            ("grants/summary", json!({"totalAwarded": 42, "availableBudget": 7})),
            ("grants", json!({"grants": scenario_grants(), "totals": {"totalAwarded": 1, "availableBudget": 1}})),
        ]),
    )
    .await;

    let totals = &session.state().sections.totals;
    assert_eq!(totals.total_awarded, 42.0);
    assert_eq!(totals.available_budget, 7.0);
    assert_eq!(session.provenance().get("totals"), Some(&Origin::Source("grants/summary".into())));
}

#[tokio::test]
async fn malformed_granular_value_falls_through_to_root() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(
        &ctx,
        HashMap::from([
            ("grants/breakdown", json!({"error": "upstream exploded"})),
            ("grants", json!({
                "grants": scenario_grants(),
                "breakdown": {"categories": [{"label": "NSF", "value": 5}], "total": 5},
            })),
        ]),
    )
    .await;

    let s = &session.state().sections;
    assert_eq!(s.breakdown.total, 5.0);
    assert_eq!(session.provenance().get("breakdown"), Some(&Origin::Source("grants".into())));
}

#[tokio::test]
async fn manual_totals_survive_a_new_grant() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let mut session = grants_session(&ctx, HashMap::from([("grants", json!({"grants": scenario_grants()}))])).await;

    session.apply_edit("totals", json!({"totalAwarded": 999}), true).unwrap();
    session
        .apply_edit(
            "grants",
            json!([
                {"title": "Reef survey", "agency": "NSF", "amountAwarded": 100000},
                {"title": "Clinical cohort", "agency": "NIH", "amountAwarded": 200000},
                {"title": "Fusion pilot", "agency": "DOE", "amountAwarded": 50000},
            ]),
            false,
        )
        .unwrap();
    assert_eq!(session.state().sections.totals.total_awarded, 999.0);
    assert_eq!(session.state().sections.breakdown.total, 350000.0);

    session.set_manual("totals", false).unwrap();
    assert_eq!(session.state().sections.totals.total_awarded, 350000.0);
}

#[tokio::test]
async fn old_cached_totals_do_not_outlive_new_root_records() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    ctx.cache()
        .lock()
        .unwrap()
        .save_page(
            "grants",
            &json!({
                "grants": [{"title": "A", "agency": "NSF", "amountAwarded": 100}],
                "totals": {"totalAwarded": 100},
            }),
            None,
        )
        .unwrap();

    let session = grants_session(
        &ctx,
        HashMap::from([(
            "grants",
            json!({"grants": [
                {"title": "A", "agency": "NSF", "amountAwarded": 100},
                {"title": "B", "agency": "NIH", "amountAwarded": 900},
            ]}),
        )]),
    )
    .await;

    assert_eq!(session.state().sections.grants.len(), 2);
    assert_eq!(session.state().sections.totals.total_awarded, 1000.0);
    assert!(!session.store().is_manual("totals"));
    assert_eq!(session.provenance().get("totals"), Some(&Origin::Derived));
}

#[tokio::test]
async fn pinned_totals_survive_a_reload_over_the_summary_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let session = grants_session(
        &ctx,
        HashMap::from([
            ("grants/summary", json!({"totalAwarded": 300000, "availableBudget": 30000})),
            (
                "grants",
                json!({
                    "grants": scenario_grants(),
                    "totals": {"totalAwarded": 999},
                    "overrides": {"totals": true},
                }),
            ),
        ]),
    )
    .await;

    assert_eq!(session.state().sections.totals.total_awarded, 999.0);
    assert!(session.store().is_manual("totals"));
    assert_eq!(session.provenance().get("totals"), Some(&Origin::Source("grants".into())));
}

#[tokio::test]
async fn cache_is_bypassed_after_a_new_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));

    let first = grants_session(&ctx, HashMap::from([("grants", json!({"grants": scenario_grants()}))])).await;
    assert_eq!(first.state().sections.grants.len(), 2);

    // cache alone answers while the token is unchanged
    let cached = grants_session(&ctx, HashMap::new()).await;
    assert_eq!(cached.state().sections.grants.len(), 2);
    assert_eq!(cached.provenance().get("grants"), Some(&Origin::Source("cache".into())));

    ctx.cache().lock().unwrap().set_ingest_token("cv-2").unwrap();
    let after = grants_session(&ctx, HashMap::new()).await;
    assert!(after.state().sections.grants.is_empty());
}

struct Refusing {
    calls: Mutex<usize>,
}

#[async_trait]
impl PersistSink for Refusing {
    async fn persist(&self, _page: &str, _data: &Value) -> Result<(), PersistError> {
        *self.calls.lock().unwrap() += 1;
        Err(PersistError::Status { status: 500, body: "nope".into() })
    }
}

#[tokio::test]
async fn failed_commit_keeps_the_edit_and_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(Refusing { calls: Mutex::new(0) });
    let ctx = context(dir.path(), sink.clone());
    let mut session = grants_session(&ctx, HashMap::from([("grants", json!({"grants": scenario_grants()}))])).await;

    session.apply_edit("keywords", json!(["oceans", "health"]), true).unwrap();
    let outcome = session.commit().await;
    assert!(matches!(outcome, CommitOutcome::Failed { .. }));
    assert_eq!(*sink.calls.lock().unwrap(), 1);
    assert_eq!(session.state().sections.keywords, vec!["oceans", "health"]);

    let cached = ctx.cache().lock().unwrap().load_page("grants").unwrap().unwrap();
    assert_eq!(cached.payload["keywords"], json!(["oceans", "health"]));
}

#[tokio::test]
async fn untitled_records_are_dropped_on_edit() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let mut session = grants_session(&ctx, HashMap::new()).await;
    session
        .apply_edit("grants", json!([{"title": "  "}, {"title": "Kept", "amountAwarded": 3}]), false)
        .unwrap();
    assert_eq!(session.state().sections.grants.len(), 1);
    assert_eq!(session.state().sections.totals.total_awarded, 3.0);
}

#[tokio::test]
async fn publication_metrics_from_citations() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let page = PublicationsPage::new(Limits::default());
    let pubs: Vec<Value> = [10, 8, 5, 4, 3, 2, 1]
        .iter()
        .enumerate()
        .map(|(i, c)| json!({"title": format!("Paper {}", i), "citations": c}))
        .collect();
    let answers = HashMap::from([("publications", json!({"publications": pubs}))]);
    let sources = with_remotes(page.sources(&ctx.endpoints().unwrap()), &answers);
    let session = Session::load_from(&ctx, page, sources).await;

    let m = &session.state().sections.metrics;
    assert_eq!(m.h_index, 4);
    assert_eq!(m.i10_index, 1);
    assert_eq!(session.state().sections.top_cited.len(), 5);
}

#[tokio::test]
async fn project_status_counts_follow_edits() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(NullSink));
    let page = ProjectsPage;
    let answers = HashMap::from([(
        "projects",
        json!({"projects": [
            {"title": "A", "status": "active"},
            {"title": "B", "status": "On Hold"},
        ]}),
    )]);
    let sources = with_remotes(page.sources(&ctx.endpoints().unwrap()), &answers);
    let mut session = Session::load_from(&ctx, page, sources).await;
    assert_eq!(session.state().sections.status_counts.active, 1);

    session
        .apply_edit(
            "projects",
            json!([{"title": "A", "status": "active"}, {"title": "C", "status": "active"}]),
            false,
        )
        .unwrap();
    assert_eq!(session.state().sections.status_counts.active, 2);
    assert_eq!(session.state().sections.status_counts.on_hold, 0);
}
