//! Live page state with Auto/Manual override flags.
//!
//! Derived sections follow their record collection while Auto. A Manual
//! section keeps whatever a human put there until it is toggled back.

use serde_json::Value;

use crate::error::{EditError, PersistError};
use crate::logging::{log, obj, v_bool, v_str, Domain, Level};
use crate::pages::Page;
use crate::persist::PersistSink;
use crate::state::PageState;

#[derive(Debug)]
pub enum CommitOutcome {
    Persisted { state_hash: String },
    Failed { state_hash: String, error: PersistError },
}

impl CommitOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, CommitOutcome::Persisted { .. })
    }

    pub fn state_hash(&self) -> &str {
        match self {
            CommitOutcome::Persisted { state_hash } | CommitOutcome::Failed { state_hash, .. } => state_hash,
        }
    }
}

pub struct Store<P: Page> {
    page: P,
    state: PageState<P::Sections>,
}

impl<P: Page> Store<P> {
    pub fn new(page: P, state: PageState<P::Sections>) -> Self {
        Self { page, state }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn state(&self) -> &PageState<P::Sections> {
        &self.state
    }

    pub fn sections(&self) -> &P::Sections {
        &self.state.sections
    }

    pub fn is_manual(&self, section: &str) -> bool {
        self.state.overrides.is_manual(section)
    }

    /// Replace one section. The value must fit the section's type or the
    /// state is left untouched.
    ///
    /// On a derived section `manual` sets the override flag; `false` hands
    /// the section back to derivation, so the supplied value is replaced by
    /// the recomputed one. On a record collection every Auto dependent is
    /// recomputed.
    pub fn apply_edit(&mut self, section: &str, value: Value, manual: bool) -> Result<(), EditError> {
        if !P::is_field(section) {
            return Err(EditError::UnknownSection(section.to_string()));
        }
        let next = P::with_section(&self.state.sections, section, value).map_err(|reason| {
            log(
                Level::Warn,
                Domain::Store,
                "edit_rejected",
                obj(&[("page", v_str(P::DOMAIN)), ("section", v_str(section)), ("reason", v_str(&reason))]),
            );
            EditError::Rejected { section: section.to_string(), reason }
        })?;
        self.state.sections = next;

        if P::is_derived(section) {
            self.state.overrides.set(section, manual);
        }
        self.page.validate(&mut self.state.sections);

        let mut recomputed: Vec<&str> = self.refresh_dependents(section);
        if P::is_derived(section) && !manual {
            self.page.recompute(&mut self.state.sections, section);
            recomputed.push(section);
        }

        log(
            Level::Info,
            Domain::Store,
            "edit_applied",
            obj(&[
                ("page", v_str(P::DOMAIN)),
                ("section", v_str(section)),
                ("manual", v_bool(manual)),
                ("recomputed", Value::from(recomputed)),
            ]),
        );
        Ok(())
    }

    /// Toggle a derived section between Auto and Manual. Returning to Auto
    /// re-derives it from the current records.
    pub fn set_manual(&mut self, section: &str, manual: bool) -> Result<(), EditError> {
        if !P::is_derived(section) {
            return Err(EditError::UnknownSection(section.to_string()));
        }
        self.state.overrides.set(section, manual);
        if !manual {
            self.page.recompute(&mut self.state.sections, section);
        }
        log(
            Level::Info,
            Domain::Store,
            "override_toggled",
            obj(&[("page", v_str(P::DOMAIN)), ("section", v_str(section)), ("manual", v_bool(manual))]),
        );
        Ok(())
    }

    /// Re-derive one section unless it is pinned. Returns whether it ran.
    pub fn recompute(&mut self, section: &str) -> bool {
        if !P::is_derived(section) || self.is_manual(section) {
            return false;
        }
        self.page.recompute(&mut self.state.sections, section);
        true
    }

    /// Add, remove or update records of `collection` in place, then
    /// re-validate and re-derive every Auto section built from it.
    pub fn mutate<F>(&mut self, collection: &str, f: F) -> Result<(), EditError>
    where
        F: FnOnce(&mut P::Sections),
    {
        if !P::is_field(collection) {
            return Err(EditError::UnknownSection(collection.to_string()));
        }
        f(&mut self.state.sections);
        self.page.validate(&mut self.state.sections);
        let recomputed = self.refresh_dependents(collection);
        log(
            Level::Debug,
            Domain::Store,
            "records_mutated",
            obj(&[
                ("page", v_str(P::DOMAIN)),
                ("collection", v_str(collection)),
                ("recomputed", Value::from(recomputed)),
            ]),
        );
        Ok(())
    }

    /// Hand the current state to `sink`. A failed write is logged and
    /// reported; the local state stays as it is.
    pub async fn commit(&self, sink: &dyn PersistSink) -> CommitOutcome {
        let data = self.state.to_value();
        let state_hash = crate::state::fingerprint(&data);
        match sink.persist(P::DOMAIN, &data).await {
            Ok(()) => {
                log(
                    Level::Info,
                    Domain::Persist,
                    "commit_ok",
                    obj(&[("page", v_str(P::DOMAIN)), ("state_hash", v_str(&state_hash))]),
                );
                CommitOutcome::Persisted { state_hash }
            }
            Err(error) => {
                log(
                    Level::Warn,
                    Domain::Persist,
                    "commit_failed",
                    obj(&[
                        ("page", v_str(P::DOMAIN)),
                        ("state_hash", v_str(&state_hash)),
                        ("error", v_str(&error.to_string())),
                        ("retryable", v_bool(error.is_retryable())),
                    ]),
                );
                CommitOutcome::Failed { state_hash, error }
            }
        }
    }

    fn refresh_dependents(&mut self, collection: &str) -> Vec<&'static str> {
        let mut ran = Vec::new();
        for section in P::dependents(collection) {
            if self.recompute(section) {
                ran.push(section);
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::pages::grants::{Grant, GrantsPage, GrantsSections};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn grant(agency: &str, awarded: f64, received: f64, spent: f64) -> Grant {
        Grant {
            title: format!("{} grant", agency),
            agency: agency.into(),
            amount_awarded: awarded,
            amount_received: received,
            amount_spent: spent,
            ..Default::default()
        }
    }

    fn store() -> Store<GrantsPage> {
        let page = GrantsPage::new(Limits::default());
        let mut state: PageState<GrantsSections> = PageState::default();
        state.sections.grants = vec![grant("NSF", 100000.0, 50000.0, 20000.0), grant("NIH", 200000.0, 150000.0, 150000.0)];
        for d in <GrantsPage as Page>::DERIVED {
            page.recompute(&mut state.sections, d.section);
        }
        Store::new(page, state)
    }

    #[test]
    fn manual_totals_survive_new_records() {
        let mut s = store();
        s.apply_edit("totals", json!({"totalAwarded": 999}), true).unwrap();
        s.mutate("grants", |g| g.grants.push(grant("DOE", 5000.0, 0.0, 0.0))).unwrap();
        assert_eq!(s.sections().totals.total_awarded, 999.0);
        assert!(s.is_manual("totals"));

        s.set_manual("totals", false).unwrap();
        assert_eq!(s.sections().totals.total_awarded, 305000.0);
    }

    #[test]
    fn auto_sections_follow_the_records() {
        let mut s = store();
        s.mutate("grants", |g| g.grants.push(grant("DOE", 5000.0, 1000.0, 0.0))).unwrap();
        assert_eq!(s.sections().totals.total_awarded, 305000.0);
        assert_eq!(s.sections().totals.available_budget, 31000.0);
    }

    #[test]
    fn editing_a_collection_rederives_its_dependents() {
        let mut s = store();
        s.apply_edit("grants", json!([{"title": "Solo", "agency": "NSF", "amountAwarded": 7}]), false)
            .unwrap();
        assert_eq!(s.sections().totals.total_awarded, 7.0);
        assert!(!s.is_manual("grants"));
    }

    #[test]
    fn auto_edit_of_derived_section_is_rederived() {
        let mut s = store();
        s.apply_edit("totals", json!({"totalAwarded": 1}), false).unwrap();
        assert_eq!(s.sections().totals.total_awarded, 300000.0);
    }

    #[test]
    fn bad_edits_leave_state_alone() {
        let mut s = store();
        let before = s.state().clone();
        assert_eq!(
            s.apply_edit("nope", json!(1), true),
            Err(EditError::UnknownSection("nope".into()))
        );
        assert!(matches!(
            s.apply_edit("grants", json!("not a list"), true),
            Err(EditError::Rejected { .. })
        ));
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn untitled_records_are_dropped_on_edit() {
        let mut s = store();
        s.mutate("grants", |g| g.grants.push(grant("", 1.0, 0.0, 0.0))).unwrap();
        s.mutate("grants", |g| g.grants.last_mut().unwrap().title.clear()).unwrap();
        assert_eq!(s.sections().grants.len(), 2);
    }

    #[test]
    fn recompute_is_a_noop_when_pinned() {
        let mut s = store();
        s.set_manual("totals", true).unwrap();
        assert!(!s.recompute("totals"));
        s.set_manual("totals", false).unwrap();
        assert!(s.recompute("totals"));
        assert!(!s.recompute("grants"));
    }

    struct Recording {
        fail: bool,
        seen: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl PersistSink for Recording {
        async fn persist(&self, page: &str, data: &Value) -> Result<(), PersistError> {
            self.seen.lock().unwrap().push((page.to_string(), data.clone()));
            if self.fail {
                Err(PersistError::Status { status: 503, body: "down".into() })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn commit_posts_page_and_state() {
        let mut s = store();
        s.apply_edit("totals", json!({"totalAwarded": 999}), true).unwrap();
        let sink = Recording { fail: false, seen: Mutex::new(Vec::new()) };
        let outcome = s.commit(&sink).await;
        assert!(outcome.is_persisted());
        assert_eq!(outcome.state_hash(), s.state().fingerprint());
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen[0].0, "grants");
        assert_eq!(seen[0].1["overrides"]["totals"], json!(true));
    }

    #[tokio::test]
    async fn failed_commit_keeps_local_edit() {
        let mut s = store();
        s.apply_edit("totals", json!({"totalAwarded": 999}), true).unwrap();
        let sink = Recording { fail: true, seen: Mutex::new(Vec::new()) };
        let outcome = s.commit(&sink).await;
        assert!(matches!(outcome, CommitOutcome::Failed { .. }));
        assert_eq!(s.sections().totals.total_awarded, 999.0);
    }
}
