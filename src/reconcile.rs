//! Reconciliation of parsed scenarios against the cases already in the store.
//!
//! The engine is pure: it sees the scenarios, the managed subset of existing
//! cases, and the ticket, and emits a plan of creates, updates, and deletes.
//! Matching is by normalized title; ownership is by ticket back-reference,
//! so cases written by hand or by other tickets are never part of a plan.

use std::collections::{BTreeMap, BTreeSet};

use crate::jira::Ticket;
use crate::scenario::Scenario;
use crate::testrail::TestCase;

/// Store-agnostic case content. The store client translates this into its
/// instance-specific field layout at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePayload {
    pub title: String,
    /// Provenance note carrying the ticket key and browse URL.
    pub preconditions: String,
    pub steps: Vec<String>,
    pub expected: String,
    /// Back-reference written verbatim into the case's refs field.
    pub refs: String,
}

#[derive(Debug, Clone)]
pub struct CreateAction {
    pub payload: CasePayload,
}

#[derive(Debug, Clone)]
pub struct UpdateAction {
    pub case_id: u64,
    pub payload: CasePayload,
}

#[derive(Debug, Clone)]
pub struct DeleteAction {
    pub case_id: u64,
    pub title: String,
}

/// Everything one sync run intends to do, in execution order: creates and
/// updates first, deletes last.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub to_create: Vec<CreateAction>,
    pub to_update: Vec<UpdateAction>,
    pub to_delete: Vec<DeleteAction>,
}

/// The subset of `cases` whose refs field names `ticket_key`. Containment,
/// not equality: a refs field may carry several keys.
pub fn managed_subset(cases: &[TestCase], ticket_key: &str) -> Vec<TestCase> {
    cases
        .iter()
        .filter(|case| {
            case.refs
                .as_deref()
                .is_some_and(|refs| refs.contains(ticket_key))
        })
        .cloned()
        .collect()
}

/// Build the plan for one run. Scenarios keep their discovery order in
/// `to_create` and `to_update`; deletes follow the order cases came back
/// from the store.
pub fn build_plan(scenarios: &[Scenario], managed: &[TestCase], ticket: &Ticket) -> ReconcilePlan {
    let mut existing: BTreeMap<String, &TestCase> = BTreeMap::new();
    for case in managed {
        // First fetched wins when the store holds duplicate titles.
        existing.entry(normalize_title(&case.title)).or_insert(case);
    }

    let mut plan = ReconcilePlan::default();
    let mut parsed_titles: BTreeSet<String> = BTreeSet::new();

    for scenario in scenarios {
        let key = normalize_title(&scenario.name);
        let payload = payload_for(scenario, ticket);
        match existing.get(&key) {
            Some(case) => plan.to_update.push(UpdateAction {
                case_id: case.id,
                payload,
            }),
            None => plan.to_create.push(CreateAction { payload }),
        }
        parsed_titles.insert(key);
    }

    for case in managed {
        if !parsed_titles.contains(&normalize_title(&case.title)) {
            plan.to_delete.push(DeleteAction {
                case_id: case.id,
                title: case.title.clone(),
            });
        }
    }

    plan
}

fn payload_for(scenario: &Scenario, ticket: &Ticket) -> CasePayload {
    CasePayload {
        title: scenario.name.clone(),
        preconditions: format!("Synced from {}\n{}", ticket.key, ticket.url),
        steps: scenario.steps.clone(),
        expected: scenario.expected_result.clone(),
        refs: ticket.key.clone(),
    }
}

/// Matching key for titles: leading/trailing whitespace and case do not
/// count as differences.
fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}
