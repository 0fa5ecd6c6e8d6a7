//! One sync run, end to end: fetch the ticket, parse scenarios, resolve the
//! target container, plan, execute.
//!
//! Failures before the plan executes (bad addressing, unreachable services,
//! unreadable ticket) abort the run. Failures while executing the plan are
//! recorded per action and the run continues, so one rejected case never
//! blocks the rest.

use anyhow::{bail, Context, Result};

use crate::hierarchy::{self, ResolveMode, Selector, SectionRef};
use crate::jira::TicketSource;
use crate::reconcile::{self, ReconcilePlan};
use crate::scenario;
use crate::testrail::CaseStore;

/// Inputs for one sync run, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub ticket_key: String,
    pub project_id: u64,
    pub suite_id: Option<u64>,
    pub suite_name: Option<String>,
    pub section_id: Option<u64>,
    pub section_path: Option<String>,
    pub create_missing: bool,
    pub dry_run: bool,
}

/// Counters and per-action failures from one run. `skipped` counts actions
/// that failed; each has a matching entry in `errors`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// How the plan gets applied: for real against a concrete section, or as a
/// counted simulation.
enum Execution {
    Apply { section_id: u64 },
    DryRun,
}

pub fn run_sync<T: TicketSource, S: CaseStore>(
    tickets: &T,
    store: &S,
    options: &SyncOptions,
) -> Result<RunSummary> {
    let selector = Selector::from_flags(
        options.suite_id,
        options.suite_name.as_deref(),
        options.section_id,
    )?;

    let ticket = tickets
        .fetch_ticket(&options.ticket_key)
        .with_context(|| format!("fetch ticket {}", options.ticket_key))?;
    tracing::info!(key = %ticket.key, summary = %ticket.summary, "fetched ticket");

    let scenarios = scenario::parse_scenarios(&ticket.description);
    let mut summary = RunSummary {
        found: scenarios.len(),
        ..RunSummary::default()
    };
    if scenarios.is_empty() {
        // Degraded parse: stopping here means a wording change in the ticket
        // can never cascade into deleting every previously synced case.
        tracing::warn!(
            key = %ticket.key,
            "no scenarios found; expected \"Scenario N: <title>\" blocks with Given/When/Then steps, or bare When/Then step groups"
        );
        return Ok(summary);
    }
    tracing::info!(count = scenarios.len(), "parsed scenarios");

    let mode = ResolveMode {
        create_missing: options.create_missing,
        dry_run: options.dry_run,
    };
    let target = hierarchy::resolve_target(
        store,
        options.project_id,
        &selector,
        options.section_path.as_deref(),
        mode,
    )
    .context("resolve target suite/section")?;
    for warning in &target.warnings {
        tracing::warn!("{warning}");
    }
    match &target.suite {
        Some(suite) => tracing::info!(section = %target.section, suite = %suite, "resolved sync target"),
        None => tracing::info!(section = %target.section, "resolved sync target"),
    }

    let existing = match &target.section {
        SectionRef::Existing(section_id) => {
            let listed = store
                .list_cases(options.project_id, target.suite_id(), *section_id)
                .context("list existing cases")?;
            // The store's section filter includes child sections; only the
            // resolved section itself is managed.
            listed
                .into_iter()
                .filter(|case| {
                    case.section_id.is_none() || case.section_id == Some(*section_id)
                })
                .collect()
        }
        // A section that does not exist yet holds no cases.
        SectionRef::WouldCreate { .. } => Vec::new(),
    };
    let managed = reconcile::managed_subset(&existing, &ticket.key);
    tracing::debug!(
        existing = existing.len(),
        managed = managed.len(),
        "listed store cases"
    );

    let plan = reconcile::build_plan(&scenarios, &managed, &ticket);
    tracing::info!(
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        dry_run = options.dry_run,
        "computed plan"
    );

    let execution = if options.dry_run {
        Execution::DryRun
    } else {
        match target.section.existing_id() {
            Some(section_id) => Execution::Apply { section_id },
            None => bail!("target section is pending creation outside a dry run"),
        }
    };
    execute_plan(store, &execution, &plan, &mut summary);
    Ok(summary)
}

fn execute_plan<S: CaseStore>(
    store: &S,
    execution: &Execution,
    plan: &ReconcilePlan,
    summary: &mut RunSummary,
) {
    for action in &plan.to_create {
        let title = &action.payload.title;
        match execution {
            Execution::DryRun => {
                tracing::info!(%title, "dry run: would create case");
                summary.created += 1;
            }
            Execution::Apply { section_id } => {
                match store.create_case(*section_id, &action.payload) {
                    Ok(case) => {
                        tracing::info!(case_id = case.id, %title, "created case");
                        summary.created += 1;
                    }
                    Err(err) => record_failure(summary, &format!("create {title:?}"), &err),
                }
            }
        }
    }

    for action in &plan.to_update {
        let title = &action.payload.title;
        match execution {
            Execution::DryRun => {
                tracing::info!(case_id = action.case_id, %title, "dry run: would update case");
                summary.updated += 1;
            }
            Execution::Apply { .. } => match store.update_case(action.case_id, &action.payload) {
                Ok(_) => {
                    tracing::info!(case_id = action.case_id, %title, "updated case");
                    summary.updated += 1;
                }
                Err(err) => record_failure(summary, &format!("update {title:?}"), &err),
            },
        }
    }

    for action in &plan.to_delete {
        match execution {
            Execution::DryRun => {
                tracing::info!(case_id = action.case_id, title = %action.title, "dry run: would delete case");
                summary.deleted += 1;
            }
            Execution::Apply { .. } => match store.delete_case(action.case_id) {
                Ok(()) => {
                    tracing::info!(case_id = action.case_id, title = %action.title, "deleted case");
                    summary.deleted += 1;
                }
                Err(err) => record_failure(summary, &format!("delete {:?}", action.title), &err),
            },
        }
    }
}

fn record_failure(summary: &mut RunSummary, what: &str, err: &crate::error::ApiError) {
    tracing::error!("{what}: {err}");
    summary.errors.push(format!("{what}: {err}"));
    summary.skipped += 1;
}

/// Delete one suite, honoring dry run. The single-suite-mode refusal gets
/// dedicated wording because the operator cannot fix it with credentials.
pub fn run_delete_suite<S: CaseStore>(store: &S, suite_id: u64, dry_run: bool) -> Result<()> {
    if dry_run {
        tracing::info!(suite_id, "dry run: would delete suite");
        return Ok(());
    }
    match store.delete_suite(suite_id) {
        Ok(()) => {
            tracing::info!(suite_id, "deleted suite");
            Ok(())
        }
        Err(err) if err.is_single_suite_mode() => bail!(
            "suite {suite_id} cannot be deleted: the project runs in single suite mode ({err})"
        ),
        Err(err) => Err(err).with_context(|| format!("delete suite {suite_id}")),
    }
}
