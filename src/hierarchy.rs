//! Suite and section addressing.
//!
//! Turns the user's selector (suite id, suite name, or section id) plus an
//! optional slash-delimited section path into a concrete sync target.
//! Missing containers are created only under `--create-missing`; under
//! `--dry-run` nothing is created and pending containers come back as
//! explicit would-create values instead of ids.

use std::fmt;

use crate::error::AddressingError;
use crate::testrail::{CaseStore, Section};

/// How the user addressed the target. Exactly one of the three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    SuiteId(u64),
    SuiteName(String),
    SectionId(u64),
}

impl Selector {
    /// Build from the CLI's optional flags, rejecting zero or several
    /// selections before any network traffic.
    pub fn from_flags(
        suite_id: Option<u64>,
        suite_name: Option<&str>,
        section_id: Option<u64>,
    ) -> Result<Self, AddressingError> {
        match (suite_id, suite_name, section_id) {
            (None, None, None) => Err(AddressingError::MissingSelector),
            (Some(id), None, None) => Ok(Selector::SuiteId(id)),
            (None, Some(name), None) => Ok(Selector::SuiteName(name.to_string())),
            (None, None, Some(id)) => Ok(Selector::SectionId(id)),
            _ => Err(AddressingError::ConflictingSelectors),
        }
    }
}

/// A suite that exists, or one a dry run would have created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteRef {
    Existing(u64),
    WouldCreate { name: String },
}

impl fmt::Display for SuiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteRef::Existing(id) => write!(f, "suite {id}"),
            SuiteRef::WouldCreate { name } => write!(f, "new suite {name:?}"),
        }
    }
}

/// A section that exists, or the chain of sections a dry run would have
/// created to reach it. The chain keeps parent links so reporting can show
/// the whole pending path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionRef {
    Existing(u64),
    WouldCreate {
        name: String,
        parent: Option<Box<SectionRef>>,
    },
}

impl SectionRef {
    pub fn existing_id(&self) -> Option<u64> {
        match self {
            SectionRef::Existing(id) => Some(*id),
            SectionRef::WouldCreate { .. } => None,
        }
    }
}

impl fmt::Display for SectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionRef::Existing(id) => write!(f, "section {id}"),
            SectionRef::WouldCreate { name, parent: None } => write!(f, "new section {name:?}"),
            SectionRef::WouldCreate {
                name,
                parent: Some(parent),
            } => write!(f, "new section {name:?} under {parent}"),
        }
    }
}

/// Creation policy for missing containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveMode {
    pub create_missing: bool,
    pub dry_run: bool,
}

/// The resolved target plus warnings collected along the way. Warnings are
/// for the operator; they never stop the run.
#[derive(Debug)]
pub struct ResolvedTarget {
    pub suite: Option<SuiteRef>,
    pub section: SectionRef,
    pub warnings: Vec<String>,
}

impl ResolvedTarget {
    /// Suite id for case listing, when one is concretely known.
    pub fn suite_id(&self) -> Option<u64> {
        match &self.suite {
            Some(SuiteRef::Existing(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Resolve the selector and optional section path to a sync target.
pub fn resolve_target<S: CaseStore>(
    store: &S,
    project_id: u64,
    selector: &Selector,
    section_path: Option<&str>,
    mode: ResolveMode,
) -> Result<ResolvedTarget, AddressingError> {
    let mut warnings = Vec::new();
    let path = split_path(section_path.unwrap_or(""));

    let suite = match selector {
        Selector::SectionId(id) => return resolve_by_section_id(store, *id, &path),
        Selector::SuiteId(id) => SuiteRef::Existing(*id),
        Selector::SuiteName(name) => {
            resolve_suite_by_name(store, project_id, name, mode)?
        }
    };

    let suite_id = match &suite {
        SuiteRef::Existing(id) => *id,
        SuiteRef::WouldCreate { name } => {
            // A suite that does not exist yet has no sections; the whole
            // path becomes a pending chain.
            let Some(section) = would_create_chain(&path) else {
                return Err(AddressingError::NoSections {
                    suite: format!("{name:?}"),
                });
            };
            return Ok(ResolvedTarget {
                suite: Some(suite),
                section,
                warnings,
            });
        }
    };

    let mut sections = store.list_sections(project_id, suite_id)?;
    let section = if path.is_empty() {
        pick_default_section(&sections, suite_id, &mut warnings)?
    } else if path.len() == 1 {
        resolve_single_segment(store, project_id, suite_id, &mut sections, &path[0], mode)?
    } else {
        walk_path(store, project_id, suite_id, &mut sections, &path, mode)?
    };

    Ok(ResolvedTarget {
        suite: Some(suite),
        section,
        warnings,
    })
}

/// A direct section id is used as-is. The parent suite lookup is best
/// effort; the id alone is enough for case operations.
fn resolve_by_section_id<S: CaseStore>(
    store: &S,
    section_id: u64,
    path: &[String],
) -> Result<ResolvedTarget, AddressingError> {
    let mut warnings = Vec::new();
    if !path.is_empty() {
        warnings.push("--section-path is ignored when --section-id is given".to_string());
    }
    let suite = match store.get_section(section_id) {
        Ok(section) => section.suite_id.map(SuiteRef::Existing),
        Err(err) => {
            warnings.push(format!(
                "could not resolve the parent suite of section {section_id}: {err}"
            ));
            None
        }
    };
    Ok(ResolvedTarget {
        suite,
        section: SectionRef::Existing(section_id),
        warnings,
    })
}

fn resolve_suite_by_name<S: CaseStore>(
    store: &S,
    project_id: u64,
    name: &str,
    mode: ResolveMode,
) -> Result<SuiteRef, AddressingError> {
    let suites = store.list_suites(project_id)?;
    let wanted = normalize_name(name);
    if let Some(hit) = suites.iter().find(|suite| normalize_name(&suite.name) == wanted) {
        return Ok(SuiteRef::Existing(hit.id));
    }
    if !mode.create_missing {
        return Err(AddressingError::SuiteNotFound {
            name: name.to_string(),
            project_id,
            available: suites.iter().map(|suite| suite.name.clone()).collect(),
        });
    }
    if mode.dry_run {
        tracing::info!(%name, "dry run: would create suite");
        return Ok(SuiteRef::WouldCreate {
            name: name.to_string(),
        });
    }
    let created = store.create_suite(project_id, name)?;
    tracing::info!(suite_id = created.id, name = %created.name, "created suite");
    Ok(SuiteRef::Existing(created.id))
}

/// No path given: default to the suite's first top-level section, warning
/// when the choice was ambiguous or had to reach below the top level.
fn pick_default_section(
    sections: &[Section],
    suite_id: u64,
    warnings: &mut Vec<String>,
) -> Result<SectionRef, AddressingError> {
    let top_level: Vec<&Section> = sections
        .iter()
        .filter(|section| section.parent_id.is_none())
        .collect();
    if let Some(first) = top_level.first() {
        if top_level.len() > 1 {
            warnings.push(format!(
                "suite {suite_id} has {} top-level sections; defaulting to {:?}; pass --section-path to pick another",
                top_level.len(),
                first.name
            ));
        }
        return Ok(SectionRef::Existing(first.id));
    }
    match sections.first() {
        Some(first) => {
            warnings.push(format!(
                "suite {suite_id} has no top-level sections; falling back to {:?}",
                first.name
            ));
            Ok(SectionRef::Existing(first.id))
        }
        None => Err(AddressingError::NoSections {
            suite: suite_id.to_string(),
        }),
    }
}

/// A single path segment matches top-level sections first, then any section
/// at any depth.
fn resolve_single_segment<S: CaseStore>(
    store: &S,
    project_id: u64,
    suite_id: u64,
    sections: &mut Vec<Section>,
    segment: &str,
    mode: ResolveMode,
) -> Result<SectionRef, AddressingError> {
    let wanted = normalize_name(segment);
    if let Some(hit) = sections
        .iter()
        .find(|s| s.parent_id.is_none() && normalize_name(&s.name) == wanted)
    {
        return Ok(SectionRef::Existing(hit.id));
    }
    if let Some(hit) = sections.iter().find(|s| normalize_name(&s.name) == wanted) {
        tracing::debug!(section_id = hit.id, name = %hit.name, "matched section below top level");
        return Ok(SectionRef::Existing(hit.id));
    }
    let available = sections.iter().map(|s| s.name.clone()).collect();
    create_or_fail(
        store, project_id, suite_id, sections, segment, None, &[], mode, available,
    )
}

/// Multi-segment paths walk strictly from the top level, matching each
/// segment among the children of the previous one.
fn walk_path<S: CaseStore>(
    store: &S,
    project_id: u64,
    suite_id: u64,
    sections: &mut Vec<Section>,
    path: &[String],
    mode: ResolveMode,
) -> Result<SectionRef, AddressingError> {
    let mut walked: Vec<String> = Vec::new();
    let mut current = step_segment(
        store, project_id, suite_id, sections, &path[0], None, &walked, mode,
    )?;
    walked.push(path[0].clone());
    for segment in &path[1..] {
        current = step_segment(
            store,
            project_id,
            suite_id,
            sections,
            segment,
            Some(&current),
            &walked,
            mode,
        )?;
        walked.push(segment.clone());
    }
    Ok(current)
}

#[allow(clippy::too_many_arguments)]
fn step_segment<S: CaseStore>(
    store: &S,
    project_id: u64,
    suite_id: u64,
    sections: &mut Vec<Section>,
    segment: &str,
    parent: Option<&SectionRef>,
    walked: &[String],
    mode: ResolveMode,
) -> Result<SectionRef, AddressingError> {
    let wanted = normalize_name(segment);
    let parent_pending = matches!(parent, Some(SectionRef::WouldCreate { .. }));
    let parent_id = parent.and_then(SectionRef::existing_id);

    if !parent_pending {
        if let Some(hit) = sections
            .iter()
            .find(|s| s.parent_id == parent_id && normalize_name(&s.name) == wanted)
        {
            return Ok(SectionRef::Existing(hit.id));
        }
    }
    let available = if parent_pending {
        // Children of a section that does not exist yet cannot match.
        Vec::new()
    } else {
        sections
            .iter()
            .filter(|s| s.parent_id == parent_id)
            .map(|s| s.name.clone())
            .collect()
    };
    create_or_fail(
        store, project_id, suite_id, sections, segment, parent, walked, mode, available,
    )
}

#[allow(clippy::too_many_arguments)]
fn create_or_fail<S: CaseStore>(
    store: &S,
    project_id: u64,
    suite_id: u64,
    sections: &mut Vec<Section>,
    segment: &str,
    parent: Option<&SectionRef>,
    walked: &[String],
    mode: ResolveMode,
    available: Vec<String>,
) -> Result<SectionRef, AddressingError> {
    if !mode.create_missing {
        return Err(AddressingError::SegmentNotFound {
            segment: segment.to_string(),
            walked: walked.join("/"),
            available,
        });
    }
    if mode.dry_run {
        return Ok(SectionRef::WouldCreate {
            name: segment.to_string(),
            parent: parent.cloned().map(Box::new),
        });
    }
    let parent_id = parent.and_then(SectionRef::existing_id);
    let created = store.create_section(project_id, suite_id, segment, parent_id)?;
    tracing::info!(
        section_id = created.id,
        name = %created.name,
        parent_id = ?created.parent_id,
        "created section"
    );
    // Later segments must see it without another fetch.
    sections.push(created.clone());
    Ok(SectionRef::Existing(created.id))
}

/// Pending chain for a path under a suite that does not exist yet. `None`
/// when the path is empty.
fn would_create_chain(path: &[String]) -> Option<SectionRef> {
    let mut current: Option<SectionRef> = None;
    for segment in path {
        current = Some(SectionRef::WouldCreate {
            name: segment.clone(),
            parent: current.map(Box::new),
        });
    }
    current
}

/// Split a section path on `/`, dropping empty segments.
fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Matching key for container names: case-insensitive with whitespace runs
/// collapsed.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
