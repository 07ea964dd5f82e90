//! Research projects and their links to finding aids.
//!
//! A project lists finding-aid file ids; each analysis lists the projects it
//! belongs to. The two sides are separate documents, so every operation that
//! touches both runs as a fixed sequence of single-document writes:
//!
//! - attach: project list first, then the analysis back-reference
//! - detach: project list first, then the analysis back-reference
//! - delete: every analysis first, then the project record
//!
//! Each step is idempotent. A failure part way leaves the links partially
//! updated, and re-running the same operation converges.

use serde::Serialize;

use crate::finding_aid::{self, AnalysisRecord};
use crate::model::{EducationLevel, FindingAid, FindingAidAnalysis, Publication, ResearchProject};
use crate::store::{add_to_set, pull, DocumentStore, Record, RecordId, StoreResult};

pub type ProjectRecord = Record<ResearchProject>;

/// Editable project fields.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ProjectUpdate {
    pub title: String,
    pub description: String,
    pub education_level: EducationLevel,
}

pub fn create(store: &DocumentStore, project: &ResearchProject) -> StoreResult<RecordId> {
    let id = store.insert(project)?;
    tracing::info!(project = %id, title = %project.title, "created research project");
    Ok(id)
}

pub fn get(store: &DocumentStore, id: &RecordId) -> StoreResult<Option<ProjectRecord>> {
    store.get(id)
}

pub fn require(store: &DocumentStore, id: &RecordId) -> StoreResult<ProjectRecord> {
    store.require(id)
}

pub fn list(store: &DocumentStore) -> StoreResult<Vec<ProjectRecord>> {
    store.list()
}

/// Replace title, description and education level. Returns whether
/// anything changed.
pub fn update(store: &DocumentStore, id: &RecordId, changes: &ProjectUpdate) -> StoreResult<bool> {
    store.update(id, |p: &mut ResearchProject| {
        let changed = p.title != changes.title
            || p.description != changes.description
            || p.education_level != changes.education_level;
        p.title = changes.title.clone();
        p.description = changes.description.clone();
        p.education_level = changes.education_level;
        changed
    })
}

/// Add a file id to the project's list. Returns whether it was new.
pub fn add_finding_aid(store: &DocumentStore, id: &RecordId, file_id: &RecordId) -> StoreResult<bool> {
    store.update(id, |p: &mut ResearchProject| {
        add_to_set(&mut p.finding_aid_ids, file_id.clone())
    })
}

/// Remove a file id from the project's list. Returns whether it was there.
pub fn remove_finding_aid(
    store: &DocumentStore,
    id: &RecordId,
    file_id: &RecordId,
) -> StoreResult<bool> {
    store.update(id, |p: &mut ResearchProject| pull(&mut p.finding_aid_ids, file_id))
}

/// Append search results to the project. Returns how many were added.
pub fn add_search_results(
    store: &DocumentStore,
    id: &RecordId,
    results: &[Publication],
) -> StoreResult<usize> {
    store.update(id, |p: &mut ResearchProject| {
        p.search_results.extend_from_slice(results);
        !results.is_empty()
    })?;
    Ok(results.len())
}

/// File records of every finding aid the project lists.
pub fn finding_aids(store: &DocumentStore, id: &RecordId) -> StoreResult<Vec<Record<FindingAid>>> {
    let project = require(store, id)?;
    finding_aid::files_by_ids(store, &project.doc.finding_aid_ids)
}

/// Link a finding aid to a project on both sides.
///
/// Returns whether either side changed.
pub fn attach_finding_aid(
    store: &DocumentStore,
    project_id: &RecordId,
    file_id: &RecordId,
) -> StoreResult<bool> {
    store.require::<FindingAid>(file_id)?;
    let listed = add_finding_aid(store, project_id, file_id)?;
    let linked = store.update_many::<FindingAidAnalysis>(
        |a| a.file_id == *file_id,
        |a| add_to_set(&mut a.project_ids, project_id.clone()),
    )?;
    tracing::debug!(project = %project_id, file = %file_id, listed, linked, "attached finding aid");
    Ok(listed || linked > 0)
}

/// Unlink a finding aid from a project on both sides.
///
/// Returns whether the project listed the finding aid. Analyses of the file
/// are unlinked either way.
pub fn detach_finding_aid(
    store: &DocumentStore,
    project_id: &RecordId,
    file_id: &RecordId,
) -> StoreResult<bool> {
    let listed = remove_finding_aid(store, project_id, file_id)?;
    let unlinked = store.update_many::<FindingAidAnalysis>(
        |a| a.file_id == *file_id && a.project_ids.contains(project_id),
        |a| pull(&mut a.project_ids, project_id),
    )?;
    tracing::debug!(project = %project_id, file = %file_id, listed, unlinked, "detached finding aid");
    Ok(listed)
}

/// What a project deletion did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectDeletion {
    /// Analyses removed because this was their only project.
    pub analyses_deleted: usize,
    /// Analyses that stay, linked to other projects.
    pub analyses_unlinked: usize,
    /// File records removed along with deleted analyses.
    pub files_deleted: usize,
}

/// Delete a project and fan out to every analysis referencing it.
///
/// Analyses whose only project this is are deleted together with their file
/// record and stored file; the rest lose the link. The project record goes
/// last, so an error part way leaves it in place and the call can be
/// retried. File cleanup is best effort and never aborts the deletion.
pub fn delete(store: &DocumentStore, project_id: &RecordId) -> StoreResult<ProjectDeletion> {
    require(store, project_id)?;

    let mut report = ProjectDeletion::default();
    for analysis in finding_aid::list_by_project(store, project_id)? {
        let sole_project = analysis.doc.project_ids.iter().all(|p| p == project_id);
        if sole_project {
            finding_aid::delete(store, &analysis.id)?;
            report.analyses_deleted += 1;
            match finding_aid::delete_file(store, &analysis.doc.file_id) {
                Ok(true) => report.files_deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    file = %analysis.doc.file_id,
                    error = %e,
                    "could not remove file record of deleted analysis"
                ),
            }
        } else {
            finding_aid::remove_from_project(store, &analysis.id, project_id)?;
            report.analyses_unlinked += 1;
        }
    }

    store.delete::<ResearchProject>(project_id)?;
    tracing::info!(
        project = %project_id,
        deleted = report.analyses_deleted,
        unlinked = report.analyses_unlinked,
        "deleted research project"
    );
    Ok(report)
}

/// A finding aid listed by a project, with its analysis if one exists.
#[derive(Debug, Clone, Serialize)]
pub struct FindingAidEntry {
    pub file: Record<FindingAid>,
    pub analysis: Option<AnalysisRecord>,
}

/// A project with everything needed to display it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectOverview {
    pub project: ProjectRecord,
    pub finding_aids: Vec<FindingAidEntry>,
}

pub fn overview(store: &DocumentStore, id: &RecordId) -> StoreResult<ProjectOverview> {
    let project = require(store, id)?;
    let mut entries = Vec::new();
    for file in finding_aid::files_by_ids(store, &project.doc.finding_aid_ids)? {
        let analysis = finding_aid::get_by_file_id(store, &file.id)?;
        entries.push(FindingAidEntry { file, analysis });
    }
    Ok(ProjectOverview {
        project,
        finding_aids: entries,
    })
}
