//! Finding-aid files and their analysis records.
//!
//! An analysis record is created at upload time with the extracted pages and
//! one project link. Later analysis calls overwrite its summary and topics in
//! place; project links come and go independently. Every operation here is a
//! single-document write.

use std::path::Path;

use crate::analysis::Analysis;
use crate::model::{AnalysisState, FindingAid, FindingAidAnalysis};
use crate::store::{add_to_set, pull, DocumentStore, Record, RecordId, StoreResult};

pub type AnalysisRecord = Record<FindingAidAnalysis>;

// ---------------------------------------------------------------------------
// Analysis records
// ---------------------------------------------------------------------------

pub fn create(store: &DocumentStore, analysis: &FindingAidAnalysis) -> StoreResult<RecordId> {
    let id = store.insert(analysis)?;
    tracing::debug!(
        analysis = %id,
        file = %analysis.file_id,
        pages = analysis.extracted_text_pages.len(),
        "created analysis record"
    );
    Ok(id)
}

pub fn get(store: &DocumentStore, id: &RecordId) -> StoreResult<Option<AnalysisRecord>> {
    store.get(id)
}

/// Like [`get`], but a missing record is `NotFound`.
pub fn require(store: &DocumentStore, id: &RecordId) -> StoreResult<AnalysisRecord> {
    store.require(id)
}

/// The analysis of an uploaded file, if any.
pub fn get_by_file_id(store: &DocumentStore, file_id: &RecordId) -> StoreResult<Option<AnalysisRecord>> {
    store.find_one(|a: &FindingAidAnalysis| a.file_id == *file_id)
}

/// Every analysis linked to a project.
pub fn list_by_project(store: &DocumentStore, project_id: &RecordId) -> StoreResult<Vec<AnalysisRecord>> {
    store.find(|a: &FindingAidAnalysis| a.project_ids.contains(project_id))
}

/// Overwrite summary and topics. A deleted record reports `NotFound`.
pub fn update_analysis(store: &DocumentStore, id: &RecordId, analysis: &Analysis) -> StoreResult<()> {
    store.update(id, |record: &mut FindingAidAnalysis| {
        record.summary = Some(analysis.summary.clone());
        record.research_topics = Some(analysis.research_topics.clone());
        record.analysis_runs = record.analysis_runs.saturating_add(1);
        true
    })?;
    tracing::info!(
        analysis = %id,
        topics = analysis.research_topics.len(),
        "stored analysis result"
    );
    Ok(())
}

/// Link a project. Returns whether the link was new.
pub fn add_to_project(store: &DocumentStore, id: &RecordId, project_id: &RecordId) -> StoreResult<bool> {
    store.update(id, |record: &mut FindingAidAnalysis| {
        add_to_set(&mut record.project_ids, project_id.clone())
    })
}

/// Unlink a project. Returns whether a link was removed.
pub fn remove_from_project(
    store: &DocumentStore,
    id: &RecordId,
    project_id: &RecordId,
) -> StoreResult<bool> {
    store.update(id, |record: &mut FindingAidAnalysis| {
        pull(&mut record.project_ids, project_id)
    })
}

pub fn delete(store: &DocumentStore, id: &RecordId) -> StoreResult<bool> {
    let existed = store.delete::<FindingAidAnalysis>(id)?;
    if existed {
        tracing::info!(analysis = %id, "deleted analysis record");
    }
    Ok(existed)
}

/// Lifecycle state of a stored analysis.
pub fn state(store: &DocumentStore, id: &RecordId) -> StoreResult<AnalysisState> {
    Ok(require(store, id)?.doc.state())
}

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

pub fn create_file(store: &DocumentStore, file: &FindingAid) -> StoreResult<RecordId> {
    store.insert(file)
}

pub fn get_file(store: &DocumentStore, file_id: &RecordId) -> StoreResult<Option<Record<FindingAid>>> {
    store.get(file_id)
}

/// File records for the given ids, skipping ids with no record.
pub fn files_by_ids(store: &DocumentStore, ids: &[RecordId]) -> StoreResult<Vec<Record<FindingAid>>> {
    let mut files = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(file) = store.get::<FindingAid>(id)? {
            files.push(file);
        }
    }
    Ok(files)
}

/// Remove a file record and its stored file.
///
/// A missing file on disk is not an error. Returns whether the record
/// existed.
pub fn delete_file(store: &DocumentStore, file_id: &RecordId) -> StoreResult<bool> {
    let Some(file) = store.get::<FindingAid>(file_id)? else {
        return Ok(false);
    };
    remove_stored_file(&file.doc.path);
    store.delete::<FindingAid>(file_id)
}

fn remove_stored_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stored file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove stored file"),
    }
}
