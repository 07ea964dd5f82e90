//! End-to-end tests for the libris workbench.
//!
//! These exercise upload, analysis, project linking and deletion through the
//! public facade, with the PDF extractor, completion backend and search
//! provider replaced by in-process stubs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libris::analysis::{AnalysisError, AnalysisResult, CompletionBackend, CompletionRequest};
use libris::config::LibrisConfig;
use libris::error::{ErrorKind, LibrisError};
use libris::extract::{ExtractResult, TextExtractor};
use libris::model::{AnalysisState, Book, EducationLevel, Publication};
use libris::paths::LibrisPaths;
use libris::project::ProjectUpdate;
use libris::search::{SearchError, SearchProvider, SearchResult};
use libris::workbench::{Upload, Workbench};

const RESPONSE: &str = "Correspondence and ledgers of a New Bedford whaling firm.\n\n\
                        Research Topics:\n\
                        1. Credit networks in the whaling trade\n\
                        2. Crew recruitment and wages\n";

/// Treats the upload bytes as UTF-8 with pages separated by form feeds.
struct FormFeedExtractor;

impl TextExtractor for FormFeedExtractor {
    fn extract_pages(&self, data: &[u8], _origin: &str) -> ExtractResult<Vec<String>> {
        Ok(String::from_utf8_lossy(data)
            .split('\u{c}')
            .map(|p| p.trim().to_string())
            .collect())
    }
}

/// Returns a fixed response and counts calls.
#[derive(Clone)]
struct CannedBackend {
    calls: Arc<AtomicUsize>,
    response: &'static str,
}

impl CannedBackend {
    fn new(response: &'static str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            response,
        }
    }
}

impl CompletionBackend for CannedBackend {
    fn complete(&self, _request: &CompletionRequest) -> AnalysisResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.to_string())
    }
}

/// Always fails with a transport error.
#[derive(Clone)]
struct FailingBackend {
    calls: Arc<AtomicUsize>,
}

impl CompletionBackend for FailingBackend {
    fn complete(&self, _request: &CompletionRequest) -> AnalysisResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AnalysisError::RequestFailed {
            message: "connection reset".into(),
        })
    }
}

struct FixedSearch;

impl SearchProvider for FixedSearch {
    fn search(&self, query: &str, limit: usize) -> SearchResult<Vec<Publication>> {
        Ok((1..=3)
            .map(|i| Publication {
                title: format!("{query} study {i}"),
                author: "A. Historian".into(),
                year: format!("{}", 1990 + i),
                url: format!("https://example.org/{i}"),
            })
            .take(limit)
            .collect())
    }
}

struct DownSearch;

impl SearchProvider for DownSearch {
    fn search(&self, _query: &str, _limit: usize) -> SearchResult<Vec<Publication>> {
        Err(SearchError::RequestFailed {
            message: "HTTP 429".into(),
        })
    }
}

fn workbench_with(
    dir: &std::path::Path,
    backend: impl CompletionBackend + 'static,
    search: impl SearchProvider + 'static,
) -> Workbench {
    Workbench::with_parts(
        &LibrisConfig::default(),
        LibrisPaths::from_root(dir),
        FormFeedExtractor,
        backend,
        search,
    )
    .unwrap()
}

fn upload(wb: &Workbench, project: &str, filename: &str, body: &str) -> libris::workbench::UploadReceipt {
    wb.upload_finding_aid(Upload {
        filename,
        data: body.as_bytes(),
        education_level: EducationLevel::Graduate,
        project_id: project,
    })
    .unwrap()
}

#[test]
fn upload_analyze_and_delete_project() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = CannedBackend::new(RESPONSE);
    let wb = workbench_with(dir.path(), backend.clone(), FixedSearch);

    let project = wb
        .create_project("Whaling", "New Bedford firms", EducationLevel::Graduate)
        .unwrap();
    let receipt = upload(
        &wb,
        project.as_str(),
        "ledger.pdf",
        "Ledger 1851\u{c}\u{c}Crew list",
    );
    assert_eq!(receipt.pages, 3);
    assert_eq!(receipt.filename, "ledger.pdf");

    let stored = wb.analysis(receipt.analysis_id.as_str()).unwrap();
    assert_eq!(
        stored.doc.extracted_text_pages,
        vec!["Ledger 1851", "", "Crew list"]
    );
    assert_eq!(stored.doc.state(), AnalysisState::Uploaded);
    let file_path = wb.paths().upload_dir.join("ledger.pdf");
    assert!(file_path.exists());

    let analysis = wb.analyze_full(receipt.analysis_id.as_str()).unwrap();
    assert!(analysis.summary.starts_with("Correspondence"));
    assert_eq!(analysis.research_topics.len(), 2);
    assert_eq!(
        wb.analysis_state(receipt.analysis_id.as_str()).unwrap(),
        AnalysisState::Analyzed
    );

    // Same text and level is served from the memo.
    wb.analyze_full(receipt.analysis_id.as_str()).unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        wb.analysis_state(receipt.analysis_id.as_str()).unwrap(),
        AnalysisState::ReAnalyzed
    );

    let overview = wb.project_overview(project.as_str()).unwrap();
    assert_eq!(overview.finding_aids.len(), 1);
    assert!(overview.finding_aids[0].analysis.is_some());

    let report = wb.delete_project(project.as_str()).unwrap();
    assert_eq!(report.analyses_deleted, 1);
    assert_eq!(report.files_deleted, 1);
    assert!(!file_path.exists());

    let err = wb.analysis(receipt.analysis_id.as_str()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(wb.status().unwrap().analyses, 0);
}

#[test]
fn shared_finding_aid_survives_one_project_deletion() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);

    let first = wb
        .create_project("First", "Coastal trade", EducationLevel::Undergraduate)
        .unwrap();
    let second = wb
        .create_project("Second", "Inland trade", EducationLevel::Doctoral)
        .unwrap();
    let receipt = upload(&wb, first.as_str(), "papers.pdf", "Box 1");

    assert!(wb
        .attach_finding_aid(second.as_str(), receipt.file_id.as_str())
        .unwrap());
    assert!(!wb
        .attach_finding_aid(second.as_str(), receipt.file_id.as_str())
        .unwrap());
    assert_eq!(wb.project(second.as_str()).unwrap().doc.finding_aid_ids.len(), 1);

    let report = wb.delete_project(first.as_str()).unwrap();
    assert_eq!(report.analyses_deleted, 0);
    assert_eq!(report.analyses_unlinked, 1);

    let analysis = wb.analysis(receipt.analysis_id.as_str()).unwrap();
    assert_eq!(analysis.doc.project_ids, vec![second.clone()]);
    assert!(wb.paths().upload_dir.join("papers.pdf").exists());
}

#[test]
fn remove_finding_aid_requires_membership() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);
    let project = wb
        .create_project("Maps", "Harbor charts", EducationLevel::Graduate)
        .unwrap();
    let receipt = upload(&wb, project.as_str(), "atlas.pdf", "Plate 1");

    wb.remove_finding_aid(project.as_str(), receipt.file_id.as_str())
        .unwrap();
    assert!(wb.project(project.as_str()).unwrap().doc.finding_aid_ids.is_empty());
    assert!(wb
        .analysis(receipt.analysis_id.as_str())
        .unwrap()
        .doc
        .project_ids
        .is_empty());

    let err = wb
        .remove_finding_aid(project.as_str(), receipt.file_id.as_str())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn rejected_uploads_leave_nothing_behind() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);
    let project = wb
        .create_project("Scrolls", "Temple archives", EducationLevel::Graduate)
        .unwrap();

    let not_pdf = wb
        .upload_finding_aid(Upload {
            filename: "notes.docx",
            data: b"text",
            education_level: EducationLevel::Graduate,
            project_id: project.as_str(),
        })
        .unwrap_err();
    assert_eq!(not_pdf.kind(), ErrorKind::Validation);

    let empty = wb
        .upload_finding_aid(Upload {
            filename: "empty.pdf",
            data: b"",
            education_level: EducationLevel::Graduate,
            project_id: project.as_str(),
        })
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);

    let missing_project = wb
        .upload_finding_aid(Upload {
            filename: "orphan.pdf",
            data: b"page",
            education_level: EducationLevel::Graduate,
            project_id: "0123456789abcdef01234567",
        })
        .unwrap_err();
    assert_eq!(missing_project.kind(), ErrorKind::NotFound);

    let status = wb.status().unwrap();
    assert_eq!(status.finding_aids, 0);
    assert_eq!(status.analyses, 0);
    assert_eq!(
        std::fs::read_dir(&wb.paths().upload_dir).unwrap().count(),
        0
    );
}

#[test]
fn duplicate_filenames_get_distinct_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);
    let project = wb
        .create_project("Ships", "Voyage logs", EducationLevel::Graduate)
        .unwrap();

    let a = upload(&wb, project.as_str(), "log.pdf", "Voyage one");
    let b = upload(&wb, project.as_str(), "log.pdf", "Voyage two");
    assert_eq!(a.filename, "log.pdf");
    assert_eq!(b.filename, "log-1.pdf");
    assert_ne!(a.file_id, b.file_id);
    assert_eq!(wb.project(project.as_str()).unwrap().doc.finding_aid_ids.len(), 2);
}

#[test]
fn failing_service_reports_exhausted_attempts() {
    let dir = tempfile::TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let wb = workbench_with(
        dir.path(),
        FailingBackend {
            calls: Arc::clone(&calls),
        },
        FixedSearch,
    );
    let project = wb
        .create_project("Letters", "Family letters", EducationLevel::Graduate)
        .unwrap();
    let receipt = upload(&wb, project.as_str(), "letters.pdf", "Dear sir");

    let err = wb
        .analyze_selection(
            receipt.analysis_id.as_str(),
            "Dear sir",
            EducationLevel::Graduate,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(err.to_string().contains("2 attempts"), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The record is untouched.
    assert_eq!(
        wb.analysis_state(receipt.analysis_id.as_str()).unwrap(),
        AnalysisState::Uploaded
    );
}

#[test]
fn analyze_selection_on_unknown_record_skips_the_service() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = CannedBackend::new(RESPONSE);
    let wb = workbench_with(dir.path(), backend.clone(), FixedSearch);

    let err = wb
        .analyze_selection(
            "0123456789abcdef01234567",
            "Some passage",
            EducationLevel::Graduate,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    let blank = wb
        .analyze_selection("0123456789abcdef01234567", "   ", EducationLevel::Graduate)
        .unwrap_err();
    assert!(matches!(blank, LibrisError::Validation { .. }));
}

#[test]
fn project_search_appends_results() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);
    let project = wb
        .create_project("Trade", "Commodity flows", EducationLevel::Graduate)
        .unwrap();

    let results = wb.search_for_project(project.as_str(), "whale oil").unwrap();
    assert_eq!(results.len(), 3);
    wb.search_for_project(project.as_str(), "spermaceti").unwrap();

    let stored = wb.project(project.as_str()).unwrap().doc.search_results;
    assert_eq!(stored.len(), 6);
    assert_eq!(stored[0].title, "whale oil study 1");
    assert_eq!(stored[5].title, "spermaceti study 3");
}

#[test]
fn search_outage_degrades_to_no_results() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), DownSearch);
    let project = wb
        .create_project("Trade", "Commodity flows", EducationLevel::Graduate)
        .unwrap();

    assert!(wb.search("whale oil").is_empty());
    assert!(wb.search_for_project(project.as_str(), "whale oil").unwrap().is_empty());
    assert!(wb.project(project.as_str()).unwrap().doc.search_results.is_empty());
}

#[test]
fn project_edits_are_trimmed_like_creation() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);

    let id = wb
        .create_project("  Whaling economies ", " Logbooks ", EducationLevel::Graduate)
        .unwrap();
    let created = wb.project(id.as_str()).unwrap();
    assert_eq!(created.doc.title, "Whaling economies");
    assert_eq!(created.doc.description, "Logbooks");

    let updated = wb
        .update_project(
            id.as_str(),
            &ProjectUpdate {
                title: "  Nantucket ledgers\t".into(),
                description: "\n Account books ".into(),
                education_level: EducationLevel::Doctoral,
            },
        )
        .unwrap();
    assert_eq!(updated.doc.title, "Nantucket ledgers");
    assert_eq!(updated.doc.description, "Account books");
    assert_eq!(updated.doc.education_level, EducationLevel::Doctoral);

    let blank = wb.update_project(
        id.as_str(),
        &ProjectUpdate {
            title: "   ".into(),
            description: "Account books".into(),
            education_level: EducationLevel::Doctoral,
        },
    );
    assert_eq!(blank.unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn book_catalog_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);

    let book = Book {
        title: "Moby-Dick".into(),
        author: "Herman Melville".into(),
        isbn: "978-0142437247".into(),
        published_year: 1851,
        genre: "Novel".into(),
    };
    let id = wb.create_book(&book).unwrap();

    let mut revised = book.clone();
    revised.genre = "Adventure".into();
    let updated = wb.update_book(id.as_str(), &revised).unwrap();
    assert_eq!(updated.doc.genre, "Adventure");
    assert_eq!(wb.list_books().unwrap().len(), 1);

    wb.delete_book(id.as_str()).unwrap();
    assert_eq!(
        wb.delete_book(id.as_str()).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let mut untitled = book;
    untitled.title = "  ".into();
    assert_eq!(
        wb.create_book(&untitled).unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[test]
fn malformed_ids_are_not_found() {
    let dir = tempfile::TempDir::new().unwrap();
    let wb = workbench_with(dir.path(), CannedBackend::new(RESPONSE), FixedSearch);

    assert_eq!(wb.project("not-an-id").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(wb.book("").unwrap_err().kind(), ErrorKind::NotFound);
}
