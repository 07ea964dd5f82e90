//! Workbench facade: top-level API for libris.
//!
//! The [`Workbench`] owns the document store, the text extractor, the
//! analysis client and the search provider, and exposes every user-facing
//! operation. Both the CLI and the HTTP server go through it. Calls block;
//! async callers should run them on a blocking thread.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analysis::{Analysis, AnalysisClient, CacheStats, CompletionBackend, OpenAiBackend};
use crate::books::{self, BookRecord};
use crate::config::LibrisConfig;
use crate::error::{LibrisError, LibrisResult};
use crate::extract::{self, ExtractError, PdfTextExtractor, TextExtractor};
use crate::finding_aid::{self, AnalysisRecord};
use crate::imaging::{self, ImageError};
use crate::model::{
    AnalysisState, Book, EducationLevel, FindingAid, FindingAidAnalysis, Publication,
    ResearchProject,
};
use crate::paths::LibrisPaths;
use crate::project::{self, ProjectDeletion, ProjectOverview, ProjectRecord, ProjectUpdate};
use crate::search::{self, ScholarSearch, SearchProvider};
use crate::store::{DocumentStore, RecordId};

/// A finding-aid upload as received from a user.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    /// Client-supplied filename.
    pub filename: &'a str,
    pub data: &'a [u8],
    pub education_level: EducationLevel,
    /// Raw id of the project to link the upload to.
    pub project_id: &'a str,
}

/// Identities created by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub file_id: RecordId,
    pub analysis_id: RecordId,
    pub filename: String,
    pub pages: usize,
}

/// Record counts and memo statistics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkbenchStatus {
    pub books: usize,
    pub projects: usize,
    pub finding_aids: usize,
    pub analyses: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// The libris research workbench.
pub struct Workbench {
    store: DocumentStore,
    paths: LibrisPaths,
    extractor: Box<dyn TextExtractor>,
    analyzer: AnalysisClient,
    search: Box<dyn SearchProvider>,
    max_results: usize,
    max_content_length: usize,
}

impl Workbench {
    /// Open a workbench with the production PDF extractor, OpenAI backend
    /// and Google Scholar provider.
    pub fn open(config: &LibrisConfig, paths: LibrisPaths) -> LibrisResult<Self> {
        Self::with_parts(
            config,
            paths,
            PdfTextExtractor,
            OpenAiBackend::new(config.openai.clone()),
            ScholarSearch::new(config.search.clone()),
        )
    }

    /// Open a workbench with explicit collaborators.
    pub fn with_parts(
        config: &LibrisConfig,
        paths: LibrisPaths,
        extractor: impl TextExtractor + 'static,
        backend: impl CompletionBackend + 'static,
        search: impl SearchProvider + 'static,
    ) -> LibrisResult<Self> {
        paths.ensure_dirs()?;
        let store = DocumentStore::open(&paths.database_dir())?;
        tracing::info!(
            data_dir = %paths.data_dir.display(),
            uploads = %paths.upload_dir.display(),
            "workbench opened"
        );
        Ok(Self {
            store,
            paths,
            extractor: Box::new(extractor),
            analyzer: AnalysisClient::new(backend, config.analysis.clone()),
            search: Box::new(search),
            max_results: config.search.max_results,
            max_content_length: config.max_content_length,
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn paths(&self) -> &LibrisPaths {
        &self.paths
    }

    pub fn analyzer(&self) -> &AnalysisClient {
        &self.analyzer
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    pub fn status(&self) -> LibrisResult<WorkbenchStatus> {
        let stats: CacheStats = self.analyzer.cache().stats();
        Ok(WorkbenchStatus {
            books: self.store.count::<Book>()?,
            projects: self.store.count::<ResearchProject>()?,
            finding_aids: self.store.count::<FindingAid>()?,
            analyses: self.store.count::<FindingAidAnalysis>()?,
            cache_entries: self.analyzer.cache().len(),
            cache_hits: stats.hits,
            cache_misses: stats.misses,
        })
    }

    // -- Books ---------------------------------------------------------------

    pub fn list_books(&self) -> LibrisResult<Vec<BookRecord>> {
        Ok(books::list(&self.store)?)
    }

    pub fn book(&self, id: &str) -> LibrisResult<BookRecord> {
        Ok(books::require(&self.store, &parse_id(id)?)?)
    }

    pub fn create_book(&self, book: &Book) -> LibrisResult<RecordId> {
        Ok(books::create(&self.store, book)?)
    }

    pub fn update_book(&self, id: &str, book: &Book) -> LibrisResult<BookRecord> {
        let id = parse_id(id)?;
        books::update(&self.store, &id, book)?;
        Ok(books::require(&self.store, &id)?)
    }

    pub fn delete_book(&self, id: &str) -> LibrisResult<()> {
        let id = parse_id(id)?;
        if books::delete(&self.store, &id)? {
            Ok(())
        } else {
            Err(not_found("books", &id))
        }
    }

    // -- Projects ------------------------------------------------------------

    pub fn list_projects(&self) -> LibrisResult<Vec<ProjectRecord>> {
        Ok(project::list(&self.store)?)
    }

    pub fn project(&self, id: &str) -> LibrisResult<ProjectRecord> {
        Ok(project::require(&self.store, &parse_id(id)?)?)
    }

    pub fn project_overview(&self, id: &str) -> LibrisResult<ProjectOverview> {
        Ok(project::overview(&self.store, &parse_id(id)?)?)
    }

    pub fn create_project(
        &self,
        title: &str,
        description: &str,
        education_level: EducationLevel,
    ) -> LibrisResult<RecordId> {
        let project = ResearchProject::new(title.trim(), description.trim(), education_level);
        Ok(project::create(&self.store, &project)?)
    }

    pub fn update_project(&self, id: &str, changes: &ProjectUpdate) -> LibrisResult<ProjectRecord> {
        let id = parse_id(id)?;
        let changes = ProjectUpdate {
            title: changes.title.trim().to_string(),
            description: changes.description.trim().to_string(),
            education_level: changes.education_level,
        };
        project::update(&self.store, &id, &changes)?;
        Ok(project::require(&self.store, &id)?)
    }

    pub fn delete_project(&self, id: &str) -> LibrisResult<ProjectDeletion> {
        Ok(project::delete(&self.store, &parse_id(id)?)?)
    }

    /// Link an already uploaded finding aid to another project.
    pub fn attach_finding_aid(&self, project_id: &str, file_id: &str) -> LibrisResult<bool> {
        Ok(project::attach_finding_aid(
            &self.store,
            &parse_id(project_id)?,
            &parse_id(file_id)?,
        )?)
    }

    /// Unlink a finding aid from a project. Fails with not-found when the
    /// project does not list it.
    pub fn remove_finding_aid(&self, project_id: &str, file_id: &str) -> LibrisResult<()> {
        let project_id = parse_id(project_id)?;
        let file_id = parse_id(file_id)?;
        if project::detach_finding_aid(&self.store, &project_id, &file_id)? {
            Ok(())
        } else {
            Err(not_found("finding_aids", &file_id))
        }
    }

    /// Search for publications and append them to a project.
    ///
    /// Provider failures yield no results rather than an error.
    pub fn search_for_project(&self, project_id: &str, query: &str) -> LibrisResult<Vec<Publication>> {
        let query = require_text("query", query)?;
        let project_id = parse_id(project_id)?;
        project::require(&self.store, &project_id)?;

        let results = self.search(query);
        project::add_search_results(&self.store, &project_id, &results)?;
        tracing::info!(project = %project_id, added = results.len(), "added search results");
        Ok(results)
    }

    /// Search for publications without storing them.
    pub fn search(&self, query: &str) -> Vec<Publication> {
        search::search_or_empty(self.search.as_ref(), query, self.max_results)
    }

    // -- Finding aids --------------------------------------------------------

    /// Store an uploaded PDF, extract its pages, and link it to a project.
    ///
    /// Nothing is recorded unless extraction succeeds; the stored file is
    /// removed again if a later step fails.
    pub fn upload_finding_aid(&self, upload: Upload<'_>) -> LibrisResult<UploadReceipt> {
        if !extract::is_pdf_filename(upload.filename) {
            return Err(ExtractError::Unsupported {
                filename: upload.filename.to_string(),
            }
            .into());
        }
        let filename = extract::sanitize_filename(upload.filename)
            .ok_or_else(|| LibrisError::validation("file", "filename is not usable"))?;
        if upload.data.is_empty() {
            return Err(LibrisError::validation("file", "the uploaded file is empty"));
        }
        if upload.data.len() > self.max_content_length {
            return Err(LibrisError::validation(
                "file",
                format!(
                    "the uploaded file exceeds the {} byte limit",
                    self.max_content_length
                ),
            ));
        }
        let project_id = parse_id(upload.project_id)?;
        project::require(&self.store, &project_id)?;

        let (path, mut file) = create_unique(&self.paths.upload_dir, &filename).map_err(|e| {
            LibrisError::FileStorage {
                path: self.paths.upload_dir.join(&filename).display().to_string(),
                source: e,
            }
        })?;
        let stored_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(filename);
        let written = file.write_all(upload.data).and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            if let Err(rm) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %rm, "could not remove partial upload");
            }
            return Err(LibrisError::FileStorage {
                path: path.display().to_string(),
                source: e,
            });
        }

        match self.record_upload(&path, &stored_name, upload, &project_id) {
            Ok(receipt) => {
                tracing::info!(
                    file = %receipt.file_id,
                    analysis = %receipt.analysis_id,
                    project = %project_id,
                    pages = receipt.pages,
                    "finding aid uploaded"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %rm, "could not remove rejected upload");
                }
                Err(e)
            }
        }
    }

    fn record_upload(
        &self,
        path: &Path,
        filename: &str,
        upload: Upload<'_>,
        project_id: &RecordId,
    ) -> LibrisResult<UploadReceipt> {
        let pages = self.extractor.extract_pages(upload.data, filename)?;

        let file_id = finding_aid::create_file(
            &self.store,
            &FindingAid {
                filename: filename.to_string(),
                path: path.to_path_buf(),
                upload_date: chrono::Utc::now(),
            },
        )?;
        let page_count = pages.len();
        let analysis_id = finding_aid::create(
            &self.store,
            &FindingAidAnalysis::uploaded(
                file_id.clone(),
                upload.education_level,
                project_id.clone(),
                pages,
            ),
        )?;
        project::add_finding_aid(&self.store, project_id, &file_id)?;

        Ok(UploadReceipt {
            file_id,
            analysis_id,
            filename: filename.to_string(),
            pages: page_count,
        })
    }

    pub fn analysis(&self, id: &str) -> LibrisResult<AnalysisRecord> {
        Ok(finding_aid::require(&self.store, &parse_id(id)?)?)
    }

    pub fn analysis_state(&self, id: &str) -> LibrisResult<AnalysisState> {
        Ok(finding_aid::state(&self.store, &parse_id(id)?)?)
    }

    /// Analyze a passage of a finding aid and store the result on its
    /// analysis record.
    pub fn analyze_selection(
        &self,
        analysis_id: &str,
        text: &str,
        education_level: EducationLevel,
    ) -> LibrisResult<Analysis> {
        let text = require_text("selected_text", text)?;
        let id = parse_id(analysis_id)?;
        finding_aid::require(&self.store, &id)?;

        let analysis = self.analyzer.analyze(text, education_level)?;
        finding_aid::update_analysis(&self.store, &id, &analysis)?;
        Ok(analysis)
    }

    /// Analyze every page of a finding aid at its stored education level.
    pub fn analyze_full(&self, analysis_id: &str) -> LibrisResult<Analysis> {
        let id = parse_id(analysis_id)?;
        let record = finding_aid::require(&self.store, &id)?;
        let text = record.doc.full_text();
        if text.is_empty() {
            return Err(LibrisError::validation(
                "extracted_text_pages",
                "the finding aid has no extracted text to analyze",
            ));
        }

        let analysis = self.analyzer.analyze(&text, record.doc.education_level)?;
        finding_aid::update_analysis(&self.store, &id, &analysis)?;
        Ok(analysis)
    }

    /// Delete an analysis, unlist its file from every project, and remove the
    /// file record and stored file.
    pub fn delete_analysis(&self, analysis_id: &str) -> LibrisResult<()> {
        let id = parse_id(analysis_id)?;
        let record = finding_aid::require(&self.store, &id)?;
        let file_id = &record.doc.file_id;

        for project_id in &record.doc.project_ids {
            match project::remove_finding_aid(&self.store, project_id, file_id) {
                Ok(_) => {}
                Err(crate::error::StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        finding_aid::delete(&self.store, &id)?;
        if let Err(e) = finding_aid::delete_file(&self.store, file_id) {
            tracing::warn!(file = %file_id, error = %e, "could not remove file record of deleted analysis");
        }
        Ok(())
    }

    // -- Images --------------------------------------------------------------

    /// Resize an uploaded image to each preset and save the renditions.
    pub fn process_image<S: AsRef<str>>(
        &self,
        title: &str,
        filename: &str,
        data: &[u8],
        sizes: &[S],
    ) -> LibrisResult<Vec<String>> {
        if !imaging::is_allowed_image(filename) {
            return Err(ImageError::Unsupported {
                filename: filename.to_string(),
            }
            .into());
        }
        let sizes = imaging::parse_sizes(sizes)?;
        Ok(imaging::process_image(
            data,
            &sizes,
            title,
            &self.paths.image_dir,
        )?)
    }
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("data_dir", &self.paths.data_dir)
            .field("analyzer", &self.analyzer)
            .field("max_results", &self.max_results)
            .finish()
    }
}

fn parse_id(raw: &str) -> LibrisResult<RecordId> {
    Ok(RecordId::parse(raw.trim())?)
}

fn not_found(collection: &'static str, id: &RecordId) -> LibrisError {
    crate::error::StoreError::NotFound {
        collection,
        id: id.to_string(),
    }
    .into()
}

fn require_text<'a>(field: &str, value: &'a str) -> LibrisResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LibrisError::validation(field, "must not be empty"))
    } else {
        Ok(trimmed)
    }
}

/// Create `dir/name`, or `dir/stem-N.ext` for the first `N` not yet taken.
///
/// The file is created exclusively, so concurrent uploads of the same name
/// never share a path.
fn create_unique(dir: &Path, name: &str) -> std::io::Result<(PathBuf, File)> {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 0u32;
    loop {
        let candidate = match (n, ext) {
            (0, _) => dir.join(name),
            (_, Some(ext)) => dir.join(format!("{stem}-{n}.{ext}")),
            (_, None) => dir.join(format!("{stem}-{n}")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_unique_numbers_collisions() {
        let dir = tempfile::TempDir::new().unwrap();
        let (first, _) = create_unique(dir.path(), "guide.pdf").unwrap();
        let (second, _) = create_unique(dir.path(), "guide.pdf").unwrap();
        let (third, _) = create_unique(dir.path(), "guide.pdf").unwrap();
        assert_eq!(first, dir.path().join("guide.pdf"));
        assert_eq!(second, dir.path().join("guide-1.pdf"));
        assert_eq!(third, dir.path().join("guide-2.pdf"));

        let (bare, _) = create_unique(dir.path(), "README").unwrap();
        let (bare_again, _) = create_unique(dir.path(), "README").unwrap();
        assert_eq!(bare, dir.path().join("README"));
        assert_eq!(bare_again, dir.path().join("README-1"));
    }

    #[test]
    fn concurrent_reservations_get_distinct_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| create_unique(dir.path(), "log.pdf").unwrap().0))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let distinct: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(distinct.len(), 8);
    }

    #[test]
    fn require_text_trims() {
        assert_eq!(require_text("q", "  whaling ").unwrap(), "whaling");
        assert!(require_text("q", "   ").is_err());
    }
}
