//! Core record types.
//!
//! Each entity is an explicit struct with its required and optional fields
//! spelled out, implementing [`Document`] so the store validates it on every
//! write.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{
    invalid, require_non_empty, require_unique, Collection, Document, RecordId, StoreResult,
};

/// Audience an analysis is framed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EducationLevel {
    Undergraduate,
    Graduate,
    Doctoral,
}

impl EducationLevel {
    pub const ALL: [EducationLevel; 3] = [Self::Undergraduate, Self::Graduate, Self::Doctoral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undergraduate => "undergraduate",
            Self::Graduate => "graduate",
            Self::Doctoral => "doctoral",
        }
    }
}

impl std::fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown education level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEducationLevel(pub String);

impl std::fmt::Display for UnknownEducationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown education level \"{}\" (expected undergraduate, graduate, or doctoral)",
            self.0
        )
    }
}

impl std::error::Error for UnknownEducationLevel {}

impl std::str::FromStr for EducationLevel {
    type Err = UnknownEducationLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "undergraduate" => Ok(Self::Undergraduate),
            "graduate" => Ok(Self::Graduate),
            "doctoral" => Ok(Self::Doctoral),
            _ => Err(UnknownEducationLevel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub published_year: i32,
    pub genre: String,
}

/// Accepted range for a book's publication year.
pub const PUBLISHED_YEAR_RANGE: std::ops::RangeInclusive<i32> = 1000..=9999;

impl Document for Book {
    const COLLECTION: Collection = Collection::Books;

    fn validate(&self) -> StoreResult<()> {
        require_non_empty::<Self>("title", &self.title)?;
        require_non_empty::<Self>("author", &self.author)?;
        require_non_empty::<Self>("isbn", &self.isbn)?;
        require_non_empty::<Self>("genre", &self.genre)?;
        if !PUBLISHED_YEAR_RANGE.contains(&self.published_year) {
            return Err(invalid::<Self>(format!(
                "published_year {} is outside {}..={}",
                self.published_year,
                PUBLISHED_YEAR_RANGE.start(),
                PUBLISHED_YEAR_RANGE.end()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Finding aids
// ---------------------------------------------------------------------------

/// An uploaded finding-aid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingAid {
    /// Sanitized file name as stored.
    pub filename: String,
    /// Location on disk.
    pub path: PathBuf,
    pub upload_date: DateTime<Utc>,
}

impl Document for FindingAid {
    const COLLECTION: Collection = Collection::FindingAids;

    fn validate(&self) -> StoreResult<()> {
        require_non_empty::<Self>("filename", &self.filename)?;
        if self.path.as_os_str().is_empty() {
            return Err(invalid::<Self>("path must not be empty"));
        }
        Ok(())
    }
}

/// Extracted text and latest analysis of one finding aid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingAidAnalysis {
    pub file_id: RecordId,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub research_topics: Option<Vec<String>>,
    pub education_level: EducationLevel,
    /// Projects this analysis belongs to. Set semantics.
    #[serde(default)]
    pub project_ids: Vec<RecordId>,
    /// One entry per PDF page, in document order.
    #[serde(default)]
    pub extracted_text_pages: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// How many analysis results have been stored on this record.
    #[serde(default)]
    pub analysis_runs: u32,
}

/// Where an analysis record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    /// Pages extracted, no summary yet.
    Uploaded,
    /// Summary and topics present.
    Analyzed,
    /// Summary and topics overwritten by a later analysis.
    #[serde(rename = "re-analyzed")]
    ReAnalyzed,
}

impl std::fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Uploaded => "uploaded",
            Self::Analyzed => "analyzed",
            Self::ReAnalyzed => "re-analyzed",
        })
    }
}

impl FindingAidAnalysis {
    /// A freshly uploaded analysis linked to one project.
    pub fn uploaded(
        file_id: RecordId,
        education_level: EducationLevel,
        project_id: RecordId,
        extracted_text_pages: Vec<String>,
    ) -> Self {
        Self {
            file_id,
            summary: None,
            research_topics: None,
            education_level,
            project_ids: vec![project_id],
            extracted_text_pages,
            created_at: Utc::now(),
            analysis_runs: 0,
        }
    }

    pub fn state(&self) -> AnalysisState {
        match (&self.summary, self.analysis_runs) {
            (None, _) => AnalysisState::Uploaded,
            (Some(_), 0 | 1) => AnalysisState::Analyzed,
            (Some(_), _) => AnalysisState::ReAnalyzed,
        }
    }

    /// All page texts joined with blank lines.
    pub fn full_text(&self) -> String {
        self.extracted_text_pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Document for FindingAidAnalysis {
    const COLLECTION: Collection = Collection::Analyses;

    fn validate(&self) -> StoreResult<()> {
        require_unique::<Self, _>("project_ids", &self.project_ids)?;
        if let Some(summary) = &self.summary {
            require_non_empty::<Self>("summary", summary)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Research projects
// ---------------------------------------------------------------------------

/// Placeholder for a publication field the provider didn't supply.
pub const NOT_AVAILABLE: &str = "N/A";

/// A scholarly search result attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    pub author: String,
    pub year: String,
    pub url: String,
}

/// A named collection of finding aids and search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchProject {
    pub title: String,
    pub description: String,
    pub education_level: EducationLevel,
    /// Finding-aid file ids, insertion-ordered, no duplicates.
    #[serde(default)]
    pub finding_aid_ids: Vec<RecordId>,
    #[serde(default)]
    pub search_results: Vec<Publication>,
}

impl ResearchProject {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        education_level: EducationLevel,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            education_level,
            finding_aid_ids: Vec::new(),
            search_results: Vec::new(),
        }
    }
}

impl Document for ResearchProject {
    const COLLECTION: Collection = Collection::ResearchProjects;

    fn validate(&self) -> StoreResult<()> {
        require_non_empty::<Self>("title", &self.title)?;
        require_non_empty::<Self>("description", &self.description)?;
        require_unique::<Self, _>("finding_aid_ids", &self.finding_aid_ids)
    }
}
