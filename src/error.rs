//! Rich diagnostic error types for libris.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it. [`LibrisError`] wraps them all and classifies
//! itself into the four failure classes the HTTP surface reports.

use miette::Diagnostic;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::imaging::ImageError;
use crate::paths::PathError;
use crate::search::SearchError;

/// Top-level error type for libris.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum LibrisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("invalid {field}: {message}")]
    #[diagnostic(
        code(libris::validation),
        help("Correct the submitted value and try again.")
    )]
    Validation { field: String, message: String },

    #[error("file storage error at {path}: {source}")]
    #[diagnostic(
        code(libris::file_storage),
        help(
            "Writing to the upload or image directory failed. Check that the \
             directory exists, is writable, and that the disk is not full."
        )
    )]
    FileStorage {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl LibrisError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::Extract(_) => ErrorKind::Validation,
            Self::Store(StoreError::NotFound { .. } | StoreError::InvalidId { .. }) => {
                ErrorKind::NotFound
            }
            Self::Store(StoreError::Invalid { .. }) => ErrorKind::Validation,
            Self::Image(ImageError::Save { .. }) => ErrorKind::Storage,
            Self::Image(_) => ErrorKind::Validation,
            Self::Analysis(_) | Self::Search(_) => ErrorKind::ExternalService,
            Self::Store(_) | Self::Config(_) | Self::Path(_) | Self::FileStorage { .. } => {
                ErrorKind::Storage
            }
        }
    }
}

/// The four failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid input, reported inline to the user.
    Validation,
    /// A referenced record does not exist.
    NotFound,
    /// The analysis or search service failed after retries.
    ExternalService,
    /// Persistence failed; fatal for the current request.
    Storage,
}

/// Convenience alias for top-level results.
pub type LibrisResult<T> = std::result::Result<T, LibrisError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(libris::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb error: {message}")]
    #[diagnostic(
        code(libris::store::redb),
        help(
            "The document database reported an error. If the database file is \
             corrupted, move it aside and restart to begin with an empty store."
        )
    )]
    Redb { message: String },

    #[error("serialization error in {collection}: {message}")]
    #[diagnostic(
        code(libris::store::serialization),
        help(
            "A stored record could not be encoded or decoded. The record may have \
             been written by an incompatible version."
        )
    )]
    Serialization {
        collection: &'static str,
        message: String,
    },

    #[error("{collection} record \"{id}\" not found")]
    #[diagnostic(
        code(libris::store::not_found),
        help("No record with this id exists. It may have been deleted.")
    )]
    NotFound { collection: &'static str, id: String },

    #[error("malformed record id: \"{id}\"")]
    #[diagnostic(
        code(libris::store::invalid_id),
        help("Record ids are 24 lowercase hexadecimal characters.")
    )]
    InvalidId { id: String },

    #[error("invalid {collection} record: {message}")]
    #[diagnostic(
        code(libris::store::invalid_record),
        help("Every required field must be present and non-empty.")
    )]
    Invalid {
        collection: &'static str,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classifies_as_not_found() {
        let err = LibrisError::from(StoreError::NotFound {
            collection: "books",
            id: "abc".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn invalid_record_is_validation() {
        let err = LibrisError::from(StoreError::Invalid {
            collection: "books",
            message: "title is empty".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn analysis_failure_is_external() {
        let err = LibrisError::from(AnalysisError::Exhausted {
            attempts: 2,
            message: "boom".into(),
        });
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.to_string().contains("2 attempts"));
    }

    #[test]
    fn redb_failure_is_storage() {
        let err = LibrisError::from(StoreError::Redb {
            message: "commit failed".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
