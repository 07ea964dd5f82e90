//! Document store for libris.
//!
//! Four collections (books, finding aids, analyses, research projects) live in
//! a single redb database. Every record is an explicit typed struct
//! implementing [`Document`]; records are validated on every write, so nothing
//! malformed ever reaches disk.
//!
//! - [`DocumentStore`]: typed CRUD plus single-document conditional updates
//! - [`RecordId`]: store-generated identity
//! - [`add_to_set`] / [`pull`]: set-semantics helpers used inside updates

pub mod durable;
pub mod id;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use durable::DocumentStore;
pub use id::RecordId;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The named collections in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Books,
    FindingAids,
    Analyses,
    ResearchProjects,
}

impl Collection {
    /// Every collection, in table-creation order.
    pub const ALL: [Collection; 4] = [
        Collection::Books,
        Collection::FindingAids,
        Collection::Analyses,
        Collection::ResearchProjects,
    ];

    /// Table name on disk.
    pub fn name(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::FindingAids => "finding_aids",
            Self::Analyses => "analyses",
            Self::ResearchProjects => "research_projects",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed record that can be persisted in a collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The collection this record type lives in.
    const COLLECTION: Collection;

    /// Check required fields and invariants. Called on every insert and update.
    fn validate(&self) -> StoreResult<()>;
}

/// A stored record together with its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<D> {
    pub id: RecordId,
    #[serde(flatten)]
    pub doc: D,
}

/// Build a validation error for a document type.
pub fn invalid<D: Document>(message: impl Into<String>) -> StoreError {
    StoreError::Invalid {
        collection: D::COLLECTION.name(),
        message: message.into(),
    }
}

/// Require a string field to be non-blank.
pub fn require_non_empty<D: Document>(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        Err(invalid::<D>(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// Require that a list contains no duplicate entries.
pub fn require_unique<D: Document, T: PartialEq>(field: &str, items: &[T]) -> StoreResult<()> {
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(invalid::<D>(format!("{field} contains a duplicate entry")));
        }
    }
    Ok(())
}

/// Insert `item` unless already present. Returns whether the set changed.
pub fn add_to_set<T: PartialEq>(set: &mut Vec<T>, item: T) -> bool {
    if set.contains(&item) {
        false
    } else {
        set.push(item);
        true
    }
}

/// Remove every occurrence of `item`. Returns whether the list changed.
pub fn pull<T: PartialEq>(list: &mut Vec<T>, item: &T) -> bool {
    let before = list.len();
    list.retain(|x| x != item);
    list.len() != before
}
