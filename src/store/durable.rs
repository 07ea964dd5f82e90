//! ACID-durable document store backed by redb.
//!
//! One table per [`Collection`], keyed by the record id string, with the
//! JSON-encoded document as value. Every single-document mutation runs in its
//! own write transaction, so each one is atomic. Nothing spans documents.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::{Collection, Document, Record, RecordId, StoreResult};

const BOOKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("books");
const FINDING_AIDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("finding_aids");
const ANALYSES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("analyses");
const PROJECTS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("research_projects");

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "libris.redb";

fn table_for(collection: Collection) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match collection {
        Collection::Books => BOOKS_TABLE,
        Collection::FindingAids => FINDING_AIDS_TABLE,
        Collection::Analyses => ANALYSES_TABLE,
        Collection::ResearchProjects => PROJECTS_TABLE,
    }
}

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn encode<D: Document>(doc: &D) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| StoreError::Serialization {
        collection: D::COLLECTION.name(),
        message: e.to_string(),
    })
}

fn decode<D: Document>(bytes: &[u8]) -> StoreResult<D> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
        collection: D::COLLECTION.name(),
        message: e.to_string(),
    })
}

fn not_found<D: Document>(id: &RecordId) -> StoreError {
    StoreError::NotFound {
        collection: D::COLLECTION.name(),
        id: id.to_string(),
    }
}

/// Durable document store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    /// Open or create a store in the given directory, creating every collection table.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DATABASE_FILE);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        for collection in Collection::ALL {
            txn.open_table(table_for(collection))
                .map_err(redb_err("open_table"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;

        tracing::debug!(path = %db_path.display(), "document store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Validate and insert a new document, returning its generated id.
    pub fn insert<D: Document>(&self, doc: &D) -> StoreResult<RecordId> {
        doc.validate()?;
        let id = RecordId::generate();
        let bytes = encode(doc)?;

        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn
                .open_table(table_for(D::COLLECTION))
                .map_err(redb_err("open_table"))?;
            table
                .insert(id.as_str(), bytes.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(id)
    }

    /// Read a document by id. Returns `Ok(None)` if it doesn't exist.
    pub fn get<D: Document>(&self, id: &RecordId) -> StoreResult<Option<Record<D>>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(table_for(D::COLLECTION))
            .map_err(redb_err("open_table"))?;
        let bytes = match table.get(id.as_str()).map_err(redb_err("get"))? {
            Some(guard) => guard.value().to_vec(),
            None => return Ok(None),
        };
        Ok(Some(Record {
            id: id.clone(),
            doc: decode(&bytes)?,
        }))
    }

    /// Read a document by id, failing with `NotFound` if it doesn't exist.
    pub fn require<D: Document>(&self, id: &RecordId) -> StoreResult<Record<D>> {
        self.get(id)?.ok_or_else(|| not_found::<D>(id))
    }

    /// All documents in a collection, in id order.
    pub fn list<D: Document>(&self) -> StoreResult<Vec<Record<D>>> {
        self.find(|_: &D| true)
    }

    /// All documents matching a predicate, in id order.
    pub fn find<D: Document>(&self, predicate: impl Fn(&D) -> bool) -> StoreResult<Vec<Record<D>>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(table_for(D::COLLECTION))
            .map_err(redb_err("open_table"))?;

        let mut out = Vec::new();
        for entry in table.iter().map_err(redb_err("iter"))? {
            let (key, value) = entry.map_err(redb_err("iter"))?;
            let doc: D = decode(value.value())?;
            if predicate(&doc) {
                out.push(Record {
                    id: RecordId::parse(key.value())?,
                    doc,
                });
            }
        }
        Ok(out)
    }

    /// First document matching a predicate.
    pub fn find_one<D: Document>(
        &self,
        predicate: impl Fn(&D) -> bool,
    ) -> StoreResult<Option<Record<D>>> {
        Ok(self.find(predicate)?.into_iter().next())
    }

    /// Number of documents in a collection.
    pub fn count<D: Document>(&self) -> StoreResult<usize> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_table(table_for(D::COLLECTION))
            .map_err(redb_err("open_table"))?;
        let mut n = 0usize;
        for entry in table.iter().map_err(redb_err("iter"))? {
            entry.map_err(redb_err("iter"))?;
            n += 1;
        }
        Ok(n)
    }

    /// Atomically apply a conditional mutation to one document.
    ///
    /// `mutate` returns whether it changed anything; only changed documents are
    /// re-validated and written. Returns `NotFound` if the id doesn't exist,
    /// otherwise whether the document was modified.
    pub fn update<D: Document>(
        &self,
        id: &RecordId,
        mutate: impl FnOnce(&mut D) -> bool,
    ) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let modified = {
            let mut table = txn
                .open_table(table_for(D::COLLECTION))
                .map_err(redb_err("open_table"))?;
            let bytes = match table.get(id.as_str()).map_err(redb_err("get"))? {
                Some(guard) => guard.value().to_vec(),
                None => return Err(not_found::<D>(id)),
            };
            let mut doc: D = decode(&bytes)?;
            if mutate(&mut doc) {
                doc.validate()?;
                let encoded = encode(&doc)?;
                table
                    .insert(id.as_str(), encoded.as_slice())
                    .map_err(redb_err("insert"))?;
                true
            } else {
                false
            }
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(modified)
    }

    /// Apply a mutation to every document matching a predicate.
    ///
    /// Runs in one write transaction for this collection. Returns the number of
    /// documents modified.
    pub fn update_many<D: Document>(
        &self,
        predicate: impl Fn(&D) -> bool,
        mutate: impl Fn(&mut D) -> bool,
    ) -> StoreResult<usize> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let modified = {
            let mut table = txn
                .open_table(table_for(D::COLLECTION))
                .map_err(redb_err("open_table"))?;

            let mut matching: Vec<(String, D)> = Vec::new();
            for entry in table.iter().map_err(redb_err("iter"))? {
                let (key, value) = entry.map_err(redb_err("iter"))?;
                let doc: D = decode(value.value())?;
                if predicate(&doc) {
                    matching.push((key.value().to_string(), doc));
                }
            }

            let mut modified = 0usize;
            for (key, mut doc) in matching {
                if mutate(&mut doc) {
                    doc.validate()?;
                    let encoded = encode(&doc)?;
                    table
                        .insert(key.as_str(), encoded.as_slice())
                        .map_err(redb_err("insert"))?;
                    modified += 1;
                }
            }
            modified
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(modified)
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete<D: Document>(&self, id: &RecordId) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let existed = {
            let mut table = txn
                .open_table(table_for(D::COLLECTION))
                .map_err(redb_err("open_table"))?;
            let result = table.remove(id.as_str()).map_err(redb_err("remove"))?;
            result.is_some()
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(existed)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Book, ResearchProject};
    use crate::model::EducationLevel;
    use crate::store::{add_to_set, pull};
    use tempfile::TempDir;

    fn book(title: &str) -> Book {
        Book {
            title: title.into(),
            author: "Ursula K. Le Guin".into(),
            isbn: "978-0441478125".into(),
            published_year: 1969,
            genre: "Science fiction".into(),
        }
    }

    fn project(title: &str) -> ResearchProject {
        ResearchProject::new(title, "A project", EducationLevel::Graduate)
    }

    #[test]
    fn insert_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();

        let id = store.insert(&book("The Left Hand of Darkness")).unwrap();
        let rec = store.get::<Book>(&id).unwrap().unwrap();
        assert_eq!(rec.id, id);
        assert_eq!(rec.doc.title, "The Left Hand of Darkness");

        assert!(store.delete::<Book>(&id).unwrap());
        assert!(store.get::<Book>(&id).unwrap().is_none());
        assert!(!store.delete::<Book>(&id).unwrap());
    }

    #[test]
    fn require_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let err = store.require::<Book>(&RecordId::generate()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { collection: "books", .. }));
    }

    #[test]
    fn invalid_document_rejected_on_insert() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let err = store.insert(&book("   ")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert_eq!(store.count::<Book>().unwrap(), 0);
    }

    #[test]
    fn invalid_document_rejected_on_update() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let id = store.insert(&book("Valid")).unwrap();

        let err = store
            .update::<Book>(&id, |b| {
                b.published_year = 42;
                true
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        // The failed update left the stored record untouched.
        assert_eq!(store.require::<Book>(&id).unwrap().doc.published_year, 1969);
    }

    #[test]
    fn update_reports_modification() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let id = store.insert(&project("Whaling logs")).unwrap();
        let aid = RecordId::generate();

        assert!(store
            .update::<ResearchProject>(&id, |p| add_to_set(&mut p.finding_aid_ids, aid.clone()))
            .unwrap());
        assert!(!store
            .update::<ResearchProject>(&id, |p| add_to_set(&mut p.finding_aid_ids, aid.clone()))
            .unwrap());

        let rec = store.require::<ResearchProject>(&id).unwrap();
        assert_eq!(rec.doc.finding_aid_ids, vec![aid]);
    }

    #[test]
    fn update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let err = store
            .update::<Book>(&RecordId::generate(), |_| true)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn find_and_update_many() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let shared = RecordId::generate();

        for title in ["A", "B", "C"] {
            let id = store.insert(&project(title)).unwrap();
            if title != "C" {
                store
                    .update::<ResearchProject>(&id, |p| {
                        add_to_set(&mut p.finding_aid_ids, shared.clone())
                    })
                    .unwrap();
            }
        }

        let with_shared = store
            .find::<ResearchProject>(|p| p.finding_aid_ids.contains(&shared))
            .unwrap();
        assert_eq!(with_shared.len(), 2);

        let modified = store
            .update_many::<ResearchProject>(
                |p| p.finding_aid_ids.contains(&shared),
                |p| pull(&mut p.finding_aid_ids, &shared),
            )
            .unwrap();
        assert_eq!(modified, 2);
        assert!(store
            .find::<ResearchProject>(|p| p.finding_aid_ids.contains(&shared))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn collections_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        store.insert(&book("Only a book")).unwrap();
        assert_eq!(store.count::<Book>().unwrap(), 1);
        assert_eq!(store.count::<ResearchProject>().unwrap(), 0);
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();

        let id = {
            let store = DocumentStore::open(dir.path()).unwrap();
            store.insert(&book("Persistent")).unwrap()
        };

        let store = DocumentStore::open(dir.path()).unwrap();
        assert_eq!(store.require::<Book>(&id).unwrap().doc.title, "Persistent");
    }
}
